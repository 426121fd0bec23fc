use thiserror::Error;

/// Boxed root cause attached to processing failures.
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by the extraction pipeline.
///
/// Each variant carries the strategy it originated from (where one applies)
/// and maps to a stable machine-readable code via [`ExtractError::code`].
/// The [`ExtractError::retryable`] flag drives the orchestrator's fallback
/// loop: retryable failures let the chain advance to the next strategy,
/// non-retryable failures abort the whole call.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("invalid configuration: {reason}")]
    Configuration { reason: String },

    #[error("{strategy}: file not found: {path}")]
    FileNotFound { strategy: &'static str, path: String },

    #[error("{strategy}: file too large: {size} bytes (max: {max} bytes)")]
    FileTooLarge {
        strategy: &'static str,
        size: u64,
        max: u64,
    },

    #[error("{strategy}: unsupported format: {detail}")]
    UnsupportedFormat {
        strategy: &'static str,
        detail: String,
    },

    #[error("{strategy}: corrupted document: {detail}")]
    CorruptedDocument {
        strategy: &'static str,
        detail: String,
    },

    #[error("{strategy}: processing failed: {detail}")]
    Processing {
        strategy: &'static str,
        detail: String,
        #[source]
        source: Option<Cause>,
    },

    #[error("{strategy}: timed out after {millis}ms")]
    Timeout { strategy: &'static str, millis: u64 },

    #[error("all extraction methods failed; last attempted {last_strategy}: {detail}")]
    AllMethodsFailed {
        last_strategy: String,
        detail: String,
    },
}

impl ExtractError {
    /// Shorthand for a processing failure without a structured cause.
    pub fn processing(strategy: &'static str, detail: impl Into<String>) -> Self {
        Self::Processing {
            strategy,
            detail: detail.into(),
            source: None,
        }
    }

    /// Processing failure wrapping a root cause.
    pub fn processing_with(
        strategy: &'static str,
        detail: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Processing {
            strategy,
            detail: detail.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Stable machine-readable code for logs and sinks.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "CONFIGURATION_ERROR",
            Self::FileNotFound { .. } => "FILE_NOT_FOUND",
            Self::FileTooLarge { .. } => "FILE_TOO_LARGE",
            Self::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            Self::CorruptedDocument { .. } => "CORRUPTED_DOCUMENT",
            Self::Processing { .. } => "PROCESSING_ERROR",
            Self::Timeout { .. } => "TIMEOUT",
            Self::AllMethodsFailed { .. } => "ALL_METHODS_FAILED",
        }
    }

    /// Whether the orchestrator may continue with the next strategy in the
    /// chain after this failure.
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Processing { .. } | Self::Timeout { .. })
    }

    /// The strategy that raised this error, if one applies.
    pub fn strategy(&self) -> Option<&str> {
        match self {
            Self::Configuration { .. } => None,
            Self::FileNotFound { strategy, .. }
            | Self::FileTooLarge { strategy, .. }
            | Self::UnsupportedFormat { strategy, .. }
            | Self::CorruptedDocument { strategy, .. }
            | Self::Processing { strategy, .. }
            | Self::Timeout { strategy, .. } => Some(strategy),
            Self::AllMethodsFailed { last_strategy, .. } => Some(last_strategy),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_are_not_retryable() {
        let err = ExtractError::Configuration {
            reason: "no methods enabled".into(),
        };
        assert!(!err.retryable());
        assert_eq!(err.code(), "CONFIGURATION_ERROR");
        assert!(err.strategy().is_none());
    }

    #[test]
    fn file_errors_are_not_retryable() {
        let err = ExtractError::FileNotFound {
            strategy: "tesseract-ocr",
            path: "/missing.png".into(),
        };
        assert!(!err.retryable());

        let err = ExtractError::FileTooLarge {
            strategy: "tesseract-ocr",
            size: 21 * 1024 * 1024,
            max: 20 * 1024 * 1024,
        };
        assert!(!err.retryable());
        assert_eq!(err.code(), "FILE_TOO_LARGE");
    }

    #[test]
    fn processing_and_timeout_are_retryable() {
        assert!(ExtractError::processing("pdf-text-extraction", "engine hiccup").retryable());
        assert!(ExtractError::Timeout {
            strategy: "tesseract-ocr",
            millis: 30_000,
        }
        .retryable());
    }

    #[test]
    fn aggregate_error_is_terminal_and_names_last_strategy() {
        let err = ExtractError::AllMethodsFailed {
            last_strategy: "tesseract-ocr".into(),
            detail: "engine hiccup".into(),
        };
        assert!(!err.retryable());
        assert_eq!(err.strategy(), Some("tesseract-ocr"));
        let msg = err.to_string();
        assert!(msg.contains("tesseract-ocr"));
        assert!(msg.contains("engine hiccup"));
    }

    #[test]
    fn processing_error_preserves_root_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err = ExtractError::processing_with("pdf-text-extraction", "render aborted", io);
        let source = std::error::Error::source(&err);
        assert!(source.is_some());
    }
}
