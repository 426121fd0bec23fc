//! Process-wide extraction configuration.
//!
//! A [`ConfigProvider`] owns the current settings snapshot behind a lock.
//! Readers always get a copy, never a live reference; updates replace the
//! snapshot atomically. Defaults come from [`OcrConfig::default`] and can be
//! overridden through `OCR_*` environment variables or per-call
//! [`ExtractOptions`].

use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::ExtractError;
use crate::strategy::Strategy;

/// Raster output format for rendered PDF pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ImageOutputFormat {
    Png,
    Jpeg,
}

impl ImageOutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
        }
    }
}

/// Extraction settings read by every pipeline call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Attempt native PDF text extraction for PDF references.
    pub pdf_text_enabled: bool,
    /// Attempt Tesseract OCR for image references (and rendered PDF pages).
    pub tesseract_enabled: bool,
    /// Declared timeout for a single strategy attempt. Threaded through to
    /// downloads; not enforced as a hard deadline around engine calls.
    pub timeout_ms: u64,
    /// Immediate in-process retry attempts reported to the metadata sink.
    pub max_retries: u32,
    /// Tesseract language code (e.g. "eng").
    pub language: String,
    /// Tesseract OCR engine mode, 0-3 (OEM numbering).
    pub engine_mode: u32,
    /// Render resolution for the rasterize-then-recognize fallback.
    pub dpi: u32,
    /// Encoding for rendered page buffers.
    pub image_format: ImageOutputFormat,
    /// JPEG quality (1-100) when `image_format` is JPEG.
    pub jpeg_quality: u8,
    /// Page cap for the rasterize-then-recognize fallback.
    pub max_ocr_pages: u32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            pdf_text_enabled: true,
            tesseract_enabled: true,
            timeout_ms: 30_000,
            max_retries: 2,
            language: "eng".to_string(),
            engine_mode: 3,
            dpi: 200,
            image_format: ImageOutputFormat::Png,
            jpeg_quality: 85,
            max_ocr_pages: 5,
        }
    }
}

impl OcrConfig {
    /// Build a configuration from `OCR_*` environment variables, falling
    /// back to defaults for unset or unparsable values.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            pdf_text_enabled: env_bool("OCR_ENABLE_PDF_TEXT", defaults.pdf_text_enabled),
            tesseract_enabled: env_bool("OCR_ENABLE_TESSERACT", defaults.tesseract_enabled),
            timeout_ms: env_parse("OCR_TIMEOUT_MS", defaults.timeout_ms),
            max_retries: env_parse("OCR_MAX_RETRIES", defaults.max_retries),
            language: std::env::var("OCR_LANGUAGE").unwrap_or(defaults.language),
            engine_mode: env_parse("OCR_ENGINE_MODE", defaults.engine_mode),
            dpi: env_parse("OCR_DPI", defaults.dpi),
            image_format: match std::env::var("OCR_IMAGE_FORMAT").as_deref() {
                Ok("jpeg") | Ok("jpg") => ImageOutputFormat::Jpeg,
                Ok("png") => ImageOutputFormat::Png,
                _ => defaults.image_format,
            },
            jpeg_quality: env_parse("OCR_JPEG_QUALITY", defaults.jpeg_quality),
            max_ocr_pages: env_parse("OCR_MAX_PAGES", defaults.max_ocr_pages),
        }
    }

    /// Validate the invariants extraction depends on, logging each
    /// violation. Returns an error describing the first failure.
    pub fn validate(&self) -> Result<(), ExtractError> {
        let mut problems = Vec::new();
        if self.timeout_ms == 0 {
            problems.push("timeout_ms must be greater than zero");
        }
        if self.dpi == 0 {
            problems.push("dpi must be greater than zero");
        }
        if self.max_ocr_pages == 0 {
            problems.push("max_ocr_pages must be greater than zero");
        }
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            problems.push("jpeg_quality must be in 1-100");
        }
        if self.language.is_empty() {
            problems.push("language must not be empty");
        }
        if !self.pdf_text_enabled && !self.tesseract_enabled {
            problems.push("at least one extraction method must be enabled");
        }

        if let Some(first) = problems.first() {
            for problem in &problems {
                tracing::error!("configuration invalid: {}", problem);
            }
            return Err(ExtractError::Configuration {
                reason: (*first).to_string(),
            });
        }
        Ok(())
    }

    /// Whether a strategy is currently enabled.
    pub fn is_method_enabled(&self, strategy: Strategy) -> bool {
        match strategy {
            Strategy::PdfText => self.pdf_text_enabled,
            Strategy::TesseractOcr => self.tesseract_enabled,
        }
    }

    /// Names of all currently enabled strategies.
    pub fn enabled_methods(&self) -> Vec<&'static str> {
        Strategy::ALL
            .iter()
            .filter(|s| self.is_method_enabled(**s))
            .map(|s| s.as_str())
            .collect()
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => default,
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Per-call overrides layered over the provider snapshot.
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    pub pdf_text_enabled: Option<bool>,
    pub tesseract_enabled: Option<bool>,
    pub timeout_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub language: Option<String>,
    pub engine_mode: Option<u32>,
    pub dpi: Option<u32>,
    pub image_format: Option<ImageOutputFormat>,
}

impl ExtractOptions {
    /// Merge these options over a configuration snapshot.
    pub fn overlay(&self, base: &OcrConfig) -> OcrConfig {
        OcrConfig {
            pdf_text_enabled: self.pdf_text_enabled.unwrap_or(base.pdf_text_enabled),
            tesseract_enabled: self.tesseract_enabled.unwrap_or(base.tesseract_enabled),
            timeout_ms: self.timeout_ms.unwrap_or(base.timeout_ms),
            max_retries: self.max_retries.unwrap_or(base.max_retries),
            language: self.language.clone().unwrap_or_else(|| base.language.clone()),
            engine_mode: self.engine_mode.unwrap_or(base.engine_mode),
            dpi: self.dpi.unwrap_or(base.dpi),
            image_format: self.image_format.unwrap_or(base.image_format),
            jpeg_quality: base.jpeg_quality,
            max_ocr_pages: base.max_ocr_pages,
        }
    }
}

/// Partial update applied to the provider snapshot.
pub type ConfigPatch = ExtractOptions;

/// Process-wide configuration holder.
///
/// Read-many/write-rare: `snapshot()` clones the current settings under the
/// read lock, `update()` swaps in a merged copy under the write lock.
pub struct ConfigProvider {
    current: RwLock<OcrConfig>,
}

impl ConfigProvider {
    pub fn new(config: OcrConfig) -> Self {
        Self {
            current: RwLock::new(config),
        }
    }

    /// Provider seeded from `OCR_*` environment variables.
    pub fn from_env() -> Self {
        Self::new(OcrConfig::from_env())
    }

    /// Copy of the current settings. Never a live-mutable reference.
    pub fn snapshot(&self) -> OcrConfig {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Merge a partial update over the current snapshot and swap it in
    /// atomically.
    pub fn update(&self, patch: &ConfigPatch) {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let merged = patch.overlay(&guard);
        tracing::info!(
            pdf_text = merged.pdf_text_enabled,
            tesseract = merged.tesseract_enabled,
            dpi = merged.dpi,
            language = %merged.language,
            "configuration updated"
        );
        *guard = merged;
    }

    /// Validate the current snapshot.
    pub fn validate(&self) -> Result<(), ExtractError> {
        self.snapshot().validate()
    }

    pub fn is_method_enabled(&self, strategy: Strategy) -> bool {
        self.snapshot().is_method_enabled(strategy)
    }
}

impl Default for ConfigProvider {
    fn default() -> Self {
        Self::new(OcrConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(OcrConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_timeout_is_invalid() {
        let cfg = OcrConfig {
            timeout_ms: 0,
            ..OcrConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ExtractError::Configuration { .. })
        ));
    }

    #[test]
    fn zero_dpi_is_invalid() {
        let cfg = OcrConfig {
            dpi: 0,
            ..OcrConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn all_methods_disabled_is_invalid() {
        let cfg = OcrConfig {
            pdf_text_enabled: false,
            tesseract_enabled: false,
            ..OcrConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn overlay_replaces_only_provided_fields() {
        let base = OcrConfig::default();
        let opts = ExtractOptions {
            dpi: Some(300),
            tesseract_enabled: Some(false),
            ..ExtractOptions::default()
        };
        let merged = opts.overlay(&base);
        assert_eq!(merged.dpi, 300);
        assert!(!merged.tesseract_enabled);
        assert_eq!(merged.language, base.language);
        assert_eq!(merged.timeout_ms, base.timeout_ms);
    }

    #[test]
    fn snapshot_is_a_copy() {
        let provider = ConfigProvider::default();
        let mut snap = provider.snapshot();
        snap.dpi = 9999;
        assert_eq!(provider.snapshot().dpi, OcrConfig::default().dpi);
    }

    #[test]
    fn update_merges_over_current() {
        let provider = ConfigProvider::default();
        provider.update(&ConfigPatch {
            language: Some("deu".into()),
            ..ConfigPatch::default()
        });
        let snap = provider.snapshot();
        assert_eq!(snap.language, "deu");
        assert_eq!(snap.dpi, OcrConfig::default().dpi);
    }

    #[test]
    fn enabled_methods_reflect_flags() {
        let cfg = OcrConfig {
            pdf_text_enabled: false,
            ..OcrConfig::default()
        };
        assert_eq!(cfg.enabled_methods(), vec!["tesseract-ocr"]);
    }
}
