//! Resolution of document references to local files.
//!
//! A reference is either a local path or an http(s) URL. Remote references
//! are downloaded to a named temp file with a hard byte cap; the temp file
//! is deleted when the resolved handle drops, on every exit path.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::NamedTempFile;

use crate::error::ExtractError;

/// Cap for downloaded document references.
pub const MAX_DOWNLOAD_BYTES: u64 = 20 * 1024 * 1024;

/// A document reference resolved to a local path.
///
/// Holds the backing temp file alive for downloaded references, so the
/// local copy survives exactly as long as the caller needs it.
pub enum ResolvedRef {
    Local(PathBuf),
    Downloaded(NamedTempFile),
}

impl ResolvedRef {
    pub fn path(&self) -> &Path {
        match self {
            Self::Local(path) => path,
            Self::Downloaded(file) => file.path(),
        }
    }
}

impl Drop for ResolvedRef {
    fn drop(&mut self) {
        if let Self::Downloaded(file) = self {
            tracing::debug!(path = %file.path().display(), "releasing downloaded temp file");
        }
    }
}

/// Whether a reference is a fetchable http(s) URL.
pub fn is_url(reference: &str) -> bool {
    match url::Url::parse(reference) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

/// Resolve a reference to a local file, downloading it when remote.
///
/// `suffix` becomes the temp file extension so downstream libraries that
/// sniff extensions keep working. `strategy` tags any error raised.
pub async fn resolve_ref(
    reference: &str,
    suffix: &str,
    timeout_ms: u64,
    strategy: &'static str,
) -> Result<ResolvedRef, ExtractError> {
    if is_url(reference) {
        let temp = download_to_temp(reference, suffix, timeout_ms, strategy).await?;
        Ok(ResolvedRef::Downloaded(temp))
    } else {
        Ok(ResolvedRef::Local(PathBuf::from(reference)))
    }
}

/// Download a remote reference into a temp file, enforcing
/// [`MAX_DOWNLOAD_BYTES`].
async fn download_to_temp(
    url: &str,
    suffix: &str,
    timeout_ms: u64,
    strategy: &'static str,
) -> Result<NamedTempFile, ExtractError> {
    tracing::debug!(url, "downloading remote document reference");

    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .build()
        .map_err(|e| ExtractError::processing_with(strategy, "http client setup failed", e))?;

    let mut response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ExtractError::Timeout {
                strategy,
                millis: timeout_ms,
            }
        } else {
            ExtractError::processing_with(strategy, format!("download failed: {}", url), e)
        }
    })?;

    if !response.status().is_success() {
        return Err(ExtractError::processing(
            strategy,
            format!("download failed with status {}: {}", response.status(), url),
        ));
    }

    if let Some(length) = response.content_length() {
        if length > MAX_DOWNLOAD_BYTES {
            return Err(ExtractError::FileTooLarge {
                strategy,
                size: length,
                max: MAX_DOWNLOAD_BYTES,
            });
        }
    }

    let mut temp = tempfile::Builder::new()
        .prefix("docext-")
        .suffix(suffix)
        .tempfile()
        .map_err(|e| ExtractError::processing_with(strategy, "failed to create temp file", e))?;

    let mut written: u64 = 0;
    loop {
        let chunk = match response.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                if e.is_timeout() {
                    return Err(ExtractError::Timeout {
                        strategy,
                        millis: timeout_ms,
                    });
                }
                return Err(ExtractError::processing_with(
                    strategy,
                    "download stream interrupted",
                    e,
                ));
            }
        };

        written += chunk.len() as u64;
        if written > MAX_DOWNLOAD_BYTES {
            // Temp file is cleaned up by NamedTempFile's Drop.
            return Err(ExtractError::FileTooLarge {
                strategy,
                size: written,
                max: MAX_DOWNLOAD_BYTES,
            });
        }

        temp.write_all(&chunk).map_err(|e| {
            ExtractError::processing_with(strategy, "failed to write temp file", e)
        })?;
    }

    temp.flush()
        .map_err(|e| ExtractError::processing_with(strategy, "failed to flush temp file", e))?;

    tracing::debug!(
        url,
        bytes = written,
        path = %temp.path().display(),
        "download complete"
    );
    Ok(temp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_http_urls() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://cdn.example.com/image/upload/v1/scan.png"));
    }

    #[test]
    fn rejects_paths_and_other_schemes() {
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("relative/doc.pdf"));
        assert!(!is_url("ftp://example.com/doc.pdf"));
        assert!(!is_url("file:///tmp/doc.pdf"));
    }

    #[tokio::test]
    async fn local_refs_resolve_without_io() {
        let resolved = resolve_ref("/nonexistent/doc.pdf", ".pdf", 1000, "pdf-text-extraction")
            .await
            .unwrap();
        assert_eq!(resolved.path(), Path::new("/nonexistent/doc.pdf"));
    }
}
