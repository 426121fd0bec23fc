//! Native PDF text extraction.
//!
//! Pulls embedded/selectable text out of a PDF without rendering, using
//! `pdf-extract` for the text layer and `lopdf` for the page count. Scanned
//! documents come back with an empty text layer; the strategy executor then
//! falls through to rasterization and OCR.

use std::path::Path;

use crate::error::ExtractError;
use crate::fetch::{self, ResolvedRef};
use crate::quality::sanitize_text;
use crate::strategy::Strategy;

const STRATEGY: &str = Strategy::PdfText.as_str();

/// Cap applied to PDF references handled by this extractor.
pub const MAX_PDF_BYTES: u64 = 20 * 1024 * 1024;

/// Outcome of a native text pass over a PDF.
#[derive(Debug, Clone)]
pub struct PdfTextExtraction {
    /// Sanitized embedded text (may be empty for scanned documents).
    pub text: String,
    pub page_count: u32,
    /// True iff the sanitized text layer is non-empty.
    pub has_selectable_text: bool,
    /// Name of the method that produced this extraction.
    pub extraction_method: &'static str,
}

/// Stateless native text extractor.
#[derive(Debug, Default)]
pub struct PdfTextExtractor;

impl PdfTextExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract embedded text from a local path or URL reference.
    ///
    /// Remote references are downloaded to a bounded temp file that is
    /// removed when extraction finishes, on success and failure alike.
    pub async fn extract(
        &self,
        document_ref: &str,
        timeout_ms: u64,
    ) -> Result<PdfTextExtraction, ExtractError> {
        let resolved = self.resolve(document_ref, timeout_ms).await?;
        self.extract_file(resolved.path()).await
    }

    /// Resolve a reference for use by this extractor (and by the nested
    /// rasterize-then-recognize fallback, which shares the local copy).
    pub async fn resolve(
        &self,
        document_ref: &str,
        timeout_ms: u64,
    ) -> Result<ResolvedRef, ExtractError> {
        fetch::resolve_ref(document_ref, ".pdf", timeout_ms, STRATEGY).await
    }

    /// Extract embedded text from a local PDF file.
    pub async fn extract_file(&self, path: &Path) -> Result<PdfTextExtraction, ExtractError> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|_| ExtractError::FileNotFound {
                strategy: STRATEGY,
                path: path.display().to_string(),
            })?;

        if meta.len() > MAX_PDF_BYTES {
            return Err(ExtractError::FileTooLarge {
                strategy: STRATEGY,
                size: meta.len(),
                max: MAX_PDF_BYTES,
            });
        }

        let owned = path.to_path_buf();
        let extraction = tokio::task::spawn_blocking(move || extract_blocking(&owned))
            .await
            .map_err(|e| ExtractError::processing_with(STRATEGY, "extraction task panicked", e))??;

        tracing::debug!(
            pages = extraction.page_count,
            chars = extraction.text.len(),
            selectable = extraction.has_selectable_text,
            "native text pass complete"
        );

        Ok(extraction)
    }
}

fn extract_blocking(path: &Path) -> Result<PdfTextExtraction, ExtractError> {
    let page_count = count_pages(path)?;

    let raw = pdf_extract::extract_text(path).map_err(|e| classify_extract_error(e))?;
    let text = sanitize_text(&raw);
    let has_selectable_text = !text.is_empty();

    Ok(PdfTextExtraction {
        text,
        page_count,
        has_selectable_text,
        extraction_method: STRATEGY,
    })
}

fn count_pages(path: &Path) -> Result<u32, ExtractError> {
    let doc = lopdf::Document::load(path).map_err(|e| ExtractError::CorruptedDocument {
        strategy: STRATEGY,
        detail: format!("failed to parse PDF structure: {}", e),
    })?;
    Ok(doc.get_pages().len() as u32)
}

fn classify_extract_error(err: pdf_extract::OutputError) -> ExtractError {
    let detail = err.to_string();
    let lowered = detail.to_lowercase();
    if lowered.contains("encrypt") || lowered.contains("unsupported") {
        ExtractError::UnsupportedFormat {
            strategy: STRATEGY,
            detail,
        }
    } else {
        ExtractError::processing_with(STRATEGY, "text layer extraction failed", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_is_reported_as_not_found() {
        let extractor = PdfTextExtractor::new();
        let err = extractor
            .extract("/definitely/not/here.pdf", 1000)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::FileNotFound { .. }));
        assert_eq!(err.strategy(), Some("pdf-text-extraction"));
    }

    #[tokio::test]
    async fn oversized_file_is_rejected_before_parsing() {
        let temp = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        temp.as_file().set_len(MAX_PDF_BYTES + 1).unwrap();

        let extractor = PdfTextExtractor::new();
        let err = extractor
            .extract_file(temp.path())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::FileTooLarge { .. }));
    }

    #[tokio::test]
    async fn garbage_bytes_are_reported_as_corrupted() {
        let mut temp = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        use std::io::Write;
        temp.write_all(b"this is not a pdf at all").unwrap();

        let extractor = PdfTextExtractor::new();
        let err = extractor.extract_file(temp.path()).await.unwrap_err();
        assert!(matches!(err, ExtractError::CorruptedDocument { .. }));
    }
}
