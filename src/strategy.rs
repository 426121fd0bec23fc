//! Extraction strategies and their executor.
//!
//! A strategy is one top-level extraction approach. Dispatch is an
//! exhaustive match over a closed enum, so adding a strategy forces every
//! call site to handle it. The PDF strategy contains the pipeline's core
//! fallback: a native text pass first, then rasterize-and-recognize when
//! the document has no usable embedded text.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::OcrConfig;
use crate::error::ExtractError;
use crate::pdf_text::PdfTextExtractor;
use crate::quality::sanitize_text;
use crate::rasterize::{ConversionOptions, PdfRasterizer};
use crate::recognize::{Recognize, TextRecognizer};

/// Processing-step names recorded in result metadata.
pub const STEP_NATIVE_TEXT: &str = "pdf-native-text-extraction";
pub const STEP_PDF_TO_IMAGE: &str = "pdf-to-image-conversion";
pub const STEP_TESSERACT: &str = "tesseract-ocr";

/// Native text shorter than this is treated as absent and the PDF strategy
/// falls through to rasterization.
const MIN_NATIVE_TEXT_CHARS: usize = 50;

/// Fixed confidence for selectable-text extraction: embedded text is
/// authoritative, not probabilistic.
const NATIVE_TEXT_CONFIDENCE: f32 = 0.9;

/// One top-level extraction approach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    /// Embedded-text extraction from PDFs, with a nested
    /// rasterize-then-recognize fallback for scanned documents.
    #[serde(rename = "pdf-text-extraction")]
    PdfText,
    /// Direct OCR over an image reference.
    #[serde(rename = "tesseract-ocr")]
    TesseractOcr,
}

impl Strategy {
    pub const ALL: [Strategy; 2] = [Strategy::PdfText, Strategy::TesseractOcr];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PdfText => "pdf-text-extraction",
            Self::TesseractOcr => "tesseract-ocr",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document classification driving chain construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Image,
    /// Unrecognized extension; treated as non-PDF for chain building.
    Unknown,
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tif", "tiff", "webp"];

impl DocumentKind {
    /// Classify a reference by its trailing extension, with hosting-URL
    /// path hints (`/raw/` vs `/image/upload`) as a secondary signal for
    /// extensionless asset URLs.
    pub fn detect(document_ref: &str) -> Self {
        let path_part = document_ref
            .split(['?', '#'])
            .next()
            .unwrap_or(document_ref);

        let last_segment = path_part.rsplit('/').next().unwrap_or(path_part);
        if let Some((_, ext)) = last_segment.rsplit_once('.') {
            let ext = ext.to_lowercase();
            if ext == "pdf" {
                return Self::Pdf;
            }
            if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
                return Self::Image;
            }
        }

        if crate::fetch::is_url(document_ref) {
            if path_part.contains("/raw/") {
                return Self::Pdf;
            }
            if path_part.contains("/image/upload") {
                return Self::Image;
            }
        }

        Self::Unknown
    }
}

/// Provenance trail attached to every result.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_count: Option<u32>,
    /// Ordered, append-only list of step names.
    pub processing_steps: Vec<String>,
}

/// Normalized output of a single strategy run; the orchestrator stamps the
/// method and wall-clock time.
#[derive(Debug, Clone)]
pub struct StrategyOutcome {
    pub text: String,
    pub confidence: f32,
    pub metadata: ExtractionMetadata,
}

/// Dispatches a selected strategy to the right extractor combination.
///
/// Generic over the recognition backend so the fallback logic can run
/// against any [`Recognize`] implementation.
pub struct StrategyExecutor<R = TextRecognizer> {
    pdf_text: PdfTextExtractor,
    rasterizer: PdfRasterizer,
    recognizer: Arc<R>,
}

impl<R: Recognize> StrategyExecutor<R> {
    pub fn new(recognizer: Arc<R>) -> Self {
        Self {
            pdf_text: PdfTextExtractor::new(),
            rasterizer: PdfRasterizer::new(),
            recognizer,
        }
    }

    /// Run one strategy against a document reference.
    pub async fn execute(
        &self,
        strategy: Strategy,
        document_ref: &str,
        cfg: &OcrConfig,
    ) -> Result<StrategyOutcome, ExtractError> {
        match strategy {
            Strategy::PdfText => self.run_pdf_text(document_ref, cfg).await,
            Strategy::TesseractOcr => self.run_tesseract(document_ref).await,
        }
    }

    /// The PDF path: native text first, nested rasterize-then-recognize
    /// fallback second.
    ///
    /// Any unrecoverable failure in this sequence is wrapped as a retryable
    /// processing error so the orchestrator can advance to a later chain
    /// entry if one exists.
    async fn run_pdf_text(
        &self,
        document_ref: &str,
        cfg: &OcrConfig,
    ) -> Result<StrategyOutcome, ExtractError> {
        self.pdf_text_inner(document_ref, cfg).await.map_err(|e| {
            ExtractError::Processing {
                strategy: Strategy::PdfText.as_str(),
                detail: format!("pdf extraction failed: {}", e),
                source: Some(Box::new(e)),
            }
        })
    }

    async fn pdf_text_inner(
        &self,
        document_ref: &str,
        cfg: &OcrConfig,
    ) -> Result<StrategyOutcome, ExtractError> {
        // Resolve once; the downloaded temp copy (if any) stays alive for
        // both the native pass and the rasterization fallback.
        let resolved = self.pdf_text.resolve(document_ref, cfg.timeout_ms).await?;
        let extraction = self.pdf_text.extract_file(resolved.path()).await?;

        if extraction.has_selectable_text
            && extraction.text.chars().count() > MIN_NATIVE_TEXT_CHARS
        {
            tracing::info!(
                chars = extraction.text.len(),
                pages = extraction.page_count,
                "native text extraction succeeded"
            );
            return Ok(StrategyOutcome {
                text: extraction.text,
                confidence: NATIVE_TEXT_CONFIDENCE,
                metadata: ExtractionMetadata {
                    page_count: Some(extraction.page_count),
                    image_count: None,
                    processing_steps: vec![STEP_NATIVE_TEXT.to_string()],
                },
            });
        }

        tracing::info!(
            pages = extraction.page_count,
            "no usable embedded text, falling back to page rendering and OCR"
        );

        let conversion = self
            .rasterizer
            .convert(resolved.path(), &ConversionOptions::from_config(cfg))
            .await?;

        // Pages are recognized one at a time: a single raster buffer held
        // at once bounds peak memory.
        let attempted = conversion.pages.len() as u32;
        let mut texts: Vec<String> = Vec::new();
        let mut confidences: Vec<f32> = Vec::new();

        for page in &conversion.pages {
            match self.recognizer.recognize_buffer(&page.image).await {
                Ok(recognition) => {
                    let text = sanitize_text(&recognition.text);
                    if !text.is_empty() {
                        texts.push(text);
                        confidences.push(recognition.confidence);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        page = page.page_number,
                        error = %e,
                        "page recognition failed, continuing with remaining pages"
                    );
                }
            }
        }

        let confidence = mean_confidence(&confidences);

        Ok(StrategyOutcome {
            text: texts.join("\n\n"),
            confidence,
            metadata: ExtractionMetadata {
                page_count: Some(conversion.total_pages),
                image_count: Some(attempted),
                processing_steps: vec![
                    STEP_PDF_TO_IMAGE.to_string(),
                    STEP_TESSERACT.to_string(),
                ],
            },
        })
    }

    /// Direct OCR over an image reference.
    async fn run_tesseract(&self, document_ref: &str) -> Result<StrategyOutcome, ExtractError> {
        let recognition = self.recognizer.preprocess_and_recognize(document_ref).await?;

        Ok(StrategyOutcome {
            text: sanitize_text(&recognition.text),
            confidence: recognition.confidence,
            metadata: ExtractionMetadata {
                page_count: None,
                image_count: None,
                processing_steps: vec![STEP_TESSERACT.to_string()],
            },
        })
    }
}

/// Mean confidence over the pages that contributed text; 0 when none did.
fn mean_confidence(confidences: &[f32]) -> f32 {
    if confidences.is_empty() {
        return 0.0;
    }
    confidences.iter().sum::<f32>() / confidences.len() as f32
}
