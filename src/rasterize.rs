//! PDF page rasterization.
//!
//! Renders selected pages of a PDF to encoded image buffers with MuPDF.
//! Used only when a document has no usable embedded text and the pipeline
//! falls back to OCR over rendered pages. Rendering happens page by page;
//! a page that fails to render is logged and skipped so the rest of the
//! document still converts.

use std::io::Cursor;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

use mupdf::{Colorspace, Document, Matrix};

use crate::config::{ImageOutputFormat, OcrConfig};
use crate::error::ExtractError;

const STRATEGY: &str = "pdf-to-image-conversion";

/// Cap on the source PDF handed to the rasterizer.
pub const MAX_SOURCE_BYTES: u64 = 100 * 1024 * 1024;

/// PDF native reference resolution.
const PDF_POINTS_PER_INCH: f32 = 72.0;

/// Conversion parameters for a rasterization run.
#[derive(Debug, Clone)]
pub struct ConversionOptions {
    pub dpi: u32,
    pub format: ImageOutputFormat,
    pub jpeg_quality: u8,
    /// Cap on pages rendered in a single run.
    pub max_pages: u32,
    /// First page to render, 1-based. Values below 1 clamp to 1.
    pub start_page: u32,
    /// Last page to render, 1-based, clamped to the document length.
    pub end_page: u32,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            dpi: 200,
            format: ImageOutputFormat::Png,
            jpeg_quality: 85,
            max_pages: 5,
            start_page: 1,
            end_page: u32::MAX,
        }
    }
}

impl ConversionOptions {
    /// Options derived from the pipeline configuration.
    pub fn from_config(config: &OcrConfig) -> Self {
        Self {
            dpi: config.dpi,
            format: config.image_format,
            jpeg_quality: config.jpeg_quality,
            max_pages: config.max_ocr_pages,
            ..Self::default()
        }
    }
}

/// One rendered page.
#[derive(Debug, Clone)]
pub struct RasterPage {
    /// 1-based page number matching the source document's pagination.
    pub page_number: u32,
    /// Encoded image bytes in `format`.
    pub image: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: ImageOutputFormat,
}

/// Result of a rasterization run.
#[derive(Debug)]
pub struct ConversionOutput {
    /// Successfully rendered pages, in ascending page order.
    pub pages: Vec<RasterPage>,
    /// Page count of the whole source document.
    pub total_pages: u32,
    pub processing_time_ms: u64,
    pub source_size: u64,
}

/// Heuristic settings recommendation from sampling a document.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConversionRecommendation {
    pub dpi: u32,
    pub format: ImageOutputFormat,
    pub total_pages: u32,
    pub estimated_memory_mb: f32,
    pub estimated_time_ms: u64,
}

/// Renders PDF pages to raster buffers.
#[derive(Debug, Default)]
pub struct PdfRasterizer;

impl PdfRasterizer {
    pub fn new() -> Self {
        Self
    }

    /// Render the page range selected by `options`.
    ///
    /// The effective range is `[max(1, start_page), min(total, end_page,
    /// start + max_pages - 1)]`. Individual page failures are skipped; if
    /// no page at all renders, the run fails.
    pub async fn convert(
        &self,
        path: &Path,
        options: &ConversionOptions,
    ) -> Result<ConversionOutput, ExtractError> {
        let source_size = self.validate(path).await?;
        let started = Instant::now();

        let owned: PathBuf = path.to_path_buf();
        let opts = options.clone();
        let (pages, total_pages) = tokio::task::spawn_blocking(move || {
            let doc = open_document(&owned)?;
            let total = page_count(&doc)?;
            let selected: Vec<u32> = match effective_range(total, &opts) {
                Some((start, end)) => (start..=end).collect(),
                None => Vec::new(),
            };
            render_pages(&doc, &selected, &opts).map(|pages| (pages, total))
        })
        .await
        .map_err(|e| ExtractError::processing_with(STRATEGY, "render task panicked", e))??;

        if pages.is_empty() {
            return Err(ExtractError::processing(
                STRATEGY,
                "no pages could be rendered",
            ));
        }

        tracing::info!(
            total_pages,
            rendered = pages.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "pdf rasterization complete"
        );

        Ok(ConversionOutput {
            pages,
            total_pages,
            processing_time_ms: started.elapsed().as_millis() as u64,
            source_size,
        })
    }

    /// Render exactly the requested 1-based page numbers.
    ///
    /// Numbers outside `[1, total_pages]` are silently skipped rather than
    /// errored, so callers can probe speculative ranges.
    pub async fn convert_pages(
        &self,
        path: &Path,
        page_numbers: &[u32],
        options: &ConversionOptions,
    ) -> Result<ConversionOutput, ExtractError> {
        let source_size = self.validate(path).await?;
        let started = Instant::now();

        let owned: PathBuf = path.to_path_buf();
        let opts = options.clone();
        let requested = page_numbers.to_vec();
        let (pages, total_pages) = tokio::task::spawn_blocking(move || {
            let doc = open_document(&owned)?;
            let total = page_count(&doc)?;
            let selected = filter_requested(total, &requested);
            render_pages(&doc, &selected, &opts).map(|pages| (pages, total))
        })
        .await
        .map_err(|e| ExtractError::processing_with(STRATEGY, "render task panicked", e))??;

        Ok(ConversionOutput {
            pages,
            total_pages,
            processing_time_ms: started.elapsed().as_millis() as u64,
            source_size,
        })
    }

    /// Sample page 1 and recommend conversion settings.
    ///
    /// Large page areas and long documents bias toward lower DPI and JPEG
    /// output; small pages can afford higher DPI.
    pub async fn recommend_settings(
        &self,
        path: &Path,
    ) -> Result<ConversionRecommendation, ExtractError> {
        self.validate(path).await?;

        let owned: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let doc = open_document(&owned)?;
            let total = page_count(&doc)?;
            if total == 0 {
                return Err(ExtractError::processing(STRATEGY, "document has no pages"));
            }

            let page = doc
                .load_page(0)
                .map_err(|e| ExtractError::processing(STRATEGY, format!("failed to load page 1: {}", e)))?;
            let bounds = page
                .bounds()
                .map_err(|e| ExtractError::processing(STRATEGY, format!("failed to read page bounds: {}", e)))?;
            let width = bounds.x1 - bounds.x0;
            let height = bounds.y1 - bounds.y0;
            let area = width * height;

            // US Letter at 72pt is ~612x792 = 484k square points.
            let large_page = area > 700_000.0;
            let long_document = total > 20;

            let (dpi, format) = match (large_page, long_document) {
                (true, _) | (_, true) => (150, ImageOutputFormat::Jpeg),
                (false, false) if area < 250_000.0 => (300, ImageOutputFormat::Png),
                _ => (200, ImageOutputFormat::Png),
            };

            let scale = dpi as f32 / PDF_POINTS_PER_INCH;
            let pixels_per_page = (width * scale) * (height * scale);
            let estimated_memory_mb = pixels_per_page * 3.0 / (1024.0 * 1024.0);
            let estimated_time_ms = (total as u64) * (pixels_per_page as u64 / 500_000).max(1) * 50;

            Ok(ConversionRecommendation {
                dpi,
                format,
                total_pages: total,
                estimated_memory_mb,
                estimated_time_ms,
            })
        })
        .await
        .map_err(|e| ExtractError::processing_with(STRATEGY, "sampling task panicked", e))?
    }

    /// Existence, size-cap and format validation for the source file.
    async fn validate(&self, path: &Path) -> Result<u64, ExtractError> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|_| ExtractError::FileNotFound {
                strategy: STRATEGY,
                path: path.display().to_string(),
            })?;

        if meta.len() > MAX_SOURCE_BYTES {
            return Err(ExtractError::FileTooLarge {
                strategy: STRATEGY,
                size: meta.len(),
                max: MAX_SOURCE_BYTES,
            });
        }

        if !looks_like_pdf(path) {
            return Err(ExtractError::UnsupportedFormat {
                strategy: STRATEGY,
                detail: format!("not a PDF: {}", path.display()),
            });
        }

        Ok(meta.len())
    }
}

/// Effective inclusive page range for a run, or `None` when empty.
pub(crate) fn effective_range(total_pages: u32, opts: &ConversionOptions) -> Option<(u32, u32)> {
    if total_pages == 0 || opts.max_pages == 0 {
        return None;
    }
    let start = opts.start_page.max(1);
    let end = total_pages
        .min(opts.end_page)
        .min(start.saturating_add(opts.max_pages - 1));
    if start > end {
        return None;
    }
    Some((start, end))
}

/// Requested page numbers filtered to `[1, total_pages]`, order preserved.
pub(crate) fn filter_requested(total_pages: u32, requested: &[u32]) -> Vec<u32> {
    requested
        .iter()
        .copied()
        .filter(|n| *n >= 1 && *n <= total_pages)
        .collect()
}

/// Extension check first, magic bytes (`%PDF-`) as a fallback for
/// extensionless paths.
fn looks_like_pdf(path: &Path) -> bool {
    if let Some(ext) = path.extension() {
        return ext.to_string_lossy().to_lowercase() == "pdf";
    }
    let mut magic = [0u8; 5];
    match std::fs::File::open(path) {
        Ok(mut file) => file.read_exact(&mut magic).is_ok() && &magic == b"%PDF-",
        Err(_) => false,
    }
}

/// Byte length of a tightly-strided RGB buffer. Widened before the
/// multiply so large renders cannot overflow u32.
fn rgb_buffer_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}

fn open_document(path: &Path) -> Result<Document, ExtractError> {
    let path_str = path.to_string_lossy();
    Document::open(&*path_str).map_err(|e| ExtractError::CorruptedDocument {
        strategy: STRATEGY,
        detail: format!("failed to open PDF: {}", e),
    })
}

fn page_count(doc: &Document) -> Result<u32, ExtractError> {
    doc.page_count()
        .map(|n| n.max(0) as u32)
        .map_err(|e| ExtractError::CorruptedDocument {
            strategy: STRATEGY,
            detail: format!("failed to read page count: {}", e),
        })
}

/// Render the selected 1-based pages, skipping individual failures.
fn render_pages(
    doc: &Document,
    selected: &[u32],
    opts: &ConversionOptions,
) -> Result<Vec<RasterPage>, ExtractError> {
    let scale = opts.dpi as f32 / PDF_POINTS_PER_INCH;
    let mut pages = Vec::with_capacity(selected.len());

    for &number in selected {
        match render_page(doc, number, scale, opts) {
            Ok(page) => pages.push(page),
            Err(detail) => {
                tracing::warn!(page = number, %detail, "page render failed, skipping");
            }
        }
    }

    Ok(pages)
}

fn render_page(
    doc: &Document,
    number: u32,
    scale: f32,
    opts: &ConversionOptions,
) -> Result<RasterPage, String> {
    let page = doc
        .load_page(number as i32 - 1)
        .map_err(|e| format!("load failed: {}", e))?;

    let matrix = Matrix::new_scale(scale, scale);
    let colorspace = Colorspace::device_rgb();
    let pixmap = page
        .to_pixmap(&matrix, &colorspace, false, false)
        .map_err(|e| format!("render failed: {}", e))?;

    let width = pixmap.width() as u32;
    let height = pixmap.height() as u32;
    let samples = pixmap.samples();
    let n = pixmap.n() as usize;

    // Repack to tightly-strided RGB regardless of the pixmap's layout.
    let mut rgb = Vec::with_capacity(rgb_buffer_len(width, height));
    for y in 0..height as usize {
        for x in 0..width as usize {
            let offset = (y * width as usize + x) * n;
            let r = samples.get(offset).copied().unwrap_or(0);
            let g = samples.get(offset + 1).copied().unwrap_or(r);
            let b = samples.get(offset + 2).copied().unwrap_or(r);
            rgb.extend_from_slice(&[r, g, b]);
        }
    }

    let img = image::RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| "pixmap sample buffer mismatch".to_string())?;

    let mut encoded = Vec::new();
    match opts.format {
        ImageOutputFormat::Png => {
            image::DynamicImage::ImageRgb8(img)
                .write_to(&mut Cursor::new(&mut encoded), image::ImageFormat::Png)
                .map_err(|e| format!("png encode failed: {}", e))?;
        }
        ImageOutputFormat::Jpeg => {
            let mut cursor = Cursor::new(&mut encoded);
            let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
                &mut cursor,
                opts.jpeg_quality,
            );
            image::DynamicImage::ImageRgb8(img)
                .write_with_encoder(encoder)
                .map_err(|e| format!("jpeg encode failed: {}", e))?;
        }
    }

    Ok(RasterPage {
        page_number: number,
        image: encoded,
        width,
        height,
        format: opts.format,
    })
}
