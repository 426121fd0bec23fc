//! Tesseract-backed character recognition.
//!
//! A single process-wide worker is initialized lazily on first use: the
//! traineddata for the configured language is provisioned into the cache
//! directory (downloaded once), and a throwaway engine instance validates
//! the setup. Recognition jobs are serialized through the worker - the
//! engine processes one job at a time, so callers must not expect parallel
//! throughput from a single recognizer.

use std::io::Write;
use std::path::Path;
use std::time::Instant;

use tesseract_static::tesseract::{OcrEngineMode, Tesseract};
use tokio::sync::Mutex;

use crate::config::ConfigProvider;
use crate::error::ExtractError;
use crate::fetch;
use crate::quality;
use crate::strategy::Strategy;

const STRATEGY: &str = Strategy::TesseractOcr.as_str();

/// Cap applied to image inputs.
pub const MAX_IMAGE_BYTES: u64 = 20 * 1024 * 1024;

/// Image extensions the recognizer accepts for path inputs.
const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff", "bmp", "webp"];

/// Confidence above which the multi-attempt fallback stops early.
const FALLBACK_EARLY_EXIT: f32 = 0.8;

/// Escalation gate for `preprocess_and_recognize`: a first pass that looks
/// like gibberish below this confidence triggers the full fallback sweep.
const ESCALATION_CONFIDENCE: f32 = 0.6;

/// Raw engine output for one recognition job.
#[derive(Debug, Clone)]
pub struct Recognition {
    pub text: String,
    /// Normalized from Tesseract's 0-100 scale to [0, 1].
    pub confidence: f32,
    pub processing_time_ms: u64,
}

/// Recognition operations the strategy layer depends on.
///
/// [`TextRecognizer`] is the production implementation backed by the
/// Tesseract engine; substituting another implementation lets the fallback
/// logic run against a different backend.
pub trait Recognize: Send + Sync {
    /// Recognize text in an in-memory image buffer.
    fn recognize_buffer(
        &self,
        bytes: &[u8],
    ) -> impl std::future::Future<Output = Result<Recognition, ExtractError>> + Send;

    /// Resolve a reference, recognize it, and escalate on low quality.
    fn preprocess_and_recognize(
        &self,
        reference: &str,
    ) -> impl std::future::Future<Output = Result<Recognition, ExtractError>> + Send;
}

/// Initialized engine parameters, cheap to clone into blocking jobs.
#[derive(Debug, Clone)]
struct Worker {
    tessdata_dir: String,
    language: String,
    engine_mode: u32,
}

/// Lazily-initialized, reusable recognition worker.
pub struct TextRecognizer {
    config: std::sync::Arc<ConfigProvider>,
    worker: Mutex<Option<Worker>>,
}

impl TextRecognizer {
    pub fn new(config: std::sync::Arc<ConfigProvider>) -> Self {
        Self {
            config,
            worker: Mutex::new(None),
        }
    }

    /// Recognize text in an image file.
    ///
    /// Validation order: existence, supported extension, size cap - all
    /// before the engine is initialized or touched.
    pub async fn recognize_file(&self, path: &Path) -> Result<Recognition, ExtractError> {
        self.validate_path(path).await?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ExtractError::processing_with(STRATEGY, "failed to read image", e))?;
        self.run_job(bytes, None, None).await
    }

    /// Recognize text in an in-memory image buffer.
    ///
    /// Buffers skip the extension check; only the size cap applies.
    pub async fn recognize_buffer(&self, bytes: &[u8]) -> Result<Recognition, ExtractError> {
        if bytes.len() as u64 > MAX_IMAGE_BYTES {
            return Err(ExtractError::FileTooLarge {
                strategy: STRATEGY,
                size: bytes.len() as u64,
                max: MAX_IMAGE_BYTES,
            });
        }
        self.run_job(bytes.to_vec(), None, None).await
    }

    /// Multi-attempt recognition over a fixed engine-mode x segmentation
    /// cross-product, keeping the best result seen.
    ///
    /// Returns immediately once a result clears the early-exit confidence;
    /// if every combination fails, the last error is raised.
    pub async fn recognize_with_fallback(&self, path: &Path) -> Result<Recognition, ExtractError> {
        self.validate_path(path).await?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ExtractError::processing_with(STRATEGY, "failed to read image", e))?;

        let mut best: Option<Recognition> = None;
        let mut last_error: Option<ExtractError> = None;

        for (oem, psm) in fallback_modes() {
            match self.run_job(bytes.clone(), Some(oem), Some(psm)).await {
                Ok(result) => {
                    tracing::debug!(
                        oem,
                        psm,
                        confidence = result.confidence,
                        "fallback attempt complete"
                    );
                    if result.confidence > FALLBACK_EARLY_EXIT {
                        return Ok(result);
                    }
                    let better = best
                        .as_ref()
                        .map(|b| result.confidence > b.confidence)
                        .unwrap_or(true);
                    if better {
                        best = Some(result);
                    }
                }
                Err(e) => {
                    tracing::warn!(oem, psm, error = %e, "fallback attempt failed");
                    last_error = Some(e);
                }
            }
        }

        match best {
            Some(result) => Ok(result),
            None => Err(last_error.unwrap_or_else(|| {
                ExtractError::processing(STRATEGY, "all recognition attempts failed")
            })),
        }
    }

    /// Resolve a reference (downloading URLs to a bounded temp file), run a
    /// plain pass, and escalate to the fallback sweep when the output looks
    /// like low-confidence gibberish.
    pub async fn preprocess_and_recognize(
        &self,
        reference: &str,
    ) -> Result<Recognition, ExtractError> {
        let timeout_ms = self.config.snapshot().timeout_ms;
        let suffix = reference
            .rsplit('.')
            .next()
            .filter(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
            .map(|ext| format!(".{}", ext.to_lowercase()))
            .unwrap_or_else(|| ".png".to_string());

        let resolved = fetch::resolve_ref(reference, &suffix, timeout_ms, STRATEGY).await?;

        let first = self.recognize_file(resolved.path()).await?;
        let assessment = quality::assess(&first.text, first.confidence);

        if assessment.likely_gibberish && first.confidence < ESCALATION_CONFIDENCE {
            tracing::info!(
                confidence = first.confidence,
                score = assessment.score,
                "first pass looks garbled, escalating to multi-attempt recognition"
            );
            return self.recognize_with_fallback(resolved.path()).await;
        }

        Ok(first)
    }

    /// Terminate the worker. The next job re-initializes it.
    pub async fn cleanup(&self) {
        let mut guard = self.worker.lock().await;
        if guard.take().is_some() {
            tracing::info!("recognition worker terminated");
        }
    }

    /// Cleanup followed by eager re-initialization; used after a
    /// configuration change so new language/engine settings take effect.
    pub async fn reinitialize(&self) -> Result<(), ExtractError> {
        let mut guard = self.worker.lock().await;
        guard.take();
        *guard = Some(self.init_worker().await?);
        Ok(())
    }

    /// Run one recognition job through the serialized worker.
    async fn run_job(
        &self,
        image_bytes: Vec<u8>,
        oem_override: Option<u32>,
        psm_override: Option<u32>,
    ) -> Result<Recognition, ExtractError> {
        let mut guard = self.worker.lock().await;
        if guard.is_none() {
            *guard = Some(self.init_worker().await?);
        }
        let worker = guard
            .as_ref()
            .cloned()
            .ok_or_else(|| ExtractError::processing(STRATEGY, "worker unavailable"))?;

        // Guard stays held across the blocking call: one job at a time.
        let result = tokio::task::spawn_blocking(move || {
            recognize_blocking(&worker, &image_bytes, oem_override, psm_override)
        })
        .await
        .map_err(|e| ExtractError::processing_with(STRATEGY, "recognition task panicked", e))??;

        Ok(result)
    }

    async fn init_worker(&self) -> Result<Worker, ExtractError> {
        let cfg = self.config.snapshot();
        let language = cfg.language.clone();
        let engine_mode = cfg.engine_mode;

        tokio::task::spawn_blocking(move || {
            let tessdata_dir = ensure_tessdata_available(&language)?;

            // Throwaway instance to validate tessdata before first real job.
            let probe = Tesseract::new(Some(&tessdata_dir), Some(&language)).map_err(|e| {
                ExtractError::processing(
                    STRATEGY,
                    format!("failed to initialize recognition engine: {}", e),
                )
            })?;
            drop(probe);

            tracing::info!(%tessdata_dir, %language, engine_mode, "recognition worker initialized");

            Ok(Worker {
                tessdata_dir,
                language,
                engine_mode,
            })
        })
        .await
        .map_err(|e| ExtractError::processing_with(STRATEGY, "worker init task panicked", e))?
    }

    async fn validate_path(&self, path: &Path) -> Result<(), ExtractError> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|_| ExtractError::FileNotFound {
                strategy: STRATEGY,
                path: path.display().to_string(),
            })?;

        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(ExtractError::UnsupportedFormat {
                strategy: STRATEGY,
                detail: format!("unsupported image extension: .{}", extension),
            });
        }

        if meta.len() > MAX_IMAGE_BYTES {
            return Err(ExtractError::FileTooLarge {
                strategy: STRATEGY,
                size: meta.len(),
                max: MAX_IMAGE_BYTES,
            });
        }

        Ok(())
    }
}

impl Recognize for TextRecognizer {
    fn recognize_buffer(
        &self,
        bytes: &[u8],
    ) -> impl std::future::Future<Output = Result<Recognition, ExtractError>> + Send {
        TextRecognizer::recognize_buffer(self, bytes)
    }

    fn preprocess_and_recognize(
        &self,
        reference: &str,
    ) -> impl std::future::Future<Output = Result<Recognition, ExtractError>> + Send {
        TextRecognizer::preprocess_and_recognize(self, reference)
    }
}

/// The fixed (engine mode, segmentation mode) cross-product tried by
/// `recognize_with_fallback`, as OEM/PSM numbers.
fn fallback_modes() -> [(u32, u32); 6] {
    // OEM 1 = LSTM only, OEM 2 = combined; PSM 3 = auto, 6 = single block,
    // 11 = sparse text.
    [(1, 3), (1, 6), (1, 11), (2, 3), (2, 6), (2, 11)]
}

fn oem_from(mode: u32) -> OcrEngineMode {
    match mode {
        0 => OcrEngineMode::TesseractOnly,
        1 => OcrEngineMode::LstmOnly,
        2 => OcrEngineMode::TesseractLstmCombined,
        _ => OcrEngineMode::Default,
    }
}

fn psm_from(mode: u32) -> u32 {
    match mode {
        3 => 3,   // PSM_AUTO
        6 => 6,   // PSM_SINGLE_BLOCK
        11 => 11, // PSM_SPARSE_TEXT
        _ => 3,   // PSM_AUTO
    }
}

/// One synchronous engine pass over an encoded image buffer.
fn recognize_blocking(
    worker: &Worker,
    image_bytes: &[u8],
    oem_override: Option<u32>,
    psm_override: Option<u32>,
) -> Result<Recognition, ExtractError> {
    let started = Instant::now();

    // Re-encode to BMP: always supported by leptonica regardless of the
    // source format.
    let img = image::load_from_memory(image_bytes)
        .map_err(|e| ExtractError::processing(STRATEGY, format!("failed to decode image: {}", e)))?;
    let rgb = img.into_rgb8();
    let mut bmp = Vec::new();
    rgb.write_to(
        &mut std::io::Cursor::new(&mut bmp),
        image::ImageFormat::Bmp,
    )
    .map_err(|e| ExtractError::processing(STRATEGY, format!("failed to convert to BMP: {}", e)))?;

    let oem = oem_from(oem_override.unwrap_or(worker.engine_mode));
    let mut tess = Tesseract::new_with_oem(
        Some(&worker.tessdata_dir),
        Some(&worker.language),
        oem,
    )
    .map_err(|e| {
        ExtractError::processing(STRATEGY, format!("failed to create engine instance: {}", e))
    })?;

    if let Some(psm) = psm_override {
        // tesseract-static exposes PSM only through the tesseract variable.
        tess = tess
            .set_variable("tessedit_pageseg_mode", &psm_from(psm).to_string())
            .map_err(|e| {
                ExtractError::processing(STRATEGY, format!("failed to set page seg mode: {}", e))
            })?;
    }

    tess = tess
        .set_image_from_mem(&bmp)
        .map_err(|e| ExtractError::processing(STRATEGY, format!("failed to set image: {}", e)))?;
    tess = tess
        .recognize()
        .map_err(|e| ExtractError::processing(STRATEGY, format!("recognition failed: {}", e)))?;

    let text = tess
        .get_text()
        .map_err(|e| ExtractError::processing(STRATEGY, format!("failed to read text: {}", e)))?;
    let confidence = (tess.mean_text_conf() as f32 / 100.0).clamp(0.0, 1.0);

    Ok(Recognition {
        text: text.trim().to_string(),
        confidence,
        processing_time_ms: started.elapsed().as_millis() as u64,
    })
}

/// Ensure traineddata for `language` exists in the cache, downloading the
/// tessdata_fast variant on first use.
fn ensure_tessdata_available(language: &str) -> Result<String, ExtractError> {
    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("docext")
        .join("tessdata");

    std::fs::create_dir_all(&cache_dir).map_err(|e| {
        ExtractError::processing_with(STRATEGY, "failed to create tessdata directory", e)
    })?;

    let traineddata_path = cache_dir.join(format!("{}.traineddata", language));
    if !traineddata_path.exists() {
        let url = format!(
            "https://github.com/tesseract-ocr/tessdata_fast/raw/main/{}.traineddata",
            language
        );
        tracing::info!(language, "downloading tessdata (first use)");
        download_file(&url, &traineddata_path)?;
    }

    cache_dir
        .to_str()
        .map(|s| s.to_string())
        .ok_or_else(|| ExtractError::processing(STRATEGY, "tessdata path is not valid UTF-8"))
}

fn download_file(url: &str, path: &Path) -> Result<(), ExtractError> {
    let response = ureq::get(url)
        .call()
        .map_err(|e| ExtractError::processing(STRATEGY, format!("tessdata download failed: {}", e)))?;

    let buffer = response
        .into_body()
        .read_to_vec()
        .map_err(|e| ExtractError::processing_with(STRATEGY, "tessdata read failed", e))?;

    let mut file = std::fs::File::create(path)
        .map_err(|e| ExtractError::processing_with(STRATEGY, "tessdata create failed", e))?;
    file.write_all(&buffer)
        .map_err(|e| ExtractError::processing_with(STRATEGY, "tessdata write failed", e))?;

    Ok(())
}
