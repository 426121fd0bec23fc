//! Extraction orchestration.
//!
//! The orchestrator classifies a document reference, builds an ordered
//! strategy chain from configuration, and executes the chain with fallback
//! on retryable failure. The first success wins; a non-retryable failure
//! aborts the chain; exhaustion raises an aggregate error naming the last
//! strategy attempted.

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::config::{ConfigProvider, ExtractOptions, OcrConfig};
use crate::error::ExtractError;
use crate::metadata::{MetadataSink, TracingSink};
use crate::quality::{self, QualityAssessment};
use crate::recognize::TextRecognizer;
use crate::strategy::{DocumentKind, ExtractionMetadata, Strategy, StrategyExecutor};

/// Final output of a successful extraction.
#[derive(Debug, Clone, Serialize)]
pub struct OcrResult {
    /// Sanitized extracted text.
    pub text: String,
    /// Top-level strategy that produced the result. A PDF that fell
    /// through to rasterization and OCR still reports the PDF strategy;
    /// the nested steps are recorded in `metadata.processing_steps`.
    pub method: Strategy,
    pub confidence: f32,
    /// Wall-clock time for the whole extraction call.
    pub processing_time_ms: u64,
    pub metadata: ExtractionMetadata,
}

/// Result plus quality and performance reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    #[serde(flatten)]
    pub result: OcrResult,
    pub quality_assessment: QualityAssessment,
    pub performance_metrics: PerformanceMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceMetrics {
    pub method: Strategy,
    pub confidence: f32,
    pub text_length: usize,
    pub quality_score: f32,
    /// Unix timestamp in milliseconds.
    pub timestamp_ms: u64,
}

/// Per-document outcome of a batch run.
#[derive(Debug, Serialize)]
pub struct BatchItem {
    pub document_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<OcrResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemHealth {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Snapshot of pipeline availability, derived purely from configuration.
#[derive(Debug, Serialize)]
pub struct ProcessingStats {
    pub available_methods: Vec<&'static str>,
    pub system_health: SystemHealth,
    pub configuration_valid: bool,
}

/// Root of the extraction pipeline.
pub struct OcrOrchestrator {
    config: Arc<ConfigProvider>,
    executor: StrategyExecutor,
    sink: Box<dyn MetadataSink>,
}

impl OcrOrchestrator {
    pub fn new(config: Arc<ConfigProvider>) -> Self {
        let recognizer = Arc::new(TextRecognizer::new(Arc::clone(&config)));
        Self {
            executor: StrategyExecutor::new(recognizer),
            config,
            sink: Box::new(TracingSink),
        }
    }

    /// Orchestrator sharing an externally-constructed recognizer worker.
    pub fn with_recognizer(config: Arc<ConfigProvider>, recognizer: Arc<TextRecognizer>) -> Self {
        Self {
            executor: StrategyExecutor::new(recognizer),
            config,
            sink: Box::new(TracingSink),
        }
    }

    /// Replace the outcome sink, e.g. to persist results to an external
    /// metadata store.
    pub fn with_sink(mut self, sink: Box<dyn MetadataSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Extract text from a document reference, trying strategies in order
    /// until one succeeds.
    pub async fn extract_text(
        &self,
        document_ref: &str,
        options: &ExtractOptions,
    ) -> Result<OcrResult, ExtractError> {
        let started = Instant::now();

        if document_ref.trim().is_empty() {
            return Err(ExtractError::Configuration {
                reason: "document reference must not be empty".into(),
            });
        }

        // Fail fast on invalid effective configuration, before any I/O.
        let cfg = options.overlay(&self.config.snapshot());
        cfg.validate()?;

        let kind = DocumentKind::detect(document_ref);
        tracing::info!(document_ref, kind = ?kind, "document type detected");

        let chain = build_chain(kind, &cfg);
        tracing::info!(
            chain = ?chain.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
            "strategy chain built"
        );

        if chain.is_empty() {
            return Err(ExtractError::Configuration {
                reason: format!(
                    "no extraction methods available for document type {:?}",
                    kind
                ),
            });
        }

        let mut last_error: Option<ExtractError> = None;
        for (attempt, strategy) in chain.iter().enumerate() {
            tracing::info!(strategy = %strategy, "attempting extraction strategy");
            self.sink.mark_pending(document_ref, strategy.as_str());
            match self.executor.execute(*strategy, document_ref, &cfg).await {
                Ok(outcome) => {
                    let elapsed = started.elapsed().as_millis() as u64;
                    tracing::info!(
                        strategy = %strategy,
                        confidence = outcome.confidence,
                        chars = outcome.text.len(),
                        elapsed_ms = elapsed,
                        "extraction strategy succeeded"
                    );
                    let result = OcrResult {
                        text: outcome.text,
                        method: *strategy,
                        confidence: outcome.confidence,
                        processing_time_ms: elapsed,
                        metadata: outcome.metadata,
                    };
                    self.sink.record_success(document_ref, &result, attempt as u32);
                    return Ok(result);
                }
                Err(e) => {
                    tracing::warn!(
                        strategy = %strategy,
                        error = %e,
                        code = e.code(),
                        retryable = e.retryable(),
                        "extraction strategy failed"
                    );
                    if !e.retryable() {
                        self.sink.record_failure(
                            document_ref,
                            strategy.as_str(),
                            &e,
                            attempt as u32,
                            Some(started.elapsed().as_millis() as u64),
                        );
                        return Err(e);
                    }
                    last_error = Some(e);
                }
            }
        }

        let last_strategy = chain
            .last()
            .map(|s| s.as_str().to_string())
            .unwrap_or_default();
        let detail = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no strategy produced a result".into());
        let err = ExtractError::AllMethodsFailed {
            last_strategy: last_strategy.clone(),
            detail,
        };
        self.sink.record_failure(
            document_ref,
            &last_strategy,
            &err,
            chain.len().saturating_sub(1) as u32,
            Some(started.elapsed().as_millis() as u64),
        );
        Err(err)
    }

    /// Extract text and attach quality and performance reporting.
    ///
    /// Extraction failures propagate unchanged.
    pub async fn process_with_metrics(
        &self,
        document_ref: &str,
        options: &ExtractOptions,
    ) -> Result<MetricsReport, ExtractError> {
        let result = self.extract_text(document_ref, options).await?;
        let quality_assessment = quality::assess(&result.text, result.confidence);

        let performance_metrics = PerformanceMetrics {
            method: result.method,
            confidence: result.confidence,
            text_length: result.text.chars().count(),
            quality_score: quality_assessment.score,
            timestamp_ms: unix_millis(),
        };

        Ok(MetricsReport {
            result,
            quality_assessment,
            performance_metrics,
        })
    }

    /// Run extraction for every reference concurrently.
    ///
    /// Each document is fully isolated: one failure never cancels or
    /// affects the others. The output preserves input order and length.
    pub async fn process_batch(
        &self,
        document_refs: &[String],
        options: &ExtractOptions,
    ) -> Vec<BatchItem> {
        let tasks = document_refs.iter().map(|document_ref| async {
            match self.extract_text(document_ref, options).await {
                Ok(result) => BatchItem {
                    document_ref: document_ref.clone(),
                    result: Some(result),
                    error: None,
                },
                Err(e) => BatchItem {
                    document_ref: document_ref.clone(),
                    result: None,
                    error: Some(e.to_string()),
                },
            }
        });

        futures::future::join_all(tasks).await
    }

    /// Availability snapshot; a pure function of current configuration.
    pub fn processing_stats(&self) -> ProcessingStats {
        let cfg = self.config.snapshot();
        let available_methods = cfg.enabled_methods();
        let system_health = match available_methods.len() {
            0 => SystemHealth::Unhealthy,
            1 => SystemHealth::Degraded,
            _ => SystemHealth::Healthy,
        };
        ProcessingStats {
            available_methods,
            system_health,
            configuration_valid: cfg.validate().is_ok(),
        }
    }
}

/// Build the ordered strategy chain for a document type.
///
/// Native PDF extraction only applies to PDFs; direct OCR only to non-PDF
/// references (PDFs reach OCR solely through the nested fallback inside
/// the PDF strategy). Disabled strategies never enter the chain.
pub fn build_chain(kind: DocumentKind, cfg: &OcrConfig) -> Vec<Strategy> {
    let mut chain = Vec::new();
    if kind == DocumentKind::Pdf && cfg.pdf_text_enabled {
        chain.push(Strategy::PdfText);
    }
    if kind != DocumentKind::Pdf && cfg.tesseract_enabled {
        chain.push(Strategy::TesseractOcr);
    }
    chain
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
