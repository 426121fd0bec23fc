//! Outcome reporting to an external document-metadata store.
//!
//! The pipeline never depends on the sink's outcome: calls are
//! fire-and-forget bookkeeping. Storage schema and engine live outside
//! this crate; [`TracingSink`] is the default no-store implementation.

use crate::error::ExtractError;
use crate::orchestrator::OcrResult;

/// Receiver for final extraction outcomes.
pub trait MetadataSink: Send + Sync {
    /// A document's extraction is about to run with the given method.
    fn mark_pending(&self, document_id: &str, method: &str);

    /// Extraction succeeded.
    fn record_success(&self, document_id: &str, result: &OcrResult, retry_count: u32);

    /// Extraction failed terminally.
    fn record_failure(
        &self,
        document_id: &str,
        method: &str,
        error: &ExtractError,
        retry_count: u32,
        processing_time_ms: Option<u64>,
    );
}

/// Sink that logs outcomes instead of persisting them.
#[derive(Debug, Default)]
pub struct TracingSink;

impl MetadataSink for TracingSink {
    fn mark_pending(&self, document_id: &str, method: &str) {
        tracing::info!(document_id, method, "extraction pending");
    }

    fn record_success(&self, document_id: &str, result: &OcrResult, retry_count: u32) {
        tracing::info!(
            document_id,
            method = %result.method,
            confidence = result.confidence,
            chars = result.text.len(),
            elapsed_ms = result.processing_time_ms,
            retry_count,
            "extraction result recorded"
        );
    }

    fn record_failure(
        &self,
        document_id: &str,
        method: &str,
        error: &ExtractError,
        retry_count: u32,
        processing_time_ms: Option<u64>,
    ) {
        tracing::warn!(
            document_id,
            method,
            code = error.code(),
            error = %error,
            retry_count,
            elapsed_ms = processing_time_ms,
            "extraction failure recorded"
        );
    }
}
