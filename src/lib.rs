//! Document text extraction pipeline with layered OCR fallback.
//!
//! Given a reference to a PDF or image (local path or URL), the pipeline
//! tries extraction strategies in a deterministic order until one succeeds:
//! native embedded-text extraction for PDFs, falling back to page
//! rasterization plus Tesseract OCR for scanned documents, and direct OCR
//! for image references. Results carry confidence scores and a provenance
//! trail of the steps that produced them.
//!
//! The [`orchestrator::OcrOrchestrator`] is the entry point:
//!
//! ```no_run
//! use std::sync::Arc;
//! use docext::config::{ConfigProvider, ExtractOptions};
//! use docext::orchestrator::OcrOrchestrator;
//!
//! # async fn run() -> Result<(), docext::error::ExtractError> {
//! let orchestrator = OcrOrchestrator::new(Arc::new(ConfigProvider::from_env()));
//! let result = orchestrator
//!     .extract_text("scan.pdf", &ExtractOptions::default())
//!     .await?;
//! println!("{} ({:.2})", result.text, result.confidence);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod fetch;
pub mod metadata;
pub mod orchestrator;
pub mod pdf_text;
pub mod quality;
pub mod rasterize;
pub mod recognize;
pub mod strategy;

pub use config::{ConfigProvider, ExtractOptions, OcrConfig};
pub use error::ExtractError;
pub use orchestrator::{OcrOrchestrator, OcrResult};
pub use strategy::Strategy;
