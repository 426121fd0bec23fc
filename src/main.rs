use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docext::config::{ConfigProvider, ExtractOptions, ImageOutputFormat, OcrConfig};
use docext::orchestrator::OcrOrchestrator;

#[derive(Parser, Debug)]
#[command(name = "docext")]
#[command(about = "Extract text from PDFs and images with layered OCR fallback")]
#[command(version)]
struct Args {
    /// Document references (local paths or http(s) URLs)
    #[arg(required_unless_present = "stats")]
    documents: Vec<String>,

    /// Disable native PDF text extraction
    #[arg(long, env = "OCR_DISABLE_PDF_TEXT")]
    no_pdf_text: bool,

    /// Disable Tesseract OCR
    #[arg(long, env = "OCR_DISABLE_TESSERACT")]
    no_tesseract: bool,

    /// Recognition language (e.g. "eng", "deu", "fra")
    #[arg(long, env = "OCR_LANGUAGE")]
    language: Option<String>,

    /// Render resolution for the OCR fallback
    #[arg(long, env = "OCR_DPI")]
    dpi: Option<u32>,

    /// Rendered page format
    #[arg(long, env = "OCR_IMAGE_FORMAT", value_enum)]
    image_format: Option<ImageOutputFormat>,

    /// Per-attempt timeout in milliseconds
    #[arg(long, env = "OCR_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    /// Tesseract engine mode (0-3, OEM numbering)
    #[arg(long, env = "OCR_ENGINE_MODE")]
    engine_mode: Option<u32>,

    /// Attach quality assessment and performance metrics to each result
    #[arg(long)]
    metrics: bool,

    /// Print pipeline availability and exit
    #[arg(long)]
    stats: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log_level: String,
}

impl Args {
    fn options(&self) -> ExtractOptions {
        ExtractOptions {
            pdf_text_enabled: self.no_pdf_text.then_some(false),
            tesseract_enabled: self.no_tesseract.then_some(false),
            timeout_ms: self.timeout_ms,
            max_retries: None,
            language: self.language.clone(),
            engine_mode: self.engine_mode,
            dpi: self.dpi,
            image_format: self.image_format,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let options = args.options();
    let config = options.overlay(&OcrConfig::from_env());
    let orchestrator = OcrOrchestrator::new(Arc::new(ConfigProvider::new(config)));

    if args.stats {
        let stats = orchestrator.processing_stats();
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    if args.documents.len() == 1 {
        let document_ref = &args.documents[0];
        if args.metrics {
            let report = orchestrator
                .process_with_metrics(document_ref, &ExtractOptions::default())
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            let result = orchestrator
                .extract_text(document_ref, &ExtractOptions::default())
                .await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        return Ok(());
    }

    let items = orchestrator
        .process_batch(&args.documents, &ExtractOptions::default())
        .await;
    let failures = items.iter().filter(|i| i.error.is_some()).count();
    println!("{}", serde_json::to_string_pretty(&items)?);

    if failures > 0 {
        anyhow::bail!("{} of {} documents failed", failures, items.len());
    }
    Ok(())
}
