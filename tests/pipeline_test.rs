//! End-to-end tests over the public pipeline surface.
//!
//! These avoid the OCR engine and the network: they exercise chain
//! construction, configuration gating, batch isolation, and the native
//! text pass against PDFs generated with lopdf.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use docext::config::{ConfigProvider, ExtractOptions, OcrConfig};
use docext::error::ExtractError;
use docext::orchestrator::{build_chain, OcrOrchestrator, SystemHealth};
use docext::pdf_text::PdfTextExtractor;
use docext::rasterize::{ConversionOptions, PdfRasterizer};
use docext::recognize::{Recognition, Recognize};
use docext::strategy::{
    DocumentKind, Strategy, StrategyExecutor, STEP_NATIVE_TEXT, STEP_PDF_TO_IMAGE, STEP_TESSERACT,
};

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

const SAMPLE_TEXT: &str =
    "The committee reviewed the quarterly filings and approved the revised budget without objection.";

fn orchestrator_with(cfg: OcrConfig) -> OcrOrchestrator {
    OcrOrchestrator::new(Arc::new(ConfigProvider::new(cfg)))
}

/// Write a PDF with one page per entry in `page_ops`.
fn write_pdf_pages(page_ops: Vec<Vec<Operation>>) -> tempfile::NamedTempFile {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let count = page_ops.len() as i64;
    let mut kids: Vec<Object> = Vec::new();
    for operations in page_ops {
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode content stream"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(page_id.into());
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let temp = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
    doc.save(temp.path()).unwrap();
    temp
}

/// Write a single-page PDF whose content stream is `operations`.
fn write_pdf(operations: Vec<Operation>) -> tempfile::NamedTempFile {
    write_pdf_pages(vec![operations])
}

/// PDF of `pages` blank pages, like a multi-page scan placeholder.
fn write_blank_pdf(pages: u32) -> tempfile::NamedTempFile {
    write_pdf_pages((0..pages).map(|_| Vec::new()).collect())
}

/// PDF with a selectable text layer.
fn write_text_pdf() -> tempfile::NamedTempFile {
    write_pdf(vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), 24.into()]),
        Operation::new("Td", vec![72.into(), 700.into()]),
        Operation::new("Tj", vec![Object::string_literal(SAMPLE_TEXT)]),
        Operation::new("ET", vec![]),
    ])
}

/// PDF with a blank page and no text layer, like a scan placeholder.
fn write_empty_pdf() -> tempfile::NamedTempFile {
    write_pdf(Vec::new())
}

#[test]
fn pdf_chains_keep_recognition_nested() {
    let cfg = OcrConfig::default();
    let chain = build_chain(DocumentKind::detect("contract.pdf"), &cfg);
    assert_eq!(chain, vec![Strategy::PdfText]);
}

#[test]
fn image_chains_skip_native_extraction() {
    let cfg = OcrConfig::default();
    for reference in ["scan.png", "photo.jpg", "mystery.bin"] {
        let chain = build_chain(DocumentKind::detect(reference), &cfg);
        assert!(
            !chain.contains(&Strategy::PdfText),
            "native extraction leaked into chain for {}",
            reference
        );
    }
}

#[tokio::test]
async fn selectable_text_extracts_with_fixed_confidence() {
    let pdf = write_text_pdf();
    let orch = orchestrator_with(OcrConfig::default());

    let result = orch
        .extract_text(&pdf.path().display().to_string(), &ExtractOptions::default())
        .await
        .unwrap();

    assert_eq!(result.method, Strategy::PdfText);
    assert_eq!(result.confidence, 0.9);
    assert!(result.text.contains("quarterly filings"));
    assert_eq!(result.metadata.page_count, Some(1));
    assert_eq!(
        result.metadata.processing_steps,
        vec![STEP_NATIVE_TEXT.to_string()]
    );
}

#[tokio::test]
async fn extraction_is_deterministic_for_identical_inputs() {
    let pdf = write_text_pdf();
    let reference = pdf.path().display().to_string();
    let orch = orchestrator_with(OcrConfig::default());

    let first = orch
        .extract_text(&reference, &ExtractOptions::default())
        .await
        .unwrap();
    let second = orch
        .extract_text(&reference, &ExtractOptions::default())
        .await
        .unwrap();

    assert_eq!(first.text, second.text);
    assert_eq!(first.confidence, second.confidence);
}

#[tokio::test]
async fn disabled_pipeline_refuses_to_run() {
    let orch = orchestrator_with(OcrConfig {
        pdf_text_enabled: false,
        tesseract_enabled: false,
        ..OcrConfig::default()
    });
    let err = orch
        .extract_text("anything.pdf", &ExtractOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::Configuration { .. }));
    assert!(!err.retryable());
}

#[tokio::test]
async fn batch_with_an_engineered_failure_stays_isolated() {
    let pdf = write_text_pdf();
    let good_ref = pdf.path().display().to_string();
    let refs = vec![
        good_ref.clone(),
        "/missing/broken.pdf".to_string(),
        good_ref.clone(),
    ];

    let orch = orchestrator_with(OcrConfig::default());
    let items = orch.process_batch(&refs, &ExtractOptions::default()).await;

    assert_eq!(items.len(), 3);
    for (item, reference) in items.iter().zip(&refs) {
        assert_eq!(&item.document_ref, reference);
    }
    assert!(items[0].result.is_some());
    assert!(items[0].error.is_none());
    assert!(items[1].result.is_none());
    let failure = items[1].error.as_ref().expect("missing file must fail");
    assert!(failure.contains("pdf-text-extraction"));
    assert!(items[2].result.is_some());
}

#[tokio::test]
async fn native_pass_reports_scanned_documents() {
    let empty_pdf = write_empty_pdf();
    let extractor = PdfTextExtractor::new();
    let extraction = extractor.extract_file(empty_pdf.path()).await.unwrap();

    assert_eq!(extraction.page_count, 1);
    assert!(!extraction.has_selectable_text);
    assert!(extraction.text.is_empty());
    assert_eq!(extraction.extraction_method, "pdf-text-extraction");
}

/// Recognition backend that rejects the second page it sees.
struct FlakyRecognizer {
    calls: AtomicUsize,
}

impl FlakyRecognizer {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

impl Recognize for FlakyRecognizer {
    async fn recognize_buffer(&self, _bytes: &[u8]) -> Result<Recognition, ExtractError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == 2 {
            return Err(ExtractError::processing(
                "tesseract-ocr",
                "engine rejected the page",
            ));
        }
        let (text, confidence) = if call == 1 {
            ("first page text", 0.8)
        } else {
            ("third page text", 0.6)
        };
        Ok(Recognition {
            text: text.to_string(),
            confidence,
            processing_time_ms: 1,
        })
    }

    async fn preprocess_and_recognize(&self, _reference: &str) -> Result<Recognition, ExtractError> {
        Err(ExtractError::processing("tesseract-ocr", "unused in this test"))
    }
}

#[tokio::test]
async fn failed_page_is_skipped_and_confidence_averages_the_rest() {
    let pdf = write_blank_pdf(3);
    let executor = StrategyExecutor::new(Arc::new(FlakyRecognizer::new()));

    let outcome = executor
        .execute(
            Strategy::PdfText,
            &pdf.path().display().to_string(),
            &OcrConfig::default(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.text, "first page text\n\nthird page text");
    assert!((outcome.confidence - 0.7).abs() < 1e-6);
    assert_eq!(outcome.metadata.page_count, Some(3));
    assert_eq!(outcome.metadata.image_count, Some(3));
    assert_eq!(
        outcome.metadata.processing_steps,
        vec![STEP_PDF_TO_IMAGE.to_string(), STEP_TESSERACT.to_string()]
    );
}

#[tokio::test]
async fn convert_renders_exactly_the_requested_window() {
    let pdf = write_blank_pdf(10);
    let rasterizer = PdfRasterizer::new();
    let options = ConversionOptions {
        start_page: 3,
        end_page: 5,
        ..ConversionOptions::default()
    };

    let output = rasterizer.convert(pdf.path(), &options).await.unwrap();

    assert_eq!(output.total_pages, 10);
    let numbers: Vec<u32> = output.pages.iter().map(|p| p.page_number).collect();
    assert_eq!(numbers, vec![3, 4, 5]);
    assert!(output.pages.iter().all(|p| !p.image.is_empty()));
}

#[tokio::test]
async fn convert_pages_drops_out_of_range_numbers() {
    let pdf = write_blank_pdf(5);
    let rasterizer = PdfRasterizer::new();

    let output = rasterizer
        .convert_pages(pdf.path(), &[0, 3, 10], &ConversionOptions::default())
        .await
        .unwrap();

    assert_eq!(output.total_pages, 5);
    let numbers: Vec<u32> = output.pages.iter().map(|p| p.page_number).collect();
    assert_eq!(numbers, vec![3]);
}

#[tokio::test]
async fn missing_document_exhausts_the_chain_with_an_aggregate_error() {
    let orch = orchestrator_with(OcrConfig::default());
    let err = orch
        .extract_text("/absent/report.pdf", &ExtractOptions::default())
        .await
        .unwrap_err();

    match err {
        ExtractError::AllMethodsFailed {
            last_strategy,
            detail,
        } => {
            assert_eq!(last_strategy, "pdf-text-extraction");
            assert!(!detail.is_empty());
        }
        other => panic!("expected aggregate failure, got {:?}", other),
    }
}

#[tokio::test]
async fn metrics_report_scores_the_extracted_text() {
    let pdf = write_text_pdf();
    let orch = orchestrator_with(OcrConfig::default());

    let report = orch
        .process_with_metrics(&pdf.path().display().to_string(), &ExtractOptions::default())
        .await
        .unwrap();

    assert_eq!(report.performance_metrics.method, Strategy::PdfText);
    assert_eq!(report.performance_metrics.confidence, 0.9);
    assert!(report.quality_assessment.score > 0.6);
    assert!(!report.quality_assessment.likely_gibberish);
    assert!(report.performance_metrics.timestamp_ms > 0);
}

#[test]
fn stats_reflect_configuration() {
    let orch = orchestrator_with(OcrConfig::default());
    let stats = orch.processing_stats();
    assert_eq!(stats.system_health, SystemHealth::Healthy);
    assert_eq!(
        stats.available_methods,
        vec!["pdf-text-extraction", "tesseract-ocr"]
    );

    let orch = orchestrator_with(OcrConfig {
        tesseract_enabled: false,
        ..OcrConfig::default()
    });
    assert_eq!(orch.processing_stats().system_health, SystemHealth::Degraded);
}

#[tokio::test]
async fn configuration_updates_apply_to_subsequent_calls() {
    let provider = Arc::new(ConfigProvider::new(OcrConfig::default()));
    let orch = OcrOrchestrator::new(Arc::clone(&provider));

    provider.update(&ExtractOptions {
        pdf_text_enabled: Some(false),
        tesseract_enabled: Some(false),
        ..ExtractOptions::default()
    });

    let err = orch
        .extract_text("doc.pdf", &ExtractOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::Configuration { .. }));
}
