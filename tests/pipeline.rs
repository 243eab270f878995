//! Pipeline integration tests with in-process fake engines.
//!
//! No pdfium or tesseract is needed: a fake rasterizer "renders" page N as a
//! 1-pixel-high image N pixels wide, and a fake recognizer maps that width
//! back to the page's scripted text. Fixture PDFs are temp files that only
//! need the `%PDF` header to pass input validation.

use async_trait::async_trait;
use edgequake_pdf2ocr::{
    convert, convert_from_bytes, convert_to_file, convert_with_cancel, write_output,
    ConversionProgressCallback, DocumentMetadata, DocumentResult, OcrConfig, OcrConfigBuilder,
    OpenDocument, PageError, PageRasterizer, PageResult, PageStatus, Pdf2OcrError,
    RasterizationError, RecognitionError, RecognizeOptions, RenderOptions, TextRecognizer,
};
use image::DynamicImage;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── Fakes ────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum FakePage {
    Text(&'static str),
    Blank,
    Unrenderable,
    /// Recognition never returns.
    Stall,
    Panic,
}

struct FakeRasterizer {
    pages: Vec<FakePage>,
    open_error: Mutex<Option<Pdf2OcrError>>,
}

impl FakeRasterizer {
    fn new(pages: &[FakePage]) -> Arc<Self> {
        Arc::new(Self {
            pages: pages.to_vec(),
            open_error: Mutex::new(None),
        })
    }

    fn failing(error: Pdf2OcrError) -> Arc<Self> {
        Arc::new(Self {
            pages: vec![],
            open_error: Mutex::new(Some(error)),
        })
    }
}

#[async_trait]
impl PageRasterizer for FakeRasterizer {
    async fn open(
        &self,
        _path: &Path,
        _password: Option<&str>,
    ) -> Result<Box<dyn OpenDocument>, Pdf2OcrError> {
        if let Some(e) = self.open_error.lock().unwrap().take() {
            return Err(e);
        }
        Ok(Box::new(FakeDocument {
            metadata: DocumentMetadata {
                page_count: self.pages.len(),
                pdf_version: "Pdf1_7".into(),
                ..Default::default()
            },
            pages: self.pages.clone(),
        }))
    }
}

struct FakeDocument {
    metadata: DocumentMetadata,
    pages: Vec<FakePage>,
}

#[async_trait]
impl OpenDocument for FakeDocument {
    fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }

    async fn render_page(
        &self,
        index: usize,
        _options: &RenderOptions,
    ) -> Result<DynamicImage, RasterizationError> {
        match self.pages[index] {
            FakePage::Unrenderable => Err(RasterizationError(format!(
                "page {} has an unsupported content stream",
                index + 1
            ))),
            _ => Ok(DynamicImage::new_luma8(index as u32 + 1, 1)),
        }
    }
}

struct FakeRecognizer {
    pages: Vec<FakePage>,
    installed: &'static [&'static str],
    /// Later pages answer sooner, so completion order is reversed.
    reverse_delay_ms: u64,
    seen: Mutex<Vec<usize>>,
}

impl FakeRecognizer {
    fn new(pages: &[FakePage]) -> Arc<Self> {
        Self::build(pages, 0)
    }

    fn reversed(pages: &[FakePage]) -> Arc<Self> {
        Self::build(pages, 15)
    }

    fn build(pages: &[FakePage], reverse_delay_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            pages: pages.to_vec(),
            installed: &["eng", "rus"],
            reverse_delay_ms,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn seen(&self) -> Vec<usize> {
        let mut seen = self.seen.lock().unwrap().clone();
        seen.sort_unstable();
        seen
    }
}

#[async_trait]
impl TextRecognizer for FakeRecognizer {
    async fn recognize(
        &self,
        image: &DynamicImage,
        options: &RecognizeOptions,
    ) -> Result<String, RecognitionError> {
        let page_num = image.width() as usize;
        self.seen.lock().unwrap().push(page_num);

        for lang in options.language.split('+') {
            if !self.installed.contains(&lang) {
                return Err(RecognitionError::LanguageNotInstalled {
                    language: lang.to_string(),
                    detail: format!("Failed loading language '{lang}'"),
                });
            }
        }

        let delay = (self.pages.len() - page_num) as u64 * self.reverse_delay_ms;
        tokio::time::sleep(Duration::from_millis(delay)).await;

        match self.pages[page_num - 1] {
            FakePage::Text(t) => Ok(format!("{t}\n\n\x0c")),
            FakePage::Blank => Ok(" \n\x0c".into()),
            FakePage::Unrenderable => unreachable!("unrenderable page reached the recognizer"),
            FakePage::Stall => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            FakePage::Panic => panic!("engine crashed"),
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Library logs go to the test output; filter with RUST_LOG.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn fixture_pdf(dir: &Path, name: &str) -> PathBuf {
    init_tracing();
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(b"%PDF-1.7\n%fake\n").unwrap();
    path
}

fn builder(language: &str, pages: &[FakePage]) -> (OcrConfigBuilder, Arc<FakeRecognizer>) {
    init_tracing();
    let recognizer = FakeRecognizer::new(pages);
    let b = OcrConfig::builder(language)
        .rasterizer(FakeRasterizer::new(pages))
        .recognizer(recognizer.clone());
    (b, recognizer)
}

fn assert_numbered(doc: &DocumentResult, n: usize) {
    assert_eq!(doc.pages.len(), n);
    for (i, page) in doc.pages.iter().enumerate() {
        assert_eq!(page.page_num, i + 1);
        assert_eq!(page.error.is_some(), page.status == PageStatus::Failed);
    }
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unrenderable_middle_page_is_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = fixture_pdf(dir.path(), "three.pdf");
    let pages = [
        FakePage::Text("first page"),
        FakePage::Unrenderable,
        FakePage::Text("third page"),
    ];
    let (b, recognizer) = builder("eng", &pages);
    let output = convert(&pdf, &b.build().unwrap()).await.unwrap();
    let doc = &output.document;

    assert_numbered(doc, 3);
    assert_eq!(doc.pages[0].status, PageStatus::Success);
    assert_eq!(doc.pages[0].text, "first page");
    assert_eq!(doc.pages[2].text, "third page");
    assert_eq!(doc.pages[1].status, PageStatus::Failed);
    assert!(doc.pages[1].text.is_empty());
    match doc.pages[1].error {
        Some(PageError::RasterizationFailed { page, ref detail }) => {
            assert_eq!(page, 2);
            assert!(detail.contains("content stream"), "{detail}");
        }
        ref other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(recognizer.seen(), vec![1, 3]);

    assert_eq!(output.stats.total_pages, 3);
    assert_eq!(output.stats.succeeded_pages, 2);
    assert_eq!(output.stats.failed_pages, 1);

    let json: serde_json::Value = serde_json::from_slice(&doc.to_json().unwrap()).unwrap();
    assert_eq!(json["total_pages"], 3);
    let errors = json["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].as_str().unwrap().starts_with("Page 2:"), "{errors:?}");
}

#[tokio::test]
async fn uninstalled_language_fails_the_page() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = fixture_pdf(dir.path(), "one.pdf");
    let (b, _) = builder("xyz", &[FakePage::Text("never seen")]);
    let output = convert(&pdf, &b.build().unwrap()).await.unwrap();

    assert_numbered(&output.document, 1);
    let page = &output.document.pages[0];
    assert_eq!(page.status, PageStatus::Failed);
    match page.error {
        Some(PageError::RecognitionFailed { ref detail, .. }) => {
            assert!(detail.contains("'xyz'"), "{detail}")
        }
        ref other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn five_page_file_parses_back_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = fixture_pdf(dir.path(), "scan.pdf");
    let pages = [
        FakePage::Text("один"),
        FakePage::Text("два"),
        FakePage::Text("три"),
        FakePage::Text("четыре"),
        FakePage::Text("пять"),
    ];
    let (b, _) = builder("rus", &pages);
    let (path, stats) = convert_to_file(&pdf, None, &b.concurrency(3).build().unwrap())
        .await
        .unwrap();

    assert_eq!(path, dir.path().join("scan.ocr.json"));
    assert_eq!(stats.succeeded_pages, 5);

    let bytes = std::fs::read(&path).unwrap();
    let raw = String::from_utf8(bytes.clone()).unwrap();
    let positions: Vec<usize> = (1..=5)
        .map(|n| raw.find(&format!("\"{n}\":")).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "{raw}");
    assert!(raw.contains("четыре"), "text must be written unescaped");

    let doc = DocumentResult::from_json(&bytes).unwrap();
    assert_numbered(&doc, 5);
    assert_eq!(doc.language, "rus");
    let texts: Vec<&str> = doc.pages.iter().map(|p| p.text.as_str()).collect();
    assert_eq!(texts, ["один", "два", "три", "четыре", "пять"]);
}

// ── Properties ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn results_follow_page_order_not_completion_order() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = fixture_pdf(dir.path(), "order.pdf");
    let pages: Vec<FakePage> = ["a", "b", "c", "d", "e", "f"]
        .into_iter()
        .map(FakePage::Text)
        .collect();

    let config = OcrConfig::builder("eng")
        .rasterizer(FakeRasterizer::new(&pages))
        .recognizer(FakeRecognizer::reversed(&pages))
        .concurrency(6)
        .build()
        .unwrap();
    let doc = convert(&pdf, &config).await.unwrap().document;

    assert_numbered(&doc, 6);
    let texts: Vec<&str> = doc.pages.iter().map(|p| p.text.as_str()).collect();
    assert_eq!(texts, ["a", "b", "c", "d", "e", "f"]);
}

#[tokio::test]
async fn concurrent_run_equals_sequential_run() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = fixture_pdf(dir.path(), "mix.pdf");
    let pages = [
        FakePage::Text("alpha"),
        FakePage::Blank,
        FakePage::Unrenderable,
        FakePage::Text("delta"),
        FakePage::Panic,
        FakePage::Text("zeta"),
    ];

    let run = |concurrency: usize| {
        let config = OcrConfig::builder("eng")
            .rasterizer(FakeRasterizer::new(&pages))
            .recognizer(FakeRecognizer::reversed(&pages))
            .concurrency(concurrency)
            .build()
            .unwrap();
        let pdf = pdf.clone();
        async move { convert(&pdf, &config).await.unwrap().document }
    };

    let sequential = run(1).await;
    let concurrent = run(4).await;
    assert_numbered(&sequential, 6);
    assert_eq!(sequential, concurrent);
    assert_eq!(sequential.to_json().unwrap(), concurrent.to_json().unwrap());
}

#[tokio::test]
async fn blank_page_is_success_with_empty_text() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = fixture_pdf(dir.path(), "blank.pdf");
    let pages = [FakePage::Blank, FakePage::Unrenderable];
    let (b, _) = builder("eng", &pages);
    let doc = convert(&pdf, &b.build().unwrap()).await.unwrap().document;

    assert_eq!(doc.pages[0].status, PageStatus::Success);
    assert_eq!(doc.pages[0].text, "");
    assert!(doc.pages[0].error.is_none());
    assert_eq!(doc.pages[1].status, PageStatus::Failed);
    assert_eq!(doc.pages[1].text, "");
}

#[tokio::test]
async fn recognizer_panic_fails_only_that_page() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = fixture_pdf(dir.path(), "panic.pdf");
    let pages = [FakePage::Panic, FakePage::Text("fine")];
    let (b, _) = builder("eng", &pages);
    let doc = convert(&pdf, &b.build().unwrap()).await.unwrap().document;

    assert!(matches!(
        doc.pages[0].error,
        Some(PageError::RecognitionFailed { page: 1, .. })
    ));
    assert_eq!(doc.pages[1].text, "fine");
}

#[tokio::test]
async fn serialising_twice_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = fixture_pdf(dir.path(), "twice.pdf");
    let pages = [FakePage::Text("same"), FakePage::Unrenderable];
    let (b, _) = builder("eng", &pages);
    let doc = convert(&pdf, &b.build().unwrap()).await.unwrap().document;

    assert_eq!(doc.to_json().unwrap(), doc.to_json().unwrap());
}

#[tokio::test]
async fn zero_page_document_is_valid_and_empty() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = fixture_pdf(dir.path(), "empty.pdf");
    let (b, recognizer) = builder("eng", &[]);
    let output = convert(&pdf, &b.build().unwrap()).await.unwrap();

    assert!(output.document.pages.is_empty());
    assert_eq!(output.stats.total_pages, 0);
    assert!(recognizer.seen().is_empty());
}

#[tokio::test]
async fn progress_events_cover_every_page() {
    #[derive(Default)]
    struct Counter {
        started: AtomicUsize,
        completed: AtomicUsize,
        errors: AtomicUsize,
        total: AtomicUsize,
        succeeded: AtomicUsize,
    }

    impl ConversionProgressCallback for Counter {
        fn on_conversion_start(&self, total_pages: usize) {
            self.total.store(total_pages, Ordering::SeqCst);
        }
        fn on_page_start(&self, _: usize, _: usize) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }
        fn on_page_complete(&self, _: usize, _: usize, _: usize) {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }
        fn on_page_error(&self, _: usize, _: usize, _: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
        fn on_conversion_complete(&self, _: usize, success_count: usize) {
            self.succeeded.store(success_count, Ordering::SeqCst);
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let pdf = fixture_pdf(dir.path(), "progress.pdf");
    let pages = [FakePage::Text("x"), FakePage::Unrenderable, FakePage::Blank];
    let counter = Arc::new(Counter::default());
    let (b, _) = builder("eng", &pages);
    let config = b
        .progress_callback(counter.clone() as Arc<dyn ConversionProgressCallback>)
        .build()
        .unwrap();
    convert(&pdf, &config).await.unwrap();

    assert_eq!(counter.total.load(Ordering::SeqCst), 3);
    assert_eq!(counter.started.load(Ordering::SeqCst), 3);
    assert_eq!(counter.completed.load(Ordering::SeqCst), 2);
    assert_eq!(counter.errors.load(Ordering::SeqCst), 1);
    assert_eq!(counter.succeeded.load(Ordering::SeqCst), 2);
}

// ── Fatal errors ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn open_errors_are_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = fixture_pdf(dir.path(), "locked.pdf");
    let config = OcrConfig::builder("eng")
        .rasterizer(FakeRasterizer::failing(Pdf2OcrError::PasswordRequired {
            path: pdf.clone(),
        }))
        .recognizer(FakeRecognizer::new(&[]))
        .build()
        .unwrap();

    let err = convert(&pdf, &config).await.unwrap_err();
    assert!(matches!(err, Pdf2OcrError::PasswordRequired { .. }));
    assert!(err.is_open_error());
}

#[tokio::test]
async fn missing_and_non_pdf_inputs_are_rejected_before_opening() {
    let dir = tempfile::tempdir().unwrap();
    let (b, _) = builder("eng", &[FakePage::Text("x")]);
    let config = b.build().unwrap();

    let err = convert(dir.path().join("absent.pdf"), &config).await.unwrap_err();
    assert!(matches!(err, Pdf2OcrError::FileNotFound { .. }));

    let png = dir.path().join("image.pdf");
    std::fs::write(&png, b"\x89PNG\r\n\x1a\n").unwrap();
    let err = convert(&png, &config).await.unwrap_err();
    assert!(matches!(err, Pdf2OcrError::NotAPdf { .. }));
}

#[tokio::test(start_paused = true)]
async fn cancellation_is_fatal_not_partial() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = fixture_pdf(dir.path(), "cancel.pdf");
    let pages = [FakePage::Text("done"), FakePage::Stall, FakePage::Text("never")];
    let (b, _) = builder("eng", &pages);
    let config = b.concurrency(1).build().unwrap();

    let cancel = tokio::time::sleep(Duration::from_secs(1));
    let err = convert_with_cancel(&pdf, &config, cancel).await.unwrap_err();
    match err {
        Pdf2OcrError::Cancelled { completed, total } => {
            assert_eq!(completed, 1);
            assert_eq!(total, 3);
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn run_timeout_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = fixture_pdf(dir.path(), "slow.pdf");
    let (b, _) = builder("eng", &[FakePage::Stall]);
    let config = b.run_timeout_secs(5).build().unwrap();

    let err = convert(&pdf, &config).await.unwrap_err();
    assert!(
        matches!(err, Pdf2OcrError::RunTimedOut { secs: 5, completed: 0, total: 1 }),
        "{err:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn stalled_page_times_out_alone() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = fixture_pdf(dir.path(), "stall.pdf");
    let pages = [FakePage::Stall, FakePage::Text("ok")];
    let (b, _) = builder("eng", &pages);
    let config = b.page_timeout_secs(10).build().unwrap();

    let doc = convert(&pdf, &config).await.unwrap().document;
    assert_eq!(
        doc.pages[0].error,
        Some(PageError::RecognitionTimeout { page: 1, secs: 10 })
    );
    assert_eq!(doc.pages[1].text, "ok");
}

// ── Entry points ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn explicit_output_path_and_nested_dirs() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = fixture_pdf(dir.path(), "in.pdf");
    let target = dir.path().join("out/nested/result.json");
    let (b, _) = builder("eng", &[FakePage::Text("hello")]);

    let (path, _) = convert_to_file(&pdf, Some(&target), &b.build().unwrap())
        .await
        .unwrap();
    assert_eq!(path, target);
    let doc = DocumentResult::from_json(&std::fs::read(&target).unwrap()).unwrap();
    assert_eq!(doc.pages[0].text, "hello");
    assert!(!dir.path().join("out/nested/result.json.tmp").exists());
}

#[tokio::test]
async fn output_under_a_regular_file_fails_before_any_page() {
    let dir = tempfile::tempdir().unwrap();
    let pdf = fixture_pdf(dir.path(), "in.pdf");
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"plain file").unwrap();
    let target = blocker.join("result.json");
    let (b, recognizer) = builder("eng", &[FakePage::Text("hello")]);

    let err = convert_to_file(&pdf, Some(&target), &b.build().unwrap())
        .await
        .unwrap_err();
    match err {
        Pdf2OcrError::OutputWriteFailed { ref path, .. } => assert_eq!(path, &target),
        other => panic!("expected OutputWriteFailed, got {other:?}"),
    }
    assert!(recognizer.seen().is_empty(), "OCR ran before the output check");
    assert!(!target.exists());
    assert!(!blocker.join("result.json.tmp").exists());
    assert_eq!(std::fs::read(&blocker).unwrap(), b"plain file");
}

#[tokio::test]
async fn failed_rename_leaves_no_temp_file() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("taken");
    std::fs::create_dir(&target).unwrap();
    std::fs::write(target.join("keep.txt"), b"x").unwrap();
    let doc = DocumentResult {
        source: "in.pdf".into(),
        language: "eng".into(),
        pages: vec![PageResult::success(1, "hello")],
    };

    let err = write_output(&target, &doc, true).await.unwrap_err();
    assert!(matches!(err, Pdf2OcrError::OutputWriteFailed { .. }), "{err:?}");
    assert!(!dir.path().join("taken.tmp").exists());
    assert!(target.join("keep.txt").exists());
}

#[tokio::test]
async fn bytes_input_reports_memory_source() {
    let (b, _) = builder("eng", &[FakePage::Text("from memory")]);
    let output = convert_from_bytes(b"%PDF-1.4\n", &b.build().unwrap())
        .await
        .unwrap();
    assert_eq!(output.document.source, "<memory>");
    assert_eq!(output.document.pages[0].text, "from memory");
}
