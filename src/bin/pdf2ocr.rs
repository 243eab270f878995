//! CLI binary for edgequake-pdf2ocr.
//!
//! A thin shim over the library crate that maps CLI flags to `OcrConfig`,
//! runs the conversion and writes one JSON file.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf2ocr::pipeline::input::resolve_local;
use edgequake_pdf2ocr::{
    check_output_writable, convert_with_cancel, default_output_path, inspect, write_output,
    ConversionProgressCallback, EngineMode, OcrConfig, PageSegMode, ProgressCallback,
    TesseractRecognizer,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per page. Pages may finish out of
/// order when `--concurrency` > 1.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    /// Spinner until `on_conversion_start` reports the page count.
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut t| t.remove(&page_num))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_pages: usize) {
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} pages  \
                 ⏱ {elapsed_precise}  ETA {eta_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        self.bar.set_length(total_pages as u64);
        self.bar.set_prefix("Recognising");
        self.bar.reset_eta();
    }

    fn on_page_start(&self, page_num: usize, _total_pages: usize) {
        if let Ok(mut t) = self.start_times.lock() {
            t.insert(page_num, Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total_pages: usize, text_len: usize) {
        let secs = self.elapsed_secs(page_num);
        let note = if text_len == 0 {
            dim("blank")
        } else {
            dim(&format!("{text_len:>5} bytes"))
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            page_num,
            total_pages,
            note,
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let secs = self.elapsed_secs(page_num);
        let msg: String = match error.char_indices().nth(80) {
            Some((cut, _)) => format!("{}…", &error[..cut]),
            None => error.to_string(),
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total_pages,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_conversion_complete(&self, _total_pages: usize, _success_count: usize) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Russian scan, result written to scan.ocr.json next to the input
  pdf2ocr scan.pdf rus

  # Mixed-language document at higher resolution
  pdf2ocr contract.pdf rus+eng --dpi 300 -o out/contract.json

  # One uniform block of text per page, keep inter-word spacing
  pdf2ocr invoice.pdf eng --psm 6 --config preserve_interword_spaces=1

  # Encrypted PDF
  pdf2ocr secret.pdf deu --password hunter2

  # What language packs does this tesseract have?
  pdf2ocr --list-langs

  # PDF metadata only, no OCR
  pdf2ocr --inspect-only scan.pdf

OUTPUT:
  {"source": "scan.pdf", "language": "rus", "total_pages": 2,
   "pages": {"1": {"status": "success", "text": "..."},
             "2": {"status": "failed", "text": "", "error": {...}}},
   "errors": ["Page 2: ..."]}

  The exit status is 0 whenever the output file is written, even if some
  pages failed. Check the per-page "status" fields.

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH   Path to libpdfium (otherwise ./ then the system library)
  TESSDATA_PREFIX   Read by tesseract itself when --tessdata-dir is not set
  RUST_LOG          Overrides the log filter (e.g. RUST_LOG=edgequake_pdf2ocr=debug)
"#;

/// OCR scanned PDF documents page by page with Tesseract.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2ocr",
    version,
    about = "OCR scanned PDF documents page by page with Tesseract",
    long_about = "Rasterise every page of a PDF with pdfium, recognise it with tesseract in the \
given language, and write the text of every page to one JSON file keyed by page number.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path.
    #[arg(required_unless_present = "list_langs")]
    input: Option<PathBuf>,

    /// Tesseract language code, e.g. eng, rus, rus+eng.
    #[arg(
        env = "PDF2OCR_LANGUAGE",
        required_unless_present_any = ["list_langs", "inspect_only"]
    )]
    language: Option<String>,

    /// Output JSON path. Default: <input dir>/<input stem>.ocr.json.
    #[arg(short, long, env = "PDF2OCR_OUTPUT")]
    output: Option<PathBuf>,

    /// Rendering DPI (72–600).
    #[arg(long, env = "PDF2OCR_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Cap on either rendered image dimension, in pixels.
    #[arg(long, env = "PDF2OCR_MAX_PIXELS", default_value_t = 5000)]
    max_pixels: u32,

    /// Tesseract page segmentation mode (0–13).
    #[arg(long, env = "PDF2OCR_PSM", default_value_t = 3,
          value_parser = clap::value_parser!(u8).range(0..=13))]
    psm: u8,

    /// Tesseract OCR engine mode (0–3).
    #[arg(long, env = "PDF2OCR_OEM", default_value_t = 3,
          value_parser = clap::value_parser!(u8).range(0..=3))]
    oem: u8,

    /// Pages recognised at once. Default: min(8, CPU count).
    #[arg(short, long, env = "PDF2OCR_CONCURRENCY")]
    concurrency: Option<usize>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2OCR_PASSWORD")]
    password: Option<String>,

    /// Directory containing *.traineddata files.
    #[arg(long, env = "PDF2OCR_TESSDATA_DIR")]
    tessdata_dir: Option<PathBuf>,

    /// Tesseract executable.
    #[arg(long = "tesseract", env = "PDF2OCR_TESSERACT", default_value = "tesseract")]
    tesseract: PathBuf,

    /// Extra tesseract variable, repeatable: --config KEY=VALUE.
    #[arg(long = "config", env = "PDF2OCR_CONFIG", action = clap::ArgAction::Append,
          value_parser = parse_key_val)]
    config: Vec<(String, String)>,

    /// Per-page timeout in seconds, for rendering and for recognition.
    #[arg(long, env = "PDF2OCR_PAGE_TIMEOUT", default_value_t = 120)]
    page_timeout: u64,

    /// Whole-run timeout in seconds.
    #[arg(long, env = "PDF2OCR_TIMEOUT")]
    timeout: Option<u64>,

    /// Write single-line JSON instead of pretty-printed.
    #[arg(long, env = "PDF2OCR_COMPACT")]
    compact: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2OCR_NO_PROGRESS")]
    no_progress: bool,

    /// Print PDF metadata only, no OCR.
    #[arg(long, env = "PDF2OCR_INSPECT_ONLY")]
    inspect_only: bool,

    /// List the language packs installed for tesseract and exit.
    #[arg(long, env = "PDF2OCR_LIST_LANGS")]
    list_langs: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2OCR_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2OCR_QUIET")]
    quiet: bool,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (k, v) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    Ok((k.trim().to_string(), v.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.inspect_only && !cli.list_langs;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── List languages ───────────────────────────────────────────────────
    if cli.list_langs {
        let recognizer = tesseract_for(&cli);
        let langs = recognizer
            .available_languages()
            .await
            .context("Failed to query tesseract for installed languages")?;
        for lang in langs {
            println!("{lang}");
        }
        return Ok(());
    }

    let input = cli
        .input
        .clone()
        .context("An input PDF is required")?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let meta = inspect(&input, cli.password.as_deref())
            .await
            .context("Failed to inspect PDF")?;

        println!("File:         {}", input.display());
        let fields = [
            ("Title", &meta.title),
            ("Author", &meta.author),
            ("Subject", &meta.subject),
            ("Creator", &meta.creator),
            ("Producer", &meta.producer),
            ("Created", &meta.creation_date),
            ("Modified", &meta.modification_date),
        ];
        for (label, value) in fields {
            if let Some(v) = value {
                println!("{:<13} {}", format!("{label}:"), v);
            }
        }
        println!("Pages:        {}", meta.page_count);
        println!("PDF Version:  {}", meta.pdf_version);
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    if !cli.quiet {
        check_languages(&cli, &config.language).await;
    }

    // ── Run conversion ───────────────────────────────────────────────────
    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&input));

    // Bad input or an unwritable destination should fail before any OCR.
    resolve_local(&input).with_context(|| format!("OCR of '{}' failed", input.display()))?;
    check_output_writable(&output_path)
        .await
        .context("Output destination is not writable")?;

    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    let output = convert_with_cancel(&input, &config, ctrl_c)
        .await
        .with_context(|| format!("OCR of '{}' failed", input.display()))?;

    write_output(&output_path, &output.document, !cli.compact)
        .await
        .context("Failed to write OCR result")?;

    if !cli.quiet {
        let stats = &output.stats;
        eprintln!(
            "{}  {}/{} pages  {}ms  →  {}",
            if stats.failed_pages == 0 {
                green("✔")
            } else {
                yellow("⚠")
            },
            stats.succeeded_pages,
            stats.total_pages,
            stats.total_duration_ms,
            bold(&output_path.display().to_string()),
        );
        if stats.failed_pages > 0 {
            eprintln!("   {} pages failed", red(&stats.failed_pages.to_string()));
        }
    }

    Ok(())
}

fn tesseract_for(cli: &Cli) -> TesseractRecognizer {
    let mut builder = OcrConfig::builder("eng").tesseract_path(&cli.tesseract);
    if let Some(ref dir) = cli.tessdata_dir {
        builder = builder.tessdata_dir(dir);
    }
    // Only the executable and tessdata directory matter for listing.
    TesseractRecognizer::from_config(&builder.build().unwrap_or_default())
}

/// Warn when tesseract is missing or lacks a requested language pack.
/// Pages would fail individually anyway; this just says why up front.
async fn check_languages(cli: &Cli, language: &str) {
    match tesseract_for(cli).available_languages().await {
        Ok(installed) => {
            for lang in language.split('+') {
                if !installed.iter().any(|l| l == lang) {
                    eprintln!(
                        "{} language pack '{}' is not installed; available: {}",
                        yellow("⚠"),
                        lang,
                        dim(&installed.join(", "))
                    );
                }
            }
        }
        Err(e) => eprintln!("{} {}", yellow("⚠"), e),
    }
}

/// Map CLI args to `OcrConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<OcrConfig> {
    let language = cli
        .language
        .clone()
        .context("A tesseract language code is required")?;

    let mut builder = OcrConfig::builder(language)
        .dpi(cli.dpi)
        .max_rendered_pixels(cli.max_pixels)
        .page_seg_mode(PageSegMode::try_from(cli.psm)?)
        .engine_mode(EngineMode::try_from(cli.oem)?)
        .tesseract_path(&cli.tesseract)
        .page_timeout_secs(cli.page_timeout);

    if let Some(n) = cli.concurrency {
        builder = builder.concurrency(n);
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd);
    }
    if let Some(ref dir) = cli.tessdata_dir {
        builder = builder.tessdata_dir(dir);
    }
    for (key, value) in &cli.config {
        builder = builder.engine_variable(key, value);
    }
    if let Some(secs) = cli.timeout {
        builder = builder.run_timeout_secs(secs);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
