//! Configuration types for PDF OCR runs.
//!
//! All run behaviour is controlled through [`OcrConfig`], built via its
//! [`OcrConfigBuilder`]. The language is the only required knob; everything
//! else has a documented default.

use crate::error::Pdf2OcrError;
use crate::pipeline::recognize::TextRecognizer;
use crate::pipeline::render::PageRasterizer;
use crate::progress::ProgressCallback;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Tesseract language codes: `eng`, `chi_sim`, or combinations like `rus+eng`.
static RE_LANGUAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+(\+[A-Za-z0-9_]+)*$").unwrap());

/// Lowest accepted rendering DPI.
pub const MIN_DPI: u32 = 72;
/// Highest accepted rendering DPI.
pub const MAX_DPI: u32 = 600;

/// Configuration for one OCR run over a PDF document.
///
/// Built via [`OcrConfig::builder()`] or using [`OcrConfig::default()`]
/// (English).
///
/// # Example
/// ```rust
/// use edgequake_pdf2ocr::{OcrConfig, PageSegMode};
///
/// let config = OcrConfig::builder("rus+eng")
///     .dpi(300)
///     .page_seg_mode(PageSegMode::SingleBlock)
///     .concurrency(4)
///     .build()
///     .unwrap();
/// assert_eq!(config.language, "rus+eng");
/// ```
#[derive(Clone)]
pub struct OcrConfig {
    /// Tesseract language code passed as `-l`. Required; `Default` uses `eng`.
    pub language: String,

    /// Rendering DPI used when rasterising each page. Range: 72–600. Default: 200.
    ///
    /// Tesseract is tuned for glyphs roughly 20–30 px tall; 200 DPI gets
    /// ordinary 10–12 pt body text there. Raise to 300 for small print.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 5000.
    ///
    /// Caps either dimension of oversized pages (posters, drawings) so a
    /// single page cannot exhaust memory.
    pub max_rendered_pixels: u32,

    /// Tesseract page segmentation mode (`--psm`). Default: [`PageSegMode::Auto`].
    pub page_seg_mode: PageSegMode,

    /// Tesseract engine mode (`--oem`). Default: [`EngineMode::Default`].
    pub engine_mode: EngineMode,

    /// Number of pages processed at once. Default: `min(8, CPU count)`.
    ///
    /// Rendering is always serialised on one pdfium worker; this bounds the
    /// number of concurrent tesseract processes. 1 means strictly sequential.
    pub concurrency: usize,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Directory holding `*.traineddata` files (`--tessdata-dir`).
    pub tessdata_dir: Option<PathBuf>,

    /// Tesseract executable name or path. Default: `tesseract`.
    pub tesseract_path: PathBuf,

    /// Extra Tesseract variables passed as `-c key=value`.
    pub engine_variables: BTreeMap<String, String>,

    /// Per-page timeout in seconds, applied separately to rendering and to
    /// recognition. A timed-out render fails the page but cannot interrupt
    /// pdfium itself, so later pages wait for it to finish. Default: 120.
    pub page_timeout_secs: u64,

    /// Whole-run timeout in seconds. Default: none.
    pub run_timeout_secs: Option<u64>,

    /// Pre-constructed rasterizer. If None, uses pdfium.
    pub rasterizer: Option<Arc<dyn PageRasterizer>>,

    /// Pre-constructed recognizer. If None, uses tesseract with the fields above.
    pub recognizer: Option<Arc<dyn TextRecognizer>>,

    /// Per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            dpi: 200,
            max_rendered_pixels: 5000,
            page_seg_mode: PageSegMode::default(),
            engine_mode: EngineMode::default(),
            concurrency: default_concurrency(),
            password: None,
            tessdata_dir: None,
            tesseract_path: PathBuf::from("tesseract"),
            engine_variables: BTreeMap::new(),
            page_timeout_secs: 120,
            run_timeout_secs: None,
            rasterizer: None,
            recognizer: None,
            progress_callback: None,
        }
    }
}

/// `min(8, CPU count)`, never below 1.
pub fn default_concurrency() -> usize {
    num_cpus::get().clamp(1, 8)
}

impl fmt::Debug for OcrConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcrConfig")
            .field("language", &self.language)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("page_seg_mode", &self.page_seg_mode)
            .field("engine_mode", &self.engine_mode)
            .field("concurrency", &self.concurrency)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("tessdata_dir", &self.tessdata_dir)
            .field("tesseract_path", &self.tesseract_path)
            .field("engine_variables", &self.engine_variables)
            .field("page_timeout_secs", &self.page_timeout_secs)
            .field("run_timeout_secs", &self.run_timeout_secs)
            .field("rasterizer", &self.rasterizer.as_ref().map(|_| "<dyn PageRasterizer>"))
            .field("recognizer", &self.recognizer.as_ref().map(|_| "<dyn TextRecognizer>"))
            .finish()
    }
}

impl OcrConfig {
    /// Create a new builder for `OcrConfig` recognising `language`.
    pub fn builder(language: impl Into<String>) -> OcrConfigBuilder {
        OcrConfigBuilder {
            config: Self {
                language: language.into(),
                ..Self::default()
            },
        }
    }
}

/// Builder for [`OcrConfig`].
#[derive(Debug)]
pub struct OcrConfigBuilder {
    config: OcrConfig,
}

impl OcrConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(MIN_DPI, MAX_DPI);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn page_seg_mode(mut self, mode: PageSegMode) -> Self {
        self.config.page_seg_mode = mode;
        self
    }

    pub fn engine_mode(mut self, mode: EngineMode) -> Self {
        self.config.engine_mode = mode;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn tessdata_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.tessdata_dir = Some(dir.into());
        self
    }

    pub fn tesseract_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tesseract_path = path.into();
        self
    }

    pub fn engine_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config
            .engine_variables
            .insert(key.into(), value.into());
        self
    }

    pub fn page_timeout_secs(mut self, secs: u64) -> Self {
        self.config.page_timeout_secs = secs;
        self
    }

    pub fn run_timeout_secs(mut self, secs: u64) -> Self {
        self.config.run_timeout_secs = Some(secs);
        self
    }

    pub fn rasterizer(mut self, rasterizer: Arc<dyn PageRasterizer>) -> Self {
        self.config.rasterizer = Some(rasterizer);
        self
    }

    pub fn recognizer(mut self, recognizer: Arc<dyn TextRecognizer>) -> Self {
        self.config.recognizer = Some(recognizer);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<OcrConfig, Pdf2OcrError> {
        let c = &self.config;
        if !RE_LANGUAGE.is_match(&c.language) {
            return Err(Pdf2OcrError::InvalidConfig(format!(
                "Language must be a tesseract code like 'eng' or 'rus+eng', got '{}'",
                c.language
            )));
        }
        if c.dpi < MIN_DPI || c.dpi > MAX_DPI {
            return Err(Pdf2OcrError::InvalidConfig(format!(
                "DPI must be {MIN_DPI}–{MAX_DPI}, got {}",
                c.dpi
            )));
        }
        if c.concurrency == 0 {
            return Err(Pdf2OcrError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.page_timeout_secs == 0 || c.run_timeout_secs == Some(0) {
            return Err(Pdf2OcrError::InvalidConfig(
                "Timeouts must be ≥ 1 second".into(),
            ));
        }
        if let Some(key) = c
            .engine_variables
            .keys()
            .find(|k| k.is_empty() || k.contains(char::is_whitespace) || k.contains('='))
        {
            return Err(Pdf2OcrError::InvalidConfig(format!(
                "Invalid tesseract variable name '{key}'"
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Tesseract page segmentation mode (`--psm`).
///
/// Controls how the page image is divided into text regions before
/// recognition. The numeric values are tesseract's own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageSegMode {
    /// 0: orientation and script detection only (produces no text).
    OsdOnly,
    /// 1: automatic segmentation with OSD.
    AutoOsd,
    /// 2: automatic segmentation, no OSD, no OCR.
    AutoOnly,
    /// 3: fully automatic segmentation, no OSD. (default)
    #[default]
    Auto,
    /// 4: a single column of text of variable sizes.
    SingleColumn,
    /// 5: a single uniform block of vertically aligned text.
    SingleBlockVertText,
    /// 6: a single uniform block of text.
    SingleBlock,
    /// 7: a single text line.
    SingleLine,
    /// 8: a single word.
    SingleWord,
    /// 9: a single word in a circle.
    CircleWord,
    /// 10: a single character.
    SingleChar,
    /// 11: sparse text, as much as possible in no particular order.
    SparseText,
    /// 12: sparse text with OSD.
    SparseTextOsd,
    /// 13: raw line, bypassing tesseract-specific hacks.
    RawLine,
}

impl PageSegMode {
    const ALL: [PageSegMode; 14] = [
        PageSegMode::OsdOnly,
        PageSegMode::AutoOsd,
        PageSegMode::AutoOnly,
        PageSegMode::Auto,
        PageSegMode::SingleColumn,
        PageSegMode::SingleBlockVertText,
        PageSegMode::SingleBlock,
        PageSegMode::SingleLine,
        PageSegMode::SingleWord,
        PageSegMode::CircleWord,
        PageSegMode::SingleChar,
        PageSegMode::SparseText,
        PageSegMode::SparseTextOsd,
        PageSegMode::RawLine,
    ];

    /// Numeric value passed on the tesseract command line.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for PageSegMode {
    type Error = Pdf2OcrError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(v as usize)
            .copied()
            .ok_or_else(|| Pdf2OcrError::InvalidConfig(format!("--psm must be 0–13, got {v}")))
    }
}

/// Tesseract OCR engine mode (`--oem`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EngineMode {
    /// 0: legacy engine only.
    LegacyOnly,
    /// 1: LSTM neural net only.
    LstmOnly,
    /// 2: legacy + LSTM.
    LegacyLstm,
    /// 3: whatever is available. (default)
    #[default]
    Default,
}

impl EngineMode {
    /// Numeric value passed on the tesseract command line.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for EngineMode {
    type Error = Pdf2OcrError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(EngineMode::LegacyOnly),
            1 => Ok(EngineMode::LstmOnly),
            2 => Ok(EngineMode::LegacyLstm),
            3 => Ok(EngineMode::Default),
            _ => Err(Pdf2OcrError::InvalidConfig(format!(
                "--oem must be 0–3, got {v}"
            ))),
        }
    }
}
