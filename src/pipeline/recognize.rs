//! Text recognition: the [`TextRecognizer`] boundary and its tesseract adapter.
//!
//! The adapter pipes a PNG of the page into `tesseract stdin stdout`, so no
//! temporary image files are written. Tesseract reports a missing language
//! pack on stderr, sometimes while still exiting 0 (e.g. `rus+xyz` falls back
//! to `rus`); both cases surface as
//! [`RecognitionError::LanguageNotInstalled`], never as silently degraded
//! text.

use crate::config::{EngineMode, OcrConfig, PageSegMode};
use crate::error::RecognitionError;
use crate::pipeline::encode::encode_png;
use async_trait::async_trait;
use image::DynamicImage;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

static RE_MISSING_LANGUAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Failed loading language '([^']+)'").unwrap());

static RE_DATA_FILE_ERROR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)error opening data file|couldn't load any languages|could not initialize tesseract")
        .unwrap()
});

/// Per-call recognition parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognizeOptions {
    /// Tesseract language code, e.g. `eng` or `rus+eng`.
    pub language: String,
    pub page_seg_mode: PageSegMode,
    pub engine_mode: EngineMode,
    /// Resolution the image was rendered at; tesseract cannot infer it from
    /// a PNG piped on stdin.
    pub dpi: u32,
}

impl RecognizeOptions {
    pub fn from_config(config: &OcrConfig) -> Self {
        Self {
            language: config.language.clone(),
            page_seg_mode: config.page_seg_mode,
            engine_mode: config.engine_mode,
            dpi: config.dpi,
        }
    }
}

/// Turns a page image into text.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Recognise `image`. An empty string is a valid result for a blank page.
    async fn recognize(
        &self,
        image: &DynamicImage,
        options: &RecognizeOptions,
    ) -> Result<String, RecognitionError>;
}

// ── tesseract adapter ────────────────────────────────────────────────────

/// [`TextRecognizer`] wrapping the `tesseract` CLI tool.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    program: PathBuf,
    tessdata_dir: Option<PathBuf>,
    variables: BTreeMap<String, String>,
}

impl Default for TesseractRecognizer {
    fn default() -> Self {
        Self {
            program: PathBuf::from("tesseract"),
            tessdata_dir: None,
            variables: BTreeMap::new(),
        }
    }
}

impl TesseractRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Executable, tessdata directory and `-c` variables from `config`.
    pub fn from_config(config: &OcrConfig) -> Self {
        Self {
            program: config.tesseract_path.clone(),
            tessdata_dir: config.tessdata_dir.clone(),
            variables: config.engine_variables.clone(),
        }
    }

    /// Arguments for one recognition call reading stdin and writing stdout.
    pub fn args(&self, options: &RecognizeOptions) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["stdin".into(), "stdout".into()];
        if let Some(ref dir) = self.tessdata_dir {
            args.push("--tessdata-dir".into());
            args.push(dir.into());
        }
        args.push("-l".into());
        args.push(options.language.clone().into());
        args.push("--psm".into());
        args.push(options.page_seg_mode.as_u8().to_string().into());
        args.push("--oem".into());
        args.push(options.engine_mode.as_u8().to_string().into());
        args.push("--dpi".into());
        args.push(options.dpi.to_string().into());
        for (key, value) in &self.variables {
            args.push("-c".into());
            args.push(format!("{key}={value}").into());
        }
        args
    }

    /// Language packs installed for this tesseract (`--list-langs`).
    pub async fn available_languages(&self) -> Result<Vec<String>, RecognitionError> {
        let mut cmd = Command::new(&self.program);
        if let Some(ref dir) = self.tessdata_dir {
            cmd.arg("--tessdata-dir").arg(dir);
        }
        let output = cmd
            .arg("--list-langs")
            .output()
            .await
            .map_err(|e| self.unavailable(e))?;

        if !output.status.success() {
            return Err(RecognitionError::EngineFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(parse_language_list(&String::from_utf8_lossy(&output.stdout)))
    }

    fn unavailable(&self, e: std::io::Error) -> RecognitionError {
        RecognitionError::EngineUnavailable {
            program: self.program.display().to_string(),
            detail: e.to_string(),
        }
    }
}

#[async_trait]
impl TextRecognizer for TesseractRecognizer {
    async fn recognize(
        &self,
        image: &DynamicImage,
        options: &RecognizeOptions,
    ) -> Result<String, RecognitionError> {
        let png = encode_png(image)
            .map_err(|e| RecognitionError::EngineFailed(format!("image encoding failed: {e}")))?;

        let args = self.args(options);
        debug!(program = %self.program.display(), ?args, "Running tesseract");

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.unavailable(e))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| RecognitionError::EngineFailed("tesseract stdin unavailable".into()))?;

        // Feed stdin while collecting output so neither pipe can fill up and stall.
        let feed = async move {
            let written = stdin.write_all(&png).await;
            drop(stdin);
            written
        };
        let (written, output) = tokio::join!(feed, child.wait_with_output());
        let output = output
            .map_err(|e| RecognitionError::EngineFailed(format!("cannot wait for tesseract: {e}")))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if let Some(err) = classify_stderr(&stderr, &options.language) {
            return Err(err);
        }
        if !output.status.success() {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Err(RecognitionError::EngineFailed(format!(
                "tesseract exited with {code}: {}",
                stderr.trim()
            )));
        }
        if let Err(e) = written {
            return Err(RecognitionError::EngineFailed(format!(
                "cannot write image to tesseract: {e}"
            )));
        }
        if !stderr.trim().is_empty() {
            debug!(output = %stderr.trim(), "tesseract stderr");
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Detect "language data not installed" in tesseract's stderr.
fn classify_stderr(stderr: &str, requested: &str) -> Option<RecognitionError> {
    if let Some(caps) = RE_MISSING_LANGUAGE.captures(stderr) {
        let language = caps[1].to_string();
        warn!("tesseract has no language data for '{}'", language);
        return Some(RecognitionError::LanguageNotInstalled {
            language,
            detail: first_line(stderr),
        });
    }
    if RE_DATA_FILE_ERROR.is_match(stderr) {
        return Some(RecognitionError::LanguageNotInstalled {
            language: requested.to_string(),
            detail: first_line(stderr),
        });
    }
    None
}

fn first_line(s: &str) -> String {
    s.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// Parse `tesseract --list-langs` output; the first line is a header.
fn parse_language_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .skip_while(|l| !l.starts_with("List of available languages"))
        .skip(1)
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}
