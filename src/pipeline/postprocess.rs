//! Post-processing: deterministic cleanup of raw OCR output.
//!
//! Tesseract terminates every page with a form feed, echoes CRLF line endings
//! on some platforms, and pads lines and blocks with whitespace. None of that
//! is content. These rules remove it without touching the recognised
//! characters themselves, so a blank page ends up as exactly `""`.
//!
//! ## Rule Order
//!
//! Line endings are normalised before any line-based rule so `\r` never
//! survives as trailing whitespace; blank-line collapsing runs after
//! per-line trimming so whitespace-only lines count as blank.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all post-processing rules to raw OCR output.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF / CR → LF)
/// 2. Drop form feeds and other page-break control characters
/// 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, …)
/// 4. Trim trailing whitespace per line
/// 5. Collapse runs of blank lines to a single blank line
/// 6. Trim leading and trailing blank lines
pub fn clean_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = drop_control_chars(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    trim_blank_edges(&s)
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Drop page-break control characters ──────────────────────────────

fn drop_control_chars(input: &str) -> String {
    input
        .chars()
        .filter(|&c| c == '\n' || c == '\t' || !c.is_control())
        .collect()
}

// ── Rule 3: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Collapse blank lines ─────────────────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Rule 6: Trim blank edges ─────────────────────────────────────────────────

fn trim_blank_edges(input: &str) -> String {
    input.trim_matches('\n').to_string()
}
