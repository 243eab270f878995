//! Output types: per-page results, the document result and its JSON form.
//!
//! A [`DocumentResult`] holds exactly one [`PageResult`] per source page,
//! numbered `1..=N` in document order. Its JSON form keys the pages by
//! their 1-based number:
//!
//! ```json
//! {
//!   "source": "scan.pdf",
//!   "language": "rus",
//!   "total_pages": 2,
//!   "pages": {
//!     "1": { "status": "success", "text": "Привет" },
//!     "2": { "status": "failed", "text": "",
//!            "error": { "kind": "rasterization_failed", "page": 2, "detail": "…" } }
//!   },
//!   "errors": ["Page 2: rasterisation failed: …"]
//! }
//! ```
//!
//! `total_pages` and `errors` are derived from `pages` when serialising and
//! checked against them when parsing back.
//!
//! Timings and PDF metadata live next to the result in [`ConversionOutput`]
//! rather than inside it, so two runs over the same document serialise to the
//! same bytes.

use crate::error::{PageError, Pdf2OcrError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::error;

/// Replaces the source extension in the default output path:
/// `scan.pdf` is written to `scan.ocr.json`.
pub const OUTPUT_SUFFIX: &str = ".ocr.json";

/// Outcome of one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageStatus {
    Success,
    Failed,
}

/// Result for a single page.
///
/// `text` may be empty on success (a blank page); `error` is present exactly
/// when `status` is [`PageStatus::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-based page number. Serialised as the key of the `pages` object.
    #[serde(skip)]
    pub page_num: usize,

    pub status: PageStatus,

    /// Cleaned OCR text. Empty for failed and blank pages.
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<PageError>,
}

impl PageResult {
    pub fn success(page_num: usize, text: impl Into<String>) -> Self {
        Self {
            page_num,
            status: PageStatus::Success,
            text: text.into(),
            error: None,
        }
    }

    pub fn failed(error: PageError) -> Self {
        Self {
            page_num: error.page(),
            status: PageStatus::Failed,
            text: String::new(),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == PageStatus::Success
    }
}

/// OCR result for a whole document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "DocumentJson")]
pub struct DocumentResult {
    /// Source path as given by the caller.
    pub source: String,

    /// Language the pages were recognised with.
    pub language: String,

    /// One entry per page, in page order.
    pub pages: Vec<PageResult>,
}

/// On-disk shape of a [`DocumentResult`], with the summary fields.
#[derive(Deserialize)]
struct DocumentJson {
    source: String,
    language: String,
    total_pages: usize,
    #[serde(deserialize_with = "page_map::deserialize")]
    pages: Vec<PageResult>,
    errors: Vec<String>,
}

#[derive(Serialize)]
struct DocumentJsonRef<'a> {
    source: &'a str,
    language: &'a str,
    total_pages: usize,
    #[serde(serialize_with = "page_map::serialize")]
    pages: &'a [PageResult],
    errors: Vec<String>,
}

impl Serialize for DocumentResult {
    fn serialize<Ser: serde::Serializer>(&self, ser: Ser) -> Result<Ser::Ok, Ser::Error> {
        DocumentJsonRef {
            source: self.source.as_str(),
            language: self.language.as_str(),
            total_pages: self.pages.len(),
            pages: self.pages.as_slice(),
            errors: self.error_summary(),
        }
        .serialize(ser)
    }
}

impl TryFrom<DocumentJson> for DocumentResult {
    type Error = String;

    fn try_from(raw: DocumentJson) -> Result<Self, Self::Error> {
        let doc = DocumentResult {
            source: raw.source,
            language: raw.language,
            pages: raw.pages,
        };
        if raw.total_pages != doc.pages.len() {
            return Err(format!(
                "total_pages is {} but {} pages are present",
                raw.total_pages,
                doc.pages.len()
            ));
        }
        if raw.errors != doc.error_summary() {
            return Err("errors do not match the failed pages".to_string());
        }
        Ok(doc)
    }
}

impl DocumentResult {
    /// Pretty-printed JSON bytes. See [`serialize`].
    pub fn to_json(&self) -> Result<Vec<u8>, Pdf2OcrError> {
        serialize(self, true)
    }

    /// Parse a result previously produced by [`serialize`].
    ///
    /// Rejects page keys that are not exactly `"1"` to `"N"`, errors filed
    /// under another page's key, and summary fields that disagree with the
    /// pages.
    pub fn from_json(bytes: &[u8]) -> Result<Self, Pdf2OcrError> {
        serde_json::from_slice(bytes)
            .map_err(|e| Pdf2OcrError::Serialization(format!("invalid OCR result: {e}")))
    }

    pub fn succeeded_pages(&self) -> usize {
        self.pages.iter().filter(|p| p.is_success()).count()
    }

    pub fn failed_pages(&self) -> usize {
        self.pages.len() - self.succeeded_pages()
    }

    /// One human-readable line per failed page, in page order.
    pub fn error_summary(&self) -> Vec<String> {
        self.pages
            .iter()
            .filter_map(|p| p.error.as_ref().map(ToString::to_string))
            .collect()
    }
}

/// Serialise `result` to JSON bytes. Deterministic: the same result always
/// produces the same bytes.
///
/// Non-ASCII text is written as UTF-8, not escaped.
pub fn serialize(result: &DocumentResult, pretty: bool) -> Result<Vec<u8>, Pdf2OcrError> {
    let bytes = if pretty {
        serde_json::to_vec_pretty(result)
    } else {
        serde_json::to_vec(result)
    };
    bytes.map_err(|e| {
        error!("BUG: OCR result for '{}' is not serialisable: {}", result.source, e);
        Pdf2OcrError::Serialization(e.to_string())
    })
}

/// `<dir>/<stem>.ocr.json` next to `source`.
///
/// The last extension is dropped before [`OUTPUT_SUFFIX`] is added, so
/// `report.v2.pdf` becomes `report.v2.ocr.json`.
pub fn default_output_path(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string());
    source.with_file_name(format!("{stem}{OUTPUT_SUFFIX}"))
}

/// `pages` as a JSON object keyed by 1-based page number.
mod page_map {
    use super::PageResult;
    use serde::de::{self, MapAccess, Visitor};
    use serde::ser::{Error as _, SerializeMap};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(pages: &[PageResult], ser: S) -> Result<S::Ok, S::Error> {
        let mut map = ser.serialize_map(Some(pages.len()))?;
        for (i, page) in pages.iter().enumerate() {
            if page.page_num != i + 1 {
                return Err(S::Error::custom(format!(
                    "page {} stored at position {}",
                    page.page_num,
                    i + 1
                )));
            }
            map.serialize_entry(&page.page_num.to_string(), page)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<PageResult>, D::Error> {
        de.deserialize_map(PageMapVisitor)
    }

    struct PageMapVisitor;

    impl<'de> Visitor<'de> for PageMapVisitor {
        type Value = Vec<PageResult>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an object keyed by page numbers \"1\"..\"N\" in order")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut pages = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((key, mut page)) = access.next_entry::<String, PageResult>()? {
                let expected = pages.len() + 1;
                if key != expected.to_string() {
                    return Err(de::Error::custom(format!(
                        "expected page key \"{expected}\", found \"{key}\""
                    )));
                }
                if page.is_success() == page.error.is_some() {
                    return Err(de::Error::custom(format!(
                        "page {expected}: status and error disagree"
                    )));
                }
                let error_page = page.error.as_ref().map(|e| e.page());
                if let Some(found) = error_page.filter(|&n| n != expected) {
                    return Err(de::Error::custom(format!(
                        "page {expected}: error refers to page {found}"
                    )));
                }
                page.page_num = expected;
                pages.push(page);
            }
            Ok(pages)
        }
    }
}

/// PDF document metadata, read when the document is opened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
}

/// Run statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    pub total_pages: usize,
    pub succeeded_pages: usize,
    pub failed_pages: usize,
    /// Wall-clock time of the whole run.
    pub total_duration_ms: u64,
    /// Sum of per-page rasterisation times.
    pub render_duration_ms: u64,
    /// Sum of per-page recognition times.
    pub recognition_duration_ms: u64,
}

/// Everything a conversion produces.
#[derive(Debug, Clone)]
pub struct ConversionOutput {
    pub document: DocumentResult,
    pub metadata: DocumentMetadata,
    pub stats: ConversionStats,
}
