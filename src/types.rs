//! Data exchanged between the navigator, the extractor and callers.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::config::{DEFAULT_OVERALL_TIMEOUT_MS, DEFAULT_PAGE_LIMIT};

/// One document submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingRequest {
    #[serde(rename = "filePath")]
    source_file_path: PathBuf,
    #[serde(default = "default_page_limit")]
    page_limit: usize,
    #[serde(rename = "overallTimeoutMs", default = "default_overall_timeout_ms")]
    overall_timeout_ms: u64,
}

fn default_page_limit() -> usize {
    DEFAULT_PAGE_LIMIT
}

fn default_overall_timeout_ms() -> u64 {
    DEFAULT_OVERALL_TIMEOUT_MS
}

impl ProcessingRequest {
    pub fn new(source_file_path: impl Into<PathBuf>) -> Self {
        Self {
            source_file_path: source_file_path.into(),
            page_limit: DEFAULT_PAGE_LIMIT,
            overall_timeout_ms: DEFAULT_OVERALL_TIMEOUT_MS,
        }
    }

    pub fn with_page_limit(mut self, page_limit: usize) -> Self {
        self.page_limit = page_limit;
        self
    }

    pub fn with_overall_timeout(mut self, timeout: Duration) -> Self {
        self.overall_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn source_file_path(&self) -> &Path {
        &self.source_file_path
    }

    pub fn page_limit(&self) -> usize {
        self.page_limit
    }

    pub fn overall_timeout(&self) -> Duration {
        Duration::from_millis(self.overall_timeout_ms)
    }
}

/// Image rendered in the output area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub src: String,
    #[serde(default)]
    pub alt: String,
}

/// Text and images of one element that looks like a rendered page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSnapshot {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub images: Vec<ImageRef>,
}

/// Everything a single polling tick learned about the page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollObservation {
    #[serde(default)]
    pub containers: Vec<ContainerSnapshot>,
    /// Qualifying images only: non-empty `src` that is not a `data:` URI.
    #[serde(default)]
    pub images: Vec<ImageRef>,
    #[serde(default)]
    pub text_blocks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSummary {
    /// 1-based page number.
    pub index: usize,
    pub text: Option<String>,
    pub images: Vec<ImageRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawItem {
    pub title: String,
    pub content: String,
}

/// Outcome of the raw-view step for one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawPageOutcome {
    Items { items: Vec<RawItem> },
    Error { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPageEntry {
    pub index: usize,
    #[serde(flatten)]
    pub outcome: RawPageOutcome,
}

impl RawPageEntry {
    pub fn items(index: usize, items: Vec<RawItem>) -> Self {
        Self {
            index,
            outcome: RawPageOutcome::Items { items },
        }
    }

    pub fn error(index: usize, error: impl Into<String>) -> Self {
        Self {
            index,
            outcome: RawPageOutcome::Error {
                error: error.into(),
            },
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, RawPageOutcome::Error { .. })
    }

    pub fn raw_items(&self) -> Option<&[RawItem]> {
        match &self.outcome {
            RawPageOutcome::Items { items } => Some(items),
            RawPageOutcome::Error { .. } => None,
        }
    }
}

/// Final output of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionResult {
    RawText {
        data: Vec<String>,
    },
    Pages {
        data: Vec<PageSummary>,
        raw: Vec<RawPageEntry>,
    },
    Unknown {
        data: JsonValue,
    },
}

impl ExtractionResult {
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractionResult::RawText { .. } => "raw_text",
            ExtractionResult::Pages { .. } => "pages",
            ExtractionResult::Unknown { .. } => "unknown",
        }
    }
}

/// A heading found inside the raw-view dialog and the element right after it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadingSnapshot {
    pub title: String,
    #[serde(default)]
    pub next_tag: Option<String>,
    #[serde(default)]
    pub next_text: Option<String>,
}

/// What the page reports about the open raw-view dialog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogSnapshot {
    #[serde(default)]
    pub headings: Vec<HeadingSnapshot>,
    #[serde(default)]
    pub preformatted: Vec<String>,
}
