//! Error types surfaced by an OCR run.

use thiserror::Error;

use crate::browser::{BrowserError, BrowserRuntimeError};
use crate::page::PageError;

/// Fatal failure of a run. No partial result accompanies it.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("required control not found: {control}")]
    ControlNotFound { control: String },
    #[error("no recognisable result within {waited_ms} ms")]
    ExtractionTimeout { waited_ms: u64 },
    #[error(transparent)]
    Browser(#[from] BrowserRuntimeError),
    #[error(transparent)]
    LaunchPlan(#[from] BrowserError),
    #[error(transparent)]
    Page(#[from] PageError),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Coarse classification of [`OcrError`] for callers that only branch on the
/// failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrErrorKind {
    ControlNotFound,
    ExtractionTimeout,
    Browser,
    Page,
    InvalidRequest,
}

impl OcrError {
    pub fn control_not_found(control: impl Into<String>) -> Self {
        OcrError::ControlNotFound {
            control: control.into(),
        }
    }

    pub fn kind(&self) -> OcrErrorKind {
        match self {
            OcrError::ControlNotFound { .. } => OcrErrorKind::ControlNotFound,
            OcrError::ExtractionTimeout { .. } => OcrErrorKind::ExtractionTimeout,
            OcrError::Browser(_) | OcrError::LaunchPlan(_) => OcrErrorKind::Browser,
            OcrError::Page(_) => OcrErrorKind::Page,
            OcrError::InvalidRequest(_) => OcrErrorKind::InvalidRequest,
        }
    }
}

/// Failure of the raw-view step for a single page. Recorded in the result,
/// never propagated.
#[derive(Debug, Error)]
pub enum RawDetailError {
    #[error("View Raw control not found")]
    ControlNotFound,
    #[error("dialog did not appear")]
    DialogNotFound,
    #[error(transparent)]
    Page(#[from] PageError),
}
