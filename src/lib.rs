//! Browser driver for the olmOCR web demo.
//!
//! Uploads a document through the site's form, waits for the rendered output
//! and returns it as an [`ExtractionResult`]: raw JSON-like text blocks, or
//! per-page summaries together with the items of each page's raw view.

pub mod artifacts;
pub mod browser;
pub mod classifier;
pub mod config;
pub mod dom_scripts;
pub mod error;
pub mod extractor;
pub mod jobs;
pub mod logging;
pub mod navigator;
pub mod page;
pub mod pipeline;
pub mod runtime;
pub mod selectors;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{DriverConfig, DriverConfigOverrides, TimingSettings, Verbosity};
pub use error::{OcrError, OcrErrorKind};
pub use pipeline::{FailureScreenshot, NoHooks, OcrPipeline, RunHooks, run_ocr};
pub use types::{ExtractionResult, PageSummary, ProcessingRequest, RawItem, RawPageEntry};
