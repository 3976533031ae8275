//! Result detection and extraction.
//!
//! [`ResultExtractor`] polls the page until the classifier recognises an
//! output shape or the overall deadline passes. For rendered pages it then
//! walks every page's raw-view dialog in order. A failure on one page becomes
//! an error entry for that page and the walk carries on with the next one.

use std::time::Duration;

use serde_json::json;
use tokio::time::{Instant, sleep};

use crate::classifier::{Classification, Classifier};
use crate::config::TimingSettings;
use crate::error::{OcrError, RawDetailError};
use crate::logging::DriverLogger;
use crate::page::{BusySignal, Control, ControlScope, PageError, SitePage, wait_until};
use crate::types::{DialogSnapshot, ExtractionResult, PollObservation, RawItem, RawPageEntry};

/// Title used for dialog blocks that have no usable heading.
pub const FALLBACK_RAW_TITLE: &str = "pre";

/// How many leading ignored blocks are logged per tick.
const IGNORED_PREVIEW: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorState {
    Polling,
    ClassifiedText,
    ClassifiedPages,
    ExtractingRaw,
    Done,
    TimedOut,
}

/// Number of pages whose raw view is attempted.
pub fn raw_detail_count(page_limit: usize, container_count: usize, page_count: usize) -> usize {
    page_limit.min(container_count.max(page_count))
}

/// Position in the document-wide list of raw controls to use for page
/// `index` when its container has no control of its own.
pub fn fallback_control_position(index: usize, available: usize) -> Option<usize> {
    if index < available {
        Some(index)
    } else if available > 0 {
        Some(0)
    } else {
        None
    }
}

/// Pair each heading with the preformatted block right after it. Without a
/// single pair, every preformatted block is returned under a generic title.
pub fn pair_dialog_items(snapshot: &DialogSnapshot) -> Vec<RawItem> {
    let items: Vec<RawItem> = snapshot
        .headings
        .iter()
        .filter(|heading| {
            heading
                .next_tag
                .as_deref()
                .is_some_and(|tag| tag.eq_ignore_ascii_case("pre"))
        })
        .map(|heading| RawItem {
            title: clean_title(&heading.title),
            content: heading.next_text.clone().unwrap_or_default(),
        })
        .collect();

    if !items.is_empty() {
        return items;
    }

    snapshot
        .preformatted
        .iter()
        .map(|content| RawItem {
            title: FALLBACK_RAW_TITLE.to_string(),
            content: content.clone(),
        })
        .collect()
}

fn clean_title(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed
        .strip_suffix(':')
        .unwrap_or(trimmed)
        .trim_end()
        .to_string()
}

pub struct ResultExtractor<'a, P: SitePage + ?Sized> {
    page: &'a P,
    classifier: &'a dyn Classifier,
    timings: &'a TimingSettings,
    logger: &'a DriverLogger,
    state: ExtractorState,
}

impl<'a, P: SitePage + ?Sized> ResultExtractor<'a, P> {
    pub fn new(
        page: &'a P,
        classifier: &'a dyn Classifier,
        timings: &'a TimingSettings,
        logger: &'a DriverLogger,
    ) -> Self {
        Self {
            page,
            classifier,
            timings,
            logger,
            state: ExtractorState::Polling,
        }
    }

    pub fn state(&self) -> ExtractorState {
        self.state
    }

    fn transition(&mut self, next: ExtractorState) {
        self.logger.debug(
            format!("extractor {:?} -> {:?}", self.state, next),
            Some("extract"),
            None,
        );
        self.state = next;
    }

    /// Wait for results and extract them.
    pub async fn run(
        &mut self,
        page_limit: usize,
        overall_timeout: Duration,
    ) -> Result<ExtractionResult, OcrError> {
        let classification = self.poll_for_results(page_limit, overall_timeout).await?;

        match classification {
            Classification::RawText(data) => {
                self.transition(ExtractorState::ClassifiedText);
                self.logger.info(
                    format!("found {} raw text block(s)", data.len()),
                    Some("extract"),
                    None,
                );
                self.transition(ExtractorState::Done);
                Ok(ExtractionResult::RawText { data })
            }
            Classification::Pages(pages) => {
                self.transition(ExtractorState::ClassifiedPages);
                self.logger.info(
                    format!("found {} rendered page(s)", pages.len()),
                    Some("extract"),
                    None,
                );
                self.transition(ExtractorState::ExtractingRaw);
                let raw = self.extract_raw_details(page_limit, pages.len()).await?;
                self.transition(ExtractorState::Done);
                Ok(ExtractionResult::Pages { data: pages, raw })
            }
            Classification::Unrecognized(data) => {
                self.transition(ExtractorState::Done);
                Ok(ExtractionResult::Unknown { data })
            }
        }
    }

    /// Poll until the classifier recognises something or `overall_timeout`
    /// elapses. A check error only costs the current tick.
    pub async fn poll_for_results(
        &mut self,
        page_limit: usize,
        overall_timeout: Duration,
    ) -> Result<Classification, OcrError> {
        if self.state != ExtractorState::Polling {
            self.transition(ExtractorState::Polling);
        }
        let started = Instant::now();
        let deadline = started + overall_timeout;

        loop {
            let now = Instant::now();
            if now >= deadline {
                self.transition(ExtractorState::TimedOut);
                let waited_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                return Err(OcrError::ExtractionTimeout { waited_ms });
            }

            match self.page.observe().await {
                Ok(observation) => {
                    if let Some(classification) =
                        self.classifier.classify(&observation, page_limit)
                    {
                        if !matches!(classification, Classification::RawText(_)) {
                            self.log_ignored_blocks(&observation);
                        }
                        return Ok(classification);
                    }
                    self.log_ignored_blocks(&observation);
                }
                Err(err) => {
                    self.logger.debug(
                        format!("poll check failed: {err}"),
                        Some("extract"),
                        None,
                    );
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            sleep(self.timings.poll_interval().min(remaining)).await;
        }
    }

    fn log_ignored_blocks(&self, observation: &PollObservation) {
        if observation.text_blocks.is_empty() {
            return;
        }
        let preview: Vec<&str> = observation
            .text_blocks
            .iter()
            .take(IGNORED_PREVIEW)
            .map(|block| block.trim())
            .collect();
        self.logger.debug(
            "ignored header-like text",
            Some("extract"),
            Some(json!({ "blocks": preview })),
        );
    }

    /// Open, read and close the raw view of each detected page.
    pub async fn extract_raw_details(
        &mut self,
        page_limit: usize,
        page_count: usize,
    ) -> Result<Vec<RawPageEntry>, OcrError> {
        let containers = self.page.container_count().await?;
        let count = raw_detail_count(page_limit, containers, page_count);
        let mut entries = Vec::with_capacity(count);

        for i in 0..count {
            let container = (i < containers).then_some(i);
            let entry = match self.extract_page(i, container).await {
                Ok(items) => {
                    self.logger.debug(
                        format!("page {} raw view: {} item(s)", i + 1, items.len()),
                        Some("raw"),
                        None,
                    );
                    RawPageEntry::items(i + 1, items)
                }
                Err(err) => {
                    self.logger.error(
                        format!("page {} raw view failed: {err}", i + 1),
                        Some("raw"),
                        None,
                    );
                    RawPageEntry::error(i + 1, err.to_string())
                }
            };
            entries.push(entry);
        }

        Ok(entries)
    }

    async fn extract_page(
        &self,
        index: usize,
        container: Option<usize>,
    ) -> Result<Vec<RawItem>, RawDetailError> {
        match container {
            Some(container) => self.settle_container(container).await,
            None => sleep(self.timings.unscoped_settle()).await,
        }

        let (scope, position) = self.locate_raw_control(index, container).await?;
        if !self
            .page
            .click_control(Control::RawDetail, scope, position)
            .await?
        {
            return Err(RawDetailError::ControlNotFound);
        }

        let page = self.page;
        let opened = wait_until(
            self.timings.dialog_timeout(),
            self.timings.check_interval(),
            move || page.dialog_open(),
        )
        .await?;
        if !opened {
            return Err(RawDetailError::DialogNotFound);
        }

        let snapshot = self.page.dialog_snapshot().await;
        self.close_dialog().await;
        Ok(pair_dialog_items(&snapshot?))
    }

    /// Wait for the processing text to go away, then for loading indicators.
    /// Neither wait failing stops the page from being attempted.
    async fn settle_container(&self, container: usize) {
        let page = self.page;
        let cleared = wait_until(
            self.timings.per_page_timeout(),
            self.timings.check_interval(),
            move || async move {
                let busy = page
                    .container_busy(container, BusySignal::ProcessingText)
                    .await?;
                Ok::<bool, PageError>(!busy)
            },
        )
        .await;
        if matches!(cleared, Ok(true)) {
            return;
        }

        let settled = wait_until(
            self.timings.indicator_timeout(),
            self.timings.check_interval(),
            move || async move {
                let busy = page
                    .container_busy(container, BusySignal::LoadingIndicator)
                    .await?;
                Ok::<bool, PageError>(!busy)
            },
        )
        .await;
        if !matches!(settled, Ok(true)) {
            self.logger.debug(
                format!("container {container} still looks busy, continuing"),
                Some("raw"),
                None,
            );
        }
    }

    async fn locate_raw_control(
        &self,
        index: usize,
        container: Option<usize>,
    ) -> Result<(ControlScope, usize), RawDetailError> {
        let page = self.page;
        if let Some(container) = container {
            let scope = ControlScope::Container(container);
            let visible = wait_until(
                self.timings.per_page_timeout(),
                self.timings.check_interval(),
                move || async move {
                    let visible = page.control_count(Control::RawDetail, scope, true).await?;
                    Ok::<bool, PageError>(visible > 0)
                },
            )
            .await;
            if matches!(visible, Ok(true)) {
                return Ok((scope, 0));
            }
        }

        let available = page
            .control_count(Control::RawDetail, ControlScope::Document, false)
            .await?;
        fallback_control_position(index, available)
            .map(|position| (ControlScope::Document, position))
            .ok_or(RawDetailError::ControlNotFound)
    }

    /// Close through the dialog's own button when it has one, otherwise send
    /// Escape. Always followed by the teardown pause.
    async fn close_dialog(&self) {
        let clicked = self
            .page
            .click_control(Control::DialogClose, ControlScope::Dialog, 0)
            .await;
        if !matches!(clicked, Ok(true)) {
            if let Err(err) = clicked {
                self.logger
                    .debug(format!("close control failed: {err}"), Some("raw"), None);
            }
            if let Err(err) = self.page.press_escape().await {
                self.logger
                    .debug(format!("escape failed: {err}"), Some("raw"), None);
            }
        }
        sleep(self.timings.dialog_teardown()).await;
    }
}
