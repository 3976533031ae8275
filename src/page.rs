//! Page abstraction used by the navigator and the extractor.
//!
//! [`SitePage`] exposes the handful of semantic DOM operations the engine
//! needs. The chromiumoxide implementation evaluates the checks from
//! [`dom_scripts`](crate::dom_scripts); tests substitute scripted mocks.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::input::{DispatchKeyEventParams, DispatchKeyEventType};
use chromiumoxide::page::{Page as ChromiumPage, ScreenshotParams};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::time::{Instant, sleep};

use crate::dom_scripts::{self, ScriptScope};
use crate::selectors::{ControlSelector, SiteSelectors};
use crate::types::{DialogSnapshot, PollObservation};

#[derive(Debug, Error)]
pub enum PageError {
    #[error("CDP error: {0}")]
    Cdp(String),
    #[error("script evaluation failed: {0}")]
    Evaluation(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("unsupported page operation: {0}")]
    Unsupported(&'static str),
}

/// Interactive controls the engine knows how to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Consent,
    StartProcessing,
    RawDetail,
    DialogClose,
}

/// Region of the page a control lookup is restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlScope {
    Document,
    Container(usize),
    Dialog,
}

impl From<ControlScope> for ScriptScope {
    fn from(scope: ControlScope) -> Self {
        match scope {
            ControlScope::Document => ScriptScope::Document,
            ControlScope::Container(index) => ScriptScope::Container(index),
            ControlScope::Dialog => ScriptScope::Dialog,
        }
    }
}

/// Signals that a page container is still being worked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusySignal {
    ProcessingText,
    LoadingIndicator,
}

#[async_trait]
pub trait SitePage: Send + Sync {
    /// Navigate and wait for the load to finish.
    async fn goto(&self, url: &str) -> Result<(), PageError>;

    async fn observe(&self) -> Result<PollObservation, PageError>;

    async fn container_count(&self) -> Result<usize, PageError>;

    async fn container_busy(&self, index: usize, signal: BusySignal) -> Result<bool, PageError>;

    async fn control_count(
        &self,
        control: Control,
        scope: ControlScope,
        visible_only: bool,
    ) -> Result<usize, PageError>;

    /// Scroll the `position`-th matching control into view and click it.
    /// Returns `false` when no such control exists.
    async fn click_control(
        &self,
        control: Control,
        scope: ControlScope,
        position: usize,
    ) -> Result<bool, PageError>;

    /// Attach a file to the upload input. Returns `false` when the page has
    /// no file input.
    async fn attach_file(&self, path: &Path) -> Result<bool, PageError>;

    async fn dialog_open(&self) -> Result<bool, PageError>;

    async fn dialog_snapshot(&self) -> Result<DialogSnapshot, PageError>;

    async fn press_escape(&self) -> Result<(), PageError>;

    async fn screenshot(&self, _path: &Path) -> Result<(), PageError> {
        Err(PageError::Unsupported("screenshot"))
    }
}

#[async_trait]
impl<T: SitePage + ?Sized> SitePage for Arc<T> {
    async fn goto(&self, url: &str) -> Result<(), PageError> {
        (**self).goto(url).await
    }

    async fn observe(&self) -> Result<PollObservation, PageError> {
        (**self).observe().await
    }

    async fn container_count(&self) -> Result<usize, PageError> {
        (**self).container_count().await
    }

    async fn container_busy(&self, index: usize, signal: BusySignal) -> Result<bool, PageError> {
        (**self).container_busy(index, signal).await
    }

    async fn control_count(
        &self,
        control: Control,
        scope: ControlScope,
        visible_only: bool,
    ) -> Result<usize, PageError> {
        (**self).control_count(control, scope, visible_only).await
    }

    async fn click_control(
        &self,
        control: Control,
        scope: ControlScope,
        position: usize,
    ) -> Result<bool, PageError> {
        (**self).click_control(control, scope, position).await
    }

    async fn attach_file(&self, path: &Path) -> Result<bool, PageError> {
        (**self).attach_file(path).await
    }

    async fn dialog_open(&self) -> Result<bool, PageError> {
        (**self).dialog_open().await
    }

    async fn dialog_snapshot(&self) -> Result<DialogSnapshot, PageError> {
        (**self).dialog_snapshot().await
    }

    async fn press_escape(&self) -> Result<(), PageError> {
        (**self).press_escape().await
    }

    async fn screenshot(&self, path: &Path) -> Result<(), PageError> {
        (**self).screenshot(path).await
    }
}

/// Re-run `check` every `interval` until it reports `true` or `timeout`
/// elapses. The check always runs at least once.
pub async fn wait_until<F, Fut>(
    timeout: Duration,
    interval: Duration,
    mut check: F,
) -> Result<bool, PageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, PageError>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if check().await? {
            return Ok(true);
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(false);
        }
        sleep(interval.min(deadline - now)).await;
    }
}

fn cdp_error(err: impl std::fmt::Display) -> PageError {
    PageError::Cdp(err.to_string())
}

/// [`SitePage`] backed by a live chromiumoxide tab.
#[derive(Clone)]
pub struct ChromiumSitePage {
    page: ChromiumPage,
    selectors: SiteSelectors,
}

impl ChromiumSitePage {
    pub fn new(page: ChromiumPage, selectors: SiteSelectors) -> Self {
        Self { page, selectors }
    }

    async fn evaluate_expression(&self, expression: &str) -> Result<JsonValue, PageError> {
        let result = self
            .page
            .evaluate(expression)
            .await
            .map_err(|err| PageError::Evaluation(err.to_string()))?;
        Ok(result.value().cloned().unwrap_or(JsonValue::Null))
    }

    async fn evaluate_as<T: DeserializeOwned>(&self, expression: &str) -> Result<T, PageError> {
        let value = self.evaluate_expression(expression).await?;
        Ok(serde_json::from_value(value)?)
    }

    fn control_selector(&self, control: Control) -> &ControlSelector {
        match control {
            Control::Consent => &self.selectors.consent_control,
            Control::StartProcessing => &self.selectors.start_control,
            Control::RawDetail => &self.selectors.raw_control,
            Control::DialogClose => &self.selectors.dialog_close,
        }
    }

    async fn send_key(&self, kind: DispatchKeyEventType, key: &str, code: i64) -> Result<(), PageError> {
        let params = DispatchKeyEventParams::builder()
            .r#type(kind)
            .key(key)
            .code(key)
            .windows_virtual_key_code(code)
            .native_virtual_key_code(code)
            .build()
            .map_err(PageError::Cdp)?;
        self.page.execute(params).await.map_err(cdp_error)?;
        Ok(())
    }
}

#[async_trait]
impl SitePage for ChromiumSitePage {
    async fn goto(&self, url: &str) -> Result<(), PageError> {
        self.page.goto(url).await.map_err(cdp_error)?;
        self.page.wait_for_navigation().await.map_err(cdp_error)?;
        Ok(())
    }

    async fn observe(&self) -> Result<PollObservation, PageError> {
        let script = dom_scripts::observe_script(&self.selectors)?;
        self.evaluate_as(&script).await
    }

    async fn container_count(&self) -> Result<usize, PageError> {
        let script = dom_scripts::container_count_script(&self.selectors)?;
        self.evaluate_as(&script).await
    }

    async fn container_busy(&self, index: usize, signal: BusySignal) -> Result<bool, PageError> {
        let script = match signal {
            BusySignal::ProcessingText => {
                dom_scripts::processing_text_script(&self.selectors, index)?
            }
            BusySignal::LoadingIndicator => {
                dom_scripts::loading_indicator_script(&self.selectors, index)?
            }
        };
        self.evaluate_as(&script).await
    }

    async fn control_count(
        &self,
        control: Control,
        scope: ControlScope,
        visible_only: bool,
    ) -> Result<usize, PageError> {
        let script = dom_scripts::control_count_script(
            &self.selectors,
            self.control_selector(control),
            scope.into(),
            visible_only,
        )?;
        self.evaluate_as(&script).await
    }

    async fn click_control(
        &self,
        control: Control,
        scope: ControlScope,
        position: usize,
    ) -> Result<bool, PageError> {
        let script = dom_scripts::click_control_script(
            &self.selectors,
            self.control_selector(control),
            scope.into(),
            position,
        )?;
        self.evaluate_as(&script).await
    }

    async fn attach_file(&self, path: &Path) -> Result<bool, PageError> {
        let script = dom_scripts::element_exists_script(&self.selectors.file_input)?;
        if !self.evaluate_as::<bool>(&script).await? {
            return Ok(false);
        }

        let absolute: PathBuf = tokio::fs::canonicalize(path).await?;
        let input = self
            .page
            .find_element(self.selectors.file_input.as_str())
            .await
            .map_err(cdp_error)?;
        let params = SetFileInputFilesParams::builder()
            .file(absolute.to_string_lossy().into_owned())
            .backend_node_id(input.backend_node_id)
            .build()
            .map_err(PageError::Cdp)?;
        self.page.execute(params).await.map_err(cdp_error)?;
        Ok(true)
    }

    async fn dialog_open(&self) -> Result<bool, PageError> {
        let script = dom_scripts::element_exists_script(&self.selectors.dialog)?;
        self.evaluate_as(&script).await
    }

    async fn dialog_snapshot(&self) -> Result<DialogSnapshot, PageError> {
        let script = dom_scripts::dialog_snapshot_script(&self.selectors)?;
        self.evaluate_as(&script).await
    }

    async fn press_escape(&self) -> Result<(), PageError> {
        self.send_key(DispatchKeyEventType::KeyDown, "Escape", 27)
            .await?;
        self.send_key(DispatchKeyEventType::KeyUp, "Escape", 27)
            .await
    }

    async fn screenshot(&self, path: &Path) -> Result<(), PageError> {
        let params = ScreenshotParams::builder().full_page(true).build();
        self.page
            .save_screenshot(params, path)
            .await
            .map_err(cdp_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn wait_until_reports_success_once_check_passes() {
        let calls = AtomicUsize::new(0);
        let started = Instant::now();
        let ok = wait_until(Duration::from_secs(10), Duration::from_millis(250), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(n >= 3) }
        })
        .await
        .unwrap();

        assert!(ok);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(started.elapsed() >= Duration::from_millis(750));
        assert!(started.elapsed() < Duration::from_millis(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_until_gives_up_at_the_deadline() {
        let started = Instant::now();
        let ok = wait_until(Duration::from_millis(1_000), Duration::from_millis(300), || async {
            Ok(false)
        })
        .await
        .unwrap();

        assert!(!ok);
        assert!(started.elapsed() >= Duration::from_millis(1_000));
        assert!(started.elapsed() < Duration::from_millis(1_100));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_until_propagates_check_errors() {
        let err = wait_until(Duration::from_secs(1), Duration::from_millis(100), || async {
            Err(PageError::Evaluation("detached".into()))
        })
        .await
        .expect_err("check error");
        assert!(matches!(err, PageError::Evaluation(_)));
    }

    #[test]
    fn scopes_map_onto_script_scopes() {
        assert_eq!(
            ScriptScope::from(ControlScope::Container(2)),
            ScriptScope::Container(2)
        );
        assert_eq!(ScriptScope::from(ControlScope::Dialog), ScriptScope::Dialog);
    }
}
