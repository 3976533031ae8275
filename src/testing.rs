//! Scripted mock page and runtime used by unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::browser::{BrowserRuntime, BrowserRuntimeError, LaunchPlan};
use crate::page::{BusySignal, Control, ControlScope, PageError, SitePage};
use crate::selectors::SiteSelectors;
use crate::types::{DialogSnapshot, HeadingSnapshot, PollObservation};

/// Everything the mock page reports. Raw controls and dialogs are keyed by
/// zero-based page position.
#[derive(Debug, Default)]
pub(crate) struct MockState {
    /// Consumed one per `observe`; the last one repeats.
    pub observations: VecDeque<PollObservation>,
    pub observe_failures: usize,
    pub container_count: usize,
    pub consent_present: bool,
    pub file_input: bool,
    pub start_control: bool,
    /// Number of visibility checks that report the start control hidden.
    pub start_hidden_checks: usize,
    /// Remaining "still processing" answers per container.
    pub processing_checks: HashMap<usize, usize>,
    pub processing_stuck: HashSet<usize>,
    pub indicator_stuck: HashSet<usize>,
    pub raw_in_container: HashSet<usize>,
    pub global_raw_controls: usize,
    pub dialogs: HashMap<usize, DialogSnapshot>,
    pub snapshot_failures: HashSet<usize>,
    pub close_button: bool,
    pub open_dialog: Option<usize>,
    pub calls: Vec<String>,
}

pub(crate) struct MockSitePage {
    state: Mutex<MockState>,
}

impl MockSitePage {
    pub fn new(state: MockState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn with_state<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> T {
        let mut guard = self.state.lock().unwrap();
        f(&mut *guard)
    }
}

/// Dialog with one `h3` + `pre` pair per `(title, content)`.
pub(crate) fn dialog_with(pairs: &[(&str, &str)]) -> DialogSnapshot {
    DialogSnapshot {
        headings: pairs
            .iter()
            .map(|(title, content)| HeadingSnapshot {
                title: title.to_string(),
                next_tag: Some("pre".to_string()),
                next_text: Some(content.to_string()),
            })
            .collect(),
        preformatted: pairs.iter().map(|(_, content)| content.to_string()).collect(),
    }
}

fn scope_label(scope: ControlScope) -> String {
    match scope {
        ControlScope::Document => "document".to_string(),
        ControlScope::Container(index) => format!("container:{index}"),
        ControlScope::Dialog => "dialog".to_string(),
    }
}

#[async_trait]
impl SitePage for MockSitePage {
    async fn goto(&self, url: &str) -> Result<(), PageError> {
        self.state.lock().unwrap().calls.push(format!("goto:{url}"));
        Ok(())
    }

    async fn observe(&self) -> Result<PollObservation, PageError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("observe".to_string());
        if state.observe_failures > 0 {
            state.observe_failures -= 1;
            return Err(PageError::Evaluation("execution context destroyed".into()));
        }
        if state.observations.len() > 1 {
            Ok(state.observations.pop_front().unwrap_or_default())
        } else {
            Ok(state.observations.front().cloned().unwrap_or_default())
        }
    }

    async fn container_count(&self) -> Result<usize, PageError> {
        Ok(self.state.lock().unwrap().container_count)
    }

    async fn container_busy(&self, index: usize, signal: BusySignal) -> Result<bool, PageError> {
        let mut state = self.state.lock().unwrap();
        Ok(match signal {
            BusySignal::ProcessingText => {
                if state.processing_stuck.contains(&index) {
                    true
                } else if let Some(remaining) = state.processing_checks.get_mut(&index) {
                    let busy = *remaining > 0;
                    *remaining = remaining.saturating_sub(1);
                    busy
                } else {
                    false
                }
            }
            BusySignal::LoadingIndicator => state.indicator_stuck.contains(&index),
        })
    }

    async fn control_count(
        &self,
        control: Control,
        scope: ControlScope,
        _visible_only: bool,
    ) -> Result<usize, PageError> {
        let mut state = self.state.lock().unwrap();
        Ok(match (control, scope) {
            (Control::Consent, _) => usize::from(state.consent_present),
            (Control::StartProcessing, _) => {
                if state.start_hidden_checks > 0 {
                    state.start_hidden_checks -= 1;
                    0
                } else {
                    usize::from(state.start_control)
                }
            }
            (Control::RawDetail, ControlScope::Container(index)) => {
                usize::from(state.raw_in_container.contains(&index))
            }
            (Control::RawDetail, _) => state.global_raw_controls,
            (Control::DialogClose, _) => {
                usize::from(state.close_button && state.open_dialog.is_some())
            }
        })
    }

    async fn click_control(
        &self,
        control: Control,
        scope: ControlScope,
        position: usize,
    ) -> Result<bool, PageError> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(format!("click:{control:?}@{}#{position}", scope_label(scope)));
        Ok(match control {
            Control::Consent => state.consent_present,
            Control::StartProcessing => state.start_control,
            Control::RawDetail => {
                let key = match scope {
                    ControlScope::Container(index) if state.raw_in_container.contains(&index) => {
                        Some(index)
                    }
                    ControlScope::Document if position < state.global_raw_controls => {
                        Some(position)
                    }
                    _ => None,
                };
                match key {
                    Some(key) => {
                        if state.dialogs.contains_key(&key) {
                            state.open_dialog = Some(key);
                        }
                        true
                    }
                    None => false,
                }
            }
            Control::DialogClose => {
                if state.close_button && state.open_dialog.is_some() {
                    state.open_dialog = None;
                    true
                } else {
                    false
                }
            }
        })
    }

    async fn attach_file(&self, path: &Path) -> Result<bool, PageError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("attach:{}", path.display()));
        Ok(state.file_input)
    }

    async fn dialog_open(&self) -> Result<bool, PageError> {
        Ok(self.state.lock().unwrap().open_dialog.is_some())
    }

    async fn dialog_snapshot(&self) -> Result<DialogSnapshot, PageError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("snapshot".to_string());
        let key = state.open_dialog.ok_or(PageError::Unsupported("no dialog"))?;
        if state.snapshot_failures.contains(&key) {
            return Err(PageError::Evaluation("target closed".into()));
        }
        Ok(state.dialogs.get(&key).cloned().unwrap_or_default())
    }

    async fn press_escape(&self) -> Result<(), PageError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("escape".to_string());
        state.open_dialog = None;
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> Result<(), PageError> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(format!("screenshot:{}", path.display()));
        std::fs::write(path, b"fake-png")?;
        Ok(())
    }
}

/// Runtime handing out one shared [`MockSitePage`] and counting lifecycle calls.
pub(crate) struct MockRuntime {
    pub page: Arc<MockSitePage>,
    pub fail_launch: bool,
    pub fail_open: bool,
    pub fail_shutdown: bool,
    pub launches: AtomicUsize,
    pub shutdowns: AtomicUsize,
}

impl MockRuntime {
    pub fn new(page: MockSitePage) -> Self {
        Self {
            page: Arc::new(page),
            fail_launch: false,
            fail_open: false,
            fail_shutdown: false,
            launches: AtomicUsize::new(0),
            shutdowns: AtomicUsize::new(0),
        }
    }

    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserRuntime for MockRuntime {
    type Page = Arc<MockSitePage>;

    async fn launch(&self, _plan: &LaunchPlan) -> Result<(), BrowserRuntimeError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.fail_launch {
            return Err(BrowserRuntimeError::Message("chrome not found".into()));
        }
        Ok(())
    }

    async fn open_page(
        &self,
        _url: &str,
        _selectors: &SiteSelectors,
    ) -> Result<Arc<MockSitePage>, BrowserRuntimeError> {
        if self.fail_open {
            return Err(BrowserRuntimeError::Message("target crashed".into()));
        }
        Ok(Arc::clone(&self.page))
    }

    async fn shutdown(&self) -> Result<(), BrowserRuntimeError> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        if self.fail_shutdown {
            return Err(BrowserRuntimeError::Message("close failed".into()));
        }
        Ok(())
    }
}
