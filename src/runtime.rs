//! Chromiumoxide-based browser runtime.
//!
//! Provides an implementation of [`BrowserRuntime`](crate::browser::BrowserRuntime)
//! backed by the `chromiumoxide` crate. One runtime owns at most one browser
//! session; [`shutdown`](BrowserRuntime::shutdown) closes a launched browser,
//! closes the tabs it opened in an attached one and removes any throwaway
//! profile directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::target::{CloseTargetParams, TargetId};
use futures_util::StreamExt;
use tokio::{fs, sync::Mutex, task::JoinHandle};
use uuid::Uuid;

use crate::browser::{BrowserRuntime, BrowserRuntimeError, LaunchPlan, LaunchStrategy};
use crate::page::ChromiumSitePage;
use crate::selectors::SiteSelectors;

pub struct ChromiumoxideRuntime {
    state: Mutex<Option<RuntimeState>>,
}

struct RuntimeState {
    browser: Browser,
    handler: JoinHandle<()>,
    /// Whether the process was started by us and must be closed on shutdown.
    owned: bool,
    /// Tabs opened in a browser we attached to; closed on shutdown.
    opened_targets: Vec<TargetId>,
    temp_user_data_dir: Option<PathBuf>,
}

impl ChromiumoxideRuntime {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.is_some()
    }
}

impl Default for ChromiumoxideRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserRuntime for ChromiumoxideRuntime {
    type Page = ChromiumSitePage;

    async fn launch(&self, plan: &LaunchPlan) -> Result<(), BrowserRuntimeError> {
        let mut guard = self.state.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let state = match &plan.strategy {
            LaunchStrategy::AttachCdp { url } => attach_to_cdp(url).await?,
            LaunchStrategy::Launch { user_data_dir } => {
                launch_local(plan, user_data_dir.clone()).await?
            }
        };
        *guard = Some(state);
        Ok(())
    }

    async fn open_page(
        &self,
        url: &str,
        selectors: &SiteSelectors,
    ) -> Result<ChromiumSitePage, BrowserRuntimeError> {
        let mut guard = self.state.lock().await;
        let state = guard.as_mut().ok_or(BrowserRuntimeError::NotInitialized)?;
        let page = state
            .browser
            .new_page(url)
            .await
            .map_err(map_chromiumoxide_error)?;
        if !state.owned {
            state.opened_targets.push(page.target_id().clone());
        }
        Ok(ChromiumSitePage::new(page, selectors.clone()))
    }

    async fn shutdown(&self) -> Result<(), BrowserRuntimeError> {
        let state = {
            let mut guard = self.state.lock().await;
            guard.take()
        };

        let Some(mut state) = state else {
            return Ok(());
        };

        let mut outcome = Ok(());
        if state.owned {
            if let Err(err) = state.browser.close().await {
                outcome = Err(map_chromiumoxide_error(err));
            } else if let Err(err) = state.browser.wait().await {
                log::warn!("browser process did not exit cleanly: {err}");
            }
        } else {
            for target in state.opened_targets.drain(..) {
                if let Err(err) = state.browser.execute(CloseTargetParams::new(target)).await {
                    log::warn!("failed to close attached tab: {err}");
                }
            }
        }

        if let Some(path) = cleanup_state(state) {
            if let Err(err) = fs::remove_dir_all(&path).await {
                log::warn!("failed to remove temporary user data dir {:?}: {err}", path);
            }
        }

        outcome
    }
}

fn build_config(
    plan: &LaunchPlan,
    user_data_dir: &Path,
) -> Result<BrowserConfig, BrowserRuntimeError> {
    let launch = &plan.launch_options;

    let viewport = chromiumoxide::handler::viewport::Viewport {
        width: launch.viewport.width,
        height: launch.viewport.height,
        device_scale_factor: None,
        emulating_mobile: false,
        is_landscape: launch.viewport.width >= launch.viewport.height,
        has_touch: false,
    };

    let mut builder = BrowserConfig::builder();

    if let Some(path) = &plan.chrome_executable {
        builder = builder.chrome_executable(path);
    }

    let builder = builder
        .viewport(viewport)
        .args(launch.args.clone())
        .user_data_dir(user_data_dir);

    let builder = if launch.headless {
        builder
    } else {
        builder.with_head()
    };

    let builder = if !launch.ignore_https_errors {
        builder.respect_https_errors()
    } else {
        builder
    };

    let builder = if !launch.locale.is_empty() {
        builder.arg(format!("--lang={}", launch.locale))
    } else {
        builder
    };

    builder.build().map_err(BrowserRuntimeError::Message)
}

fn map_chromiumoxide_error<E: std::fmt::Display>(err: E) -> BrowserRuntimeError {
    BrowserRuntimeError::Message(err.to_string())
}

async fn attach_to_cdp(url: &str) -> Result<RuntimeState, BrowserRuntimeError> {
    let (browser, handler) = Browser::connect(url)
        .await
        .map_err(map_chromiumoxide_error)?;

    Ok(RuntimeState {
        browser,
        handler: spawn_handler(handler),
        owned: false,
        opened_targets: Vec::new(),
        temp_user_data_dir: None,
    })
}

async fn launch_local(
    plan: &LaunchPlan,
    user_data_dir: Option<PathBuf>,
) -> Result<RuntimeState, BrowserRuntimeError> {
    let (profile, temp_user_data_dir) = match user_data_dir {
        Some(dir) => (dir, None),
        None => {
            let dir = std::env::temp_dir().join(format!("olmocr-driver-{}", Uuid::new_v4()));
            (dir.clone(), Some(dir))
        }
    };

    fs::create_dir_all(&profile)
        .await
        .map_err(|err| BrowserRuntimeError::Message(err.to_string()))?;

    let config = build_config(plan, &profile)?;
    let (browser, handler) = match Browser::launch(config).await {
        Ok(pair) => pair,
        Err(err) => {
            if let Some(dir) = &temp_user_data_dir {
                let _ = fs::remove_dir_all(dir).await;
            }
            return Err(map_chromiumoxide_error(err));
        }
    };

    Ok(RuntimeState {
        browser,
        handler: spawn_handler(handler),
        owned: true,
        opened_targets: Vec::new(),
        temp_user_data_dir,
    })
}

fn spawn_handler(mut handler: chromiumoxide::handler::Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(result) = handler.next().await {
            if let Err(err) = result {
                log::debug!("chromiumoxide handler error: {err}");
            }
        }
    })
}

fn cleanup_state(mut state: RuntimeState) -> Option<PathBuf> {
    state.handler.abort();
    state.temp_user_data_dir.take()
}
