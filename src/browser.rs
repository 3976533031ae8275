//! Browser launch planning and the runtime seam.
//!
//! This module turns [`DriverConfig`] into a strongly-typed [`LaunchPlan`]
//! (launch a local Chrome or attach to an existing CDP endpoint) and defines
//! the [`BrowserRuntime`] trait that executes the plan and hands out pages.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use thiserror::Error;

use crate::config::DriverConfig;
use crate::page::SitePage;
use crate::selectors::SiteSelectors;

type JsonObject = JsonMap<String, JsonValue>;

/// Arguments every local launch gets unless the caller replaces them.
pub const DEFAULT_LAUNCH_ARGS: [&str; 3] = [
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-blink-features=AutomationControlled",
];

/// Error surfaced while constructing a launch plan.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("failed to parse local browser launch options: {source}")]
    InvalidLocalOptions {
        #[source]
        source: serde_json::Error,
    },
}

/// Viewport dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport {
            width: 1288,
            height: 711,
        }
    }
}

/// Overrides accepted through `local_browser_launch_options`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct LocalLaunchOverrides {
    #[serde(alias = "cdp_url")]
    pub cdp_url: Option<String>,
    #[serde(alias = "user_data_dir")]
    pub user_data_dir: Option<String>,
    #[serde(alias = "chrome_executable")]
    pub chrome_executable: Option<String>,
    pub headless: Option<bool>,
    #[serde(alias = "ignore_https_errors")]
    pub ignore_https_errors: Option<bool>,
    pub locale: Option<String>,
    pub args: Option<Vec<String>>,
    #[serde(alias = "extra_args")]
    pub extra_args: Option<Vec<String>>,
    pub viewport: Option<Viewport>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    pub headless: bool,
    pub args: Vec<String>,
    pub viewport: Viewport,
    pub locale: String,
    pub ignore_https_errors: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchStrategy {
    AttachCdp { url: String },
    /// Launch a fresh browser. Without a profile directory the runtime
    /// creates a throwaway one per run.
    Launch { user_data_dir: Option<PathBuf> },
}

/// Normalised description of how to obtain a browser for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub strategy: LaunchStrategy,
    pub launch_options: LaunchOptions,
    pub chrome_executable: Option<PathBuf>,
}

impl LaunchPlan {
    pub fn from_config(config: &DriverConfig) -> Result<Self, BrowserError> {
        let overrides: LocalLaunchOverrides = serde_json::from_value(JsonValue::Object(
            config.local_browser_launch_options.clone(),
        ))
        .map_err(|source| BrowserError::InvalidLocalOptions { source })?;
        Ok(Self::from_overrides(config.headless, overrides))
    }

    pub fn from_overrides(headless: bool, overrides: LocalLaunchOverrides) -> Self {
        let strategy = match overrides.cdp_url {
            Some(url) => LaunchStrategy::AttachCdp { url },
            None => LaunchStrategy::Launch {
                user_data_dir: overrides.user_data_dir.map(PathBuf::from),
            },
        };

        let mut args = overrides.args.unwrap_or_else(|| {
            DEFAULT_LAUNCH_ARGS
                .iter()
                .map(|arg| arg.to_string())
                .collect()
        });
        if let Some(extra) = overrides.extra_args {
            args.extend(extra);
        }

        let launch_options = LaunchOptions {
            headless: overrides.headless.unwrap_or(headless),
            args,
            viewport: overrides.viewport.unwrap_or_default(),
            locale: overrides.locale.unwrap_or_else(|| "en-US".to_string()),
            ignore_https_errors: overrides.ignore_https_errors.unwrap_or(true),
        };

        LaunchPlan {
            strategy,
            launch_options,
            chrome_executable: overrides.chrome_executable.map(PathBuf::from),
        }
    }

    pub fn is_attach(&self) -> bool {
        matches!(self.strategy, LaunchStrategy::AttachCdp { .. })
    }
}

/// Executes a [`LaunchPlan`] and opens pages on the resulting browser.
#[async_trait]
pub trait BrowserRuntime: Send + Sync {
    type Page: SitePage + 'static;

    async fn launch(&self, plan: &LaunchPlan) -> Result<(), BrowserRuntimeError>;

    async fn open_page(
        &self,
        url: &str,
        selectors: &SiteSelectors,
    ) -> Result<Self::Page, BrowserRuntimeError>;

    /// Release the browser session. Safe to call when nothing is running.
    async fn shutdown(&self) -> Result<(), BrowserRuntimeError>;
}

#[derive(Debug, Error)]
pub enum BrowserRuntimeError {
    #[error("browser runtime error: {0}")]
    Message(String),
    #[error("browser runtime not initialized")]
    NotInitialized,
}
