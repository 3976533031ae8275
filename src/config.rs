//! Strongly-typed configuration for the OCR driver.
//!
//! Values can be constructed from defaults, loaded from environment variables
//! (with optional `.env` support), or merged with explicit overrides for
//! programmatic updates. Every timing, selector and heuristic threshold used
//! by the navigator and the extractor is reachable from here.

use std::env;
use std::fmt;
use std::num::ParseIntError;
use std::time::Duration;

use dotenvy::dotenv;
use serde::de::{Deserialize, Deserializer, Error as DeError};
use serde::ser::{Serialize, Serializer};
use serde::{Deserialize as DeriveDeserialize, Serialize as DeriveSerialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use thiserror::Error;

use crate::classifier::TextSignalHeuristics;
use crate::logging::LogCallback;
use crate::selectors::SiteSelectors;

type JsonObject = JsonMap<String, JsonValue>;

/// Public olmOCR demo the driver targets unless told otherwise.
pub const DEFAULT_TARGET_URL: &str = "https://olmocr.allenai.org";

pub const DEFAULT_PAGE_LIMIT: usize = 10;

pub const DEFAULT_OVERALL_TIMEOUT_MS: u64 = 5 * 60 * 1000;

/// Verbosity level for driver logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Minimal,
    Medium,
    Detailed,
}

impl Verbosity {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Verbosity::Minimal => 0,
            Verbosity::Medium => 1,
            Verbosity::Detailed => 2,
        }
    }

    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Verbosity::Minimal),
            1 => Some(Verbosity::Medium),
            2 => Some(Verbosity::Detailed),
            _ => None,
        }
    }
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::Medium
    }
}

impl Serialize for Verbosity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for Verbosity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = u8::deserialize(deserializer)?;
        Verbosity::from_u8(value).ok_or_else(|| {
            DeError::custom(format!(
                "invalid verbosity value {value}; expected 0, 1, or 2"
            ))
        })
    }
}

/// Bounded waits used while driving the site. All values are milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, DeriveSerialize, DeriveDeserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TimingSettings {
    pub poll_interval_ms: u64,
    /// Pause after starting processing before the first poll.
    pub warmup_ms: u64,
    pub start_control_timeout_ms: u64,
    /// Bound for per-page waits (processing text, scoped raw control).
    pub per_page_timeout_ms: u64,
    pub indicator_timeout_ms: u64,
    pub dialog_timeout_ms: u64,
    pub dialog_teardown_ms: u64,
    /// Pause used instead of the settle wait when a page has no container.
    pub unscoped_settle_ms: u64,
    /// Re-check interval for bounded element waits.
    pub check_interval_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            warmup_ms: 60_000,
            start_control_timeout_ms: 15_000,
            per_page_timeout_ms: 2 * 60 * 1_000,
            indicator_timeout_ms: 30_000,
            dialog_timeout_ms: 10_000,
            dialog_teardown_ms: 300,
            unscoped_settle_ms: 500,
            check_interval_ms: 250,
        }
    }
}

impl TimingSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }

    pub fn start_control_timeout(&self) -> Duration {
        Duration::from_millis(self.start_control_timeout_ms)
    }

    pub fn per_page_timeout(&self) -> Duration {
        Duration::from_millis(self.per_page_timeout_ms)
    }

    pub fn indicator_timeout(&self) -> Duration {
        Duration::from_millis(self.indicator_timeout_ms)
    }

    pub fn dialog_timeout(&self) -> Duration {
        Duration::from_millis(self.dialog_timeout_ms)
    }

    pub fn dialog_teardown(&self) -> Duration {
        Duration::from_millis(self.dialog_teardown_ms)
    }

    pub fn unscoped_settle(&self) -> Duration {
        Duration::from_millis(self.unscoped_settle_ms)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms.max(1))
    }
}

/// Configuration values for an OCR run.
#[derive(DeriveSerialize, DeriveDeserialize, Clone)]
#[serde(default, rename_all = "camelCase")]
pub struct DriverConfig {
    pub target_url: String,
    pub headless: bool,
    pub verbose: Verbosity,
    #[serde(skip_serializing, skip_deserializing)]
    pub logger: Option<LogCallback>,
    /// Default page limit for requests built from configuration.
    pub page_limit: usize,
    pub overall_timeout_ms: u64,
    pub timings: TimingSettings,
    pub selectors: SiteSelectors,
    pub heuristics: TextSignalHeuristics,
    pub local_browser_launch_options: JsonObject,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            target_url: DEFAULT_TARGET_URL.to_string(),
            headless: true,
            verbose: Verbosity::default(),
            logger: None,
            page_limit: DEFAULT_PAGE_LIMIT,
            overall_timeout_ms: DEFAULT_OVERALL_TIMEOUT_MS,
            timings: TimingSettings::default(),
            selectors: SiteSelectors::default(),
            heuristics: TextSignalHeuristics::default(),
            local_browser_launch_options: JsonObject::new(),
        }
    }
}

impl DriverConfig {
    /// Construct a configuration by reading relevant environment variables, after
    /// loading a `.env` file if present.
    pub fn from_env() -> Result<Self, DriverConfigError> {
        let _ = dotenv();
        let mut config = DriverConfig::default();

        if let Some(value) = env_var("OLMOCR_TARGET_URL") {
            config.target_url = value;
        }

        // `HEADLESS=false` is accepted for parity with older harness scripts.
        if let Some(value) = env_var("OLMOCR_HEADLESS") {
            config.headless = parse_bool("OLMOCR_HEADLESS", &value)?;
        } else if let Some(value) = env_var("HEADLESS") {
            config.headless = parse_bool("HEADLESS", &value)?;
        }

        if let Some(value) = env_var("OLMOCR_VERBOSE") {
            let parsed = parse_u8("OLMOCR_VERBOSE", &value)?;
            config.verbose = Verbosity::from_u8(parsed).ok_or_else(|| {
                DriverConfigError::invalid_enum("OLMOCR_VERBOSE", parsed.to_string())
            })?;
        }

        if let Some(value) = env_var("OLMOCR_PAGE_LIMIT") {
            config.page_limit = parse_u64("OLMOCR_PAGE_LIMIT", &value)? as usize;
        }

        if let Some(value) = env_var("OLMOCR_OVERALL_TIMEOUT_MS") {
            config.overall_timeout_ms = parse_u64("OLMOCR_OVERALL_TIMEOUT_MS", &value)?;
        }

        let timings = &mut config.timings;
        read_millis("OLMOCR_POLL_INTERVAL_MS", &mut timings.poll_interval_ms)?;
        read_millis("OLMOCR_WARMUP_MS", &mut timings.warmup_ms)?;
        read_millis(
            "OLMOCR_START_CONTROL_TIMEOUT_MS",
            &mut timings.start_control_timeout_ms,
        )?;
        read_millis(
            "OLMOCR_PER_PAGE_TIMEOUT_MS",
            &mut timings.per_page_timeout_ms,
        )?;
        read_millis(
            "OLMOCR_INDICATOR_TIMEOUT_MS",
            &mut timings.indicator_timeout_ms,
        )?;
        read_millis("OLMOCR_DIALOG_TIMEOUT_MS", &mut timings.dialog_timeout_ms)?;
        read_millis("OLMOCR_DIALOG_TEARDOWN_MS", &mut timings.dialog_teardown_ms)?;
        read_millis("OLMOCR_CHECK_INTERVAL_MS", &mut timings.check_interval_ms)?;

        if let Some(value) = env_var("OLMOCR_LAUNCH_OPTIONS") {
            config.local_browser_launch_options =
                parse_json_object("OLMOCR_LAUNCH_OPTIONS", &value)?;
        }

        if let Some(value) = env_var("OLMOCR_CHROME_BIN") {
            config
                .local_browser_launch_options
                .insert("chromeExecutable".to_string(), JsonValue::String(value));
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> Result<(), DriverConfigError> {
        if self.page_limit == 0 {
            return Err(DriverConfigError::OutOfRange {
                field: "page_limit",
                reason: "must be at least 1",
            });
        }
        if self.timings.poll_interval_ms == 0 {
            return Err(DriverConfigError::OutOfRange {
                field: "timings.poll_interval_ms",
                reason: "must be greater than zero",
            });
        }
        if self.target_url.trim().is_empty() {
            return Err(DriverConfigError::OutOfRange {
                field: "target_url",
                reason: "cannot be empty",
            });
        }
        Ok(())
    }

    pub fn overall_timeout(&self) -> Duration {
        Duration::from_millis(self.overall_timeout_ms)
    }

    /// Create a new configuration with explicit field overrides applied.
    pub fn with_overrides(&self, overrides: DriverConfigOverrides) -> DriverConfig {
        let mut next = self.clone();

        if let Some(value) = overrides.target_url {
            next.target_url = value;
        }
        if let Some(value) = overrides.headless {
            next.headless = value;
        }
        if let Some(value) = overrides.verbose {
            next.verbose = value;
        }
        if let Some(value) = overrides.logger {
            next.logger = value;
        }
        if let Some(value) = overrides.page_limit {
            next.page_limit = value;
        }
        if let Some(value) = overrides.overall_timeout_ms {
            next.overall_timeout_ms = value;
        }
        if let Some(value) = overrides.timings {
            next.timings = value;
        }
        if let Some(value) = overrides.selectors {
            next.selectors = value;
        }
        if let Some(value) = overrides.heuristics {
            next.heuristics = value;
        }
        if let Some(value) = overrides.local_browser_launch_options {
            next.local_browser_launch_options = value;
        }

        next
    }
}

/// Field-level overrides for [`DriverConfig::with_overrides`].
#[derive(Default, Clone)]
pub struct DriverConfigOverrides {
    pub target_url: Option<String>,
    pub headless: Option<bool>,
    pub verbose: Option<Verbosity>,
    pub logger: Option<Option<LogCallback>>,
    pub page_limit: Option<usize>,
    pub overall_timeout_ms: Option<u64>,
    pub timings: Option<TimingSettings>,
    pub selectors: Option<SiteSelectors>,
    pub heuristics: Option<TextSignalHeuristics>,
    pub local_browser_launch_options: Option<JsonObject>,
}

impl fmt::Debug for DriverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverConfig")
            .field("target_url", &self.target_url)
            .field("headless", &self.headless)
            .field("verbose", &self.verbose)
            .field("page_limit", &self.page_limit)
            .field("overall_timeout_ms", &self.overall_timeout_ms)
            .field("timings", &self.timings)
            .field("selectors", &self.selectors)
            .field("heuristics", &self.heuristics)
            .field(
                "local_browser_launch_options",
                &self.local_browser_launch_options,
            )
            .field("logger_present", &self.logger.is_some())
            .finish()
    }
}

impl fmt::Debug for DriverConfigOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverConfigOverrides")
            .field("target_url", &self.target_url)
            .field("headless", &self.headless)
            .field("verbose", &self.verbose)
            .field("logger", &self.logger.as_ref().map(|inner| inner.is_some()))
            .field("page_limit", &self.page_limit)
            .field("overall_timeout_ms", &self.overall_timeout_ms)
            .field("timings", &self.timings)
            .field("selectors", &self.selectors)
            .field("heuristics", &self.heuristics)
            .field(
                "local_browser_launch_options",
                &self.local_browser_launch_options,
            )
            .finish()
    }
}

impl DriverConfigOverrides {
    /// Builder-style helper to set the `headless` override.
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = Some(headless);
        self
    }

    /// Builder-style helper to set the `target_url` override.
    pub fn target_url(mut self, url: impl Into<String>) -> Self {
        self.target_url = Some(url.into());
        self
    }

    pub fn timings(mut self, timings: TimingSettings) -> Self {
        self.timings = Some(timings);
        self
    }
}

/// Errors that can arise while constructing a [`DriverConfig`].
#[derive(Debug, Error)]
pub enum DriverConfigError {
    #[error("invalid value '{value}' for {field}")]
    InvalidEnumVariant { field: &'static str, value: String },
    #[error("invalid boolean '{value}' for {field}")]
    InvalidBool { field: &'static str, value: String },
    #[error("invalid number '{value}' for {field}: {source}")]
    InvalidNumber {
        field: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("{field} {reason}")]
    OutOfRange {
        field: &'static str,
        reason: &'static str,
    },
    #[error("{field} must be a JSON object")]
    InvalidJsonType { field: &'static str },
    #[error("invalid JSON for {field}: {source}")]
    InvalidJson {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl DriverConfigError {
    fn invalid_enum(field: &'static str, value: String) -> Self {
        DriverConfigError::InvalidEnumVariant { field, value }
    }
}

fn env_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_bool(field: &'static str, value: &str) -> Result<bool, DriverConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(DriverConfigError::InvalidBool {
            field,
            value: value.to_string(),
        }),
    }
}

fn parse_u8(field: &'static str, value: &str) -> Result<u8, DriverConfigError> {
    value
        .trim()
        .parse::<u8>()
        .map_err(|source| DriverConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}

fn parse_u64(field: &'static str, value: &str) -> Result<u64, DriverConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|source| DriverConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}

fn read_millis(key: &'static str, slot: &mut u64) -> Result<(), DriverConfigError> {
    if let Some(value) = env_var(key) {
        *slot = parse_u64(key, &value)?;
    }
    Ok(())
}

fn parse_json_object(field: &'static str, value: &str) -> Result<JsonObject, DriverConfigError> {
    let parsed: JsonValue = serde_json::from_str(value)
        .map_err(|source| DriverConfigError::InvalidJson { field, source })?;
    match parsed {
        JsonValue::Object(map) => Ok(map),
        _ => Err(DriverConfigError::InvalidJsonType { field }),
    }
}
