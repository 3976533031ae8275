//! Structured logging for the driver.
//!
//! Records carry a category (`navigate`, `extract`, `raw`, `runtime`, `jobs`)
//! and optional JSON detail. They go either to an external callback supplied
//! through [`DriverConfig`](crate::config::DriverConfig) or to the `log`
//! facade, so binaries decide where the output ends up.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Verbosity;

/// Convenience alias for external logging callbacks.
pub type LogCallback = Arc<dyn Fn(&DriverLogRecord) + Send + Sync + 'static>;

#[derive(Clone, Default)]
pub struct LogConfig {
    pub verbose: Verbosity,
    pub external_logger: Option<LogCallback>,
}

impl LogConfig {
    pub fn new(verbose: Verbosity) -> Self {
        Self {
            verbose,
            external_logger: None,
        }
    }

    pub fn should_log(&self, level: LogLevel) -> bool {
        level == LogLevel::Error || level.as_u8() <= self.verbose.as_u8()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error = 0,
    Info = 1,
    Debug = 2,
}

impl LogLevel {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    fn facade_level(self) -> log::Level {
        match self {
            LogLevel::Error => log::Level::Error,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
        }
    }
}

/// Structured log entry shared with external callbacks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriverLogRecord {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub level: LogLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auxiliary: Option<Value>,
}

impl DriverLogRecord {
    pub fn new(
        message: impl Into<String>,
        level: LogLevel,
        category: Option<String>,
        auxiliary: Option<Value>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
            level,
            category,
            auxiliary,
        }
    }
}

/// Default sink: hands the record to the `log` facade under
/// `olmocr_driver::<category>`.
pub fn default_log_handler(record: &DriverLogRecord) {
    let target = match &record.category {
        Some(category) => format!("olmocr_driver::{category}"),
        None => "olmocr_driver".to_string(),
    };
    let level = record.level.facade_level();
    match &record.auxiliary {
        Some(aux) if !aux.is_null() => {
            log::log!(target: &target, level, "{} {}", record.message, aux)
        }
        _ => log::log!(target: &target, level, "{}", record.message),
    }
}

pub struct DriverLogger {
    config: LogConfig,
    default_handler: LogCallback,
}

impl fmt::Debug for DriverLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverLogger")
            .field("verbosity", &self.config.verbose)
            .field("external_logger", &self.config.external_logger.is_some())
            .finish()
    }
}

impl Default for DriverLogger {
    fn default() -> Self {
        Self::with_config(LogConfig::default())
    }
}

impl DriverLogger {
    pub fn with_config(config: LogConfig) -> Self {
        Self {
            config,
            default_handler: Arc::new(default_log_handler),
        }
    }

    pub fn new(verbose: Verbosity) -> Self {
        Self::with_config(LogConfig::new(verbose))
    }

    /// Logger for a run: driver verbosity plus the optional external sink.
    pub fn from_config(config: &crate::config::DriverConfig) -> Self {
        Self::with_config(LogConfig {
            verbose: config.verbose,
            external_logger: config.logger.clone(),
        })
    }

    pub fn set_external_logger(&mut self, logger: Option<LogCallback>) {
        self.config.external_logger = logger;
    }

    pub fn log(
        &self,
        message: impl Into<String>,
        level: LogLevel,
        category: Option<&str>,
        auxiliary: Option<Value>,
    ) {
        if !self.config.should_log(level) {
            return;
        }

        let record =
            DriverLogRecord::new(message, level, category.map(|c| c.to_string()), auxiliary);

        if let Some(callback) = &self.config.external_logger {
            callback(&record);
        } else {
            (self.default_handler)(&record);
        }
    }

    pub fn error(
        &self,
        message: impl Into<String>,
        category: Option<&str>,
        auxiliary: Option<Value>,
    ) {
        self.log(message, LogLevel::Error, category, auxiliary);
    }

    pub fn info(
        &self,
        message: impl Into<String>,
        category: Option<&str>,
        auxiliary: Option<Value>,
    ) {
        self.log(message, LogLevel::Info, category, auxiliary);
    }

    pub fn debug(
        &self,
        message: impl Into<String>,
        category: Option<&str>,
        auxiliary: Option<Value>,
    ) {
        self.log(message, LogLevel::Debug, category, auxiliary);
    }
}

#[cfg(test)]
pub(crate) fn capture_logger(verbose: Verbosity) -> (DriverLogger, Arc<std::sync::Mutex<Vec<DriverLogRecord>>>) {
    let records = Arc::new(std::sync::Mutex::new(Vec::new()));
    let capture = Arc::clone(&records);
    let callback: LogCallback = Arc::new(move |record| {
        capture.lock().unwrap().push(record.clone());
    });
    let mut logger = DriverLogger::new(verbose);
    logger.set_external_logger(Some(callback));
    (logger, records)
}
