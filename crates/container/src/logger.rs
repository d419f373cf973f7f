//! Injectable diagnostic sink.
//!
//! The container never assumes a subscriber is installed: it reports through
//! a `Logger`, and the default `EmptyLogger` drops everything.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Severity of a container event. `None` disables a logger entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Error,
    #[default]
    None,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Error => "error",
            Level::None => "none",
        };
        f.write_str(name)
    }
}

impl FromStr for Level {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "error" => Ok(Level::Error),
            "none" | "off" => Ok(Level::None),
            other => Err(anyhow::anyhow!("Unknown log level '{}'", other)),
        }
    }
}

pub trait Logger: Send + Sync {
    /// Minimum level this logger accepts
    fn level(&self) -> Level;

    fn log(&self, level: Level, message: &str);

    fn is_at(&self, level: Level) -> bool {
        level != Level::None && self.level() <= level
    }

    fn debug(&self, message: &str) {
        if self.is_at(Level::Debug) {
            self.log(Level::Debug, message);
        }
    }

    fn info(&self, message: &str) {
        if self.is_at(Level::Info) {
            self.log(Level::Info, message);
        }
    }

    fn error(&self, message: &str) {
        if self.is_at(Level::Error) {
            self.log(Level::Error, message);
        }
    }
}

/// No-op sink
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyLogger;

impl Logger for EmptyLogger {
    fn level(&self) -> Level {
        Level::None
    }

    fn log(&self, _level: Level, _message: &str) {}
}

/// Forwards container events to `tracing` under the `container` target
#[derive(Debug, Clone, Copy)]
pub struct TracingLogger {
    level: Level,
}

impl TracingLogger {
    pub fn new(level: Level) -> Self {
        Self { level }
    }
}

impl Default for TracingLogger {
    fn default() -> Self {
        Self::new(Level::Info)
    }
}

impl Logger for TracingLogger {
    fn level(&self) -> Level {
        self.level
    }

    fn log(&self, level: Level, message: &str) {
        match level {
            Level::Debug => tracing::debug!(target: "container", "{}", message),
            Level::Info => tracing::info!(target: "container", "{}", message),
            Level::Error => tracing::error!(target: "container", "{}", message),
            Level::None => {}
        }
    }
}
