use serde::{Deserialize, Serialize};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Output format of the installed subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable output for development
    #[default]
    Pretty,
    /// One JSON object per event, for log shippers
    Json,
}

/// Subscriber configuration.
///
/// `filter` uses `EnvFilter` directive syntax (`"info"`, `"container=debug,warn"`).
/// `RUST_LOG`, when set, takes precedence over it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
    pub format: LogFormat,
    pub ansi: bool,
    pub thread_ids: bool,
    pub line_numbers: bool,
    /// Route output through the libtest capture instead of stdout
    pub test_writer: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Pretty,
            ansi: true,
            thread_ids: true,
            line_numbers: cfg!(debug_assertions),
            test_writer: false,
        }
    }
}

impl LoggingConfig {
    /// Production preset: JSON, no colors
    pub fn production() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Json,
            ansi: false,
            thread_ids: true,
            line_numbers: false,
            test_writer: false,
        }
    }

    /// Preset for test binaries: verbose and captured by the test harness
    pub fn for_tests() -> Self {
        Self {
            filter: "debug".to_string(),
            format: LogFormat::Pretty,
            ansi: false,
            thread_ids: true,
            line_numbers: true,
            test_writer: true,
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.filter))
    }
}

/// Install the global `tracing` subscriber.
///
/// Fails if a global subscriber is already installed.
pub fn init_structured_logging(config: LoggingConfig) -> anyhow::Result<()> {
    let env_filter = config.env_filter();

    match (config.format, config.test_writer) {
        (LogFormat::Json, false) => Registry::default()
            .with(env_filter)
            .with(fmt::layer().json().with_current_span(false).with_thread_ids(config.thread_ids))
            .try_init()?,
        (LogFormat::Json, true) => Registry::default()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_thread_ids(config.thread_ids)
                    .with_test_writer(),
            )
            .try_init()?,
        (LogFormat::Pretty, false) => Registry::default()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(config.thread_ids)
                    .with_line_number(config.line_numbers)
                    .with_ansi(config.ansi)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()?,
        (LogFormat::Pretty, true) => Registry::default()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(config.thread_ids)
                    .with_line_number(config.line_numbers)
                    .with_ansi(config.ansi)
                    .with_test_writer(),
            )
            .try_init()?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: LoggingConfig = serde_json::from_str(r#"{"format": "json"}"#).unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.filter, "info");
        assert!(!config.test_writer);
    }

    #[test]
    fn test_presets() {
        let production = LoggingConfig::production();
        assert_eq!(production.format, LogFormat::Json);
        assert!(!production.ansi);

        let tests = LoggingConfig::for_tests().with_filter("container=trace");
        assert!(tests.test_writer);
        assert_eq!(tests.filter, "container=trace");
    }

    #[test]
    fn test_second_init_fails() {
        // Whichever call wins the race, the other must report an error.
        let first = init_structured_logging(LoggingConfig::for_tests());
        let second = init_structured_logging(LoggingConfig::for_tests());
        assert!(first.is_err() || second.is_err());
    }
}
