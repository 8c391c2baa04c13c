//! Log subscriber setup for the doorbell binary

use std::str::FromStr;

use anyhow::{anyhow, Result};
use doorbell_core::LoggingSettings;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose events are logged at the doorbell's own level
const DOORBELL_TARGETS: &[&str] = &["doorbell_core", "doorbell"];

/// Configuration for the logging system
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Level for the doorbell's own modules
    pub level: Level,
    /// Level for every other module
    pub module_level: Level,
    /// Whether to enable JSON formatting
    pub json: bool,
    /// Whether to include file and line information
    pub file_info: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: Level::INFO,
            module_level: Level::ERROR,
            json: false,
            file_info: false,
        }
    }
}

impl LoggingConfig {
    /// Build from the `[logging]` section of the configuration file
    pub fn from_settings(settings: &LoggingSettings) -> Result<Self> {
        Ok(LoggingConfig {
            level: parse_log_level(&settings.level)?,
            module_level: parse_log_level(&settings.module_level)?,
            json: settings.json,
            file_info: settings.file_info,
        })
    }

    /// Enable JSON formatting
    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    /// `EnvFilter` directives for this configuration
    pub fn directives(&self) -> String {
        let level = self.level.as_str().to_lowercase();
        let mut directives = vec![self.module_level.as_str().to_lowercase()];
        directives.extend(
            DOORBELL_TARGETS
                .iter()
                .map(|target| format!("{}={}", target, level)),
        );
        directives.join(",")
    }
}

/// Install the global subscriber
///
/// `RUST_LOG` wins over the configured levels when it is set.
pub fn setup_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.directives()))
        .map_err(|e| anyhow!("invalid log filter: {}", e))?;

    let mut subscriber = fmt::Subscriber::builder().with_env_filter(filter);

    if config.file_info {
        subscriber = subscriber.with_file(true).with_line_number(true);
    }

    let installed = if config.json {
        subscriber.with_writer(std::io::stdout).json().try_init()
    } else {
        subscriber.try_init()
    };
    installed.map_err(|e| anyhow!("failed to install log subscriber: {}", e))
}

/// Parse a log level from a string
pub fn parse_log_level(level: &str) -> Result<Level> {
    Level::from_str(level.trim()).map_err(|_| anyhow!("Invalid log level: {}", level))
}

/// Log a welcome message with version info
pub fn log_welcome(version: &str) {
    tracing::info!("Starting smart doorbell v{}", version);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_split_levels() {
        let config = LoggingConfig::default();
        assert_eq!(config.directives(), "error,doorbell_core=info,doorbell=info");
    }

    #[test]
    fn test_from_settings() {
        let settings = LoggingSettings {
            level: "debug".to_string(),
            module_level: "WARN".to_string(),
            json: true,
            file_info: false,
        };
        let config = LoggingConfig::from_settings(&settings).unwrap();
        assert_eq!(config.level, Level::DEBUG);
        assert_eq!(config.module_level, Level::WARN);
        assert!(config.json);
        assert_eq!(config.directives(), "warn,doorbell_core=debug,doorbell=debug");
    }

    #[test]
    fn test_parse_log_level_rejects_garbage() {
        assert_eq!(parse_log_level(" trace ").unwrap(), Level::TRACE);
        assert!(parse_log_level("loud").is_err());
    }
}
