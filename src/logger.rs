use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::Level;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerConfig {
    pub level: String,
}

impl LoggerConfig {
    /// Reads LOG_LEVEL, defaulting to `info`.
    pub fn from_env() -> Self {
        let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        Self { level }
    }

    pub fn with_level(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
        }
    }

    /// Unknown level names fall back to `info`.
    pub fn max_level(&self) -> Level {
        Level::from_str(&self.level).unwrap_or(Level::INFO)
    }

    /// Installs the global subscriber. A second call is a no-op.
    pub fn init(&self) {
        // stdout is reserved for the configuration and summary
        let _ = tracing_subscriber::fmt()
            .with_max_level(self.max_level())
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
        tracing::debug!(level = %self.max_level(), "logging to stderr");
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self::with_level("info")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn level_names_parse_case_insensitively() {
        assert_eq!(LoggerConfig::with_level("DEBUG").max_level(), Level::DEBUG);
        assert_eq!(LoggerConfig::with_level("warn").max_level(), Level::WARN);
    }

    #[test]
    fn unknown_level_falls_back_to_info() {
        assert_eq!(LoggerConfig::with_level("chatty").max_level(), Level::INFO);
        assert_eq!(LoggerConfig::default().max_level(), Level::INFO);
    }
}
