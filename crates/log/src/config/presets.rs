//! Configuration presets for common scenarios

use super::{Config, DisplayConfig, ENV_LOG, ENV_LOG_FORMAT, Format};
use crate::error::LogResult;

impl Config {
    /// Create configuration from environment variables
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source
    ///
    /// `PMBENCH_LOG` wins over `RUST_LOG`. An unrecognised format falls back
    /// to compact output.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(level) = lookup(ENV_LOG).or_else(|| lookup("RUST_LOG")) {
            config.level = level;
        }

        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            config.format = format.parse().unwrap_or(Format::Compact);
        }

        config
    }

    /// Like [`Config::from_env`], but an unrecognised format is an error
    pub fn try_from_env() -> LogResult<Self> {
        Self::try_from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`Config::from_lookup`], but an unrecognised format is an error
    pub fn try_from_lookup<F>(lookup: F) -> LogResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let format = lookup(ENV_LOG_FORMAT).map(|f| f.parse::<Format>()).transpose()?;
        let mut config = Self::from_lookup(lookup);
        if let Some(format) = format {
            config.format = format;
        }
        Ok(config)
    }

    /// Development configuration (pretty, debug level)
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            format: Format::Pretty,
            display: DisplayConfig {
                colors: true,
                source: true,
                ..DisplayConfig::default()
            },
        }
    }

    /// Production configuration (JSON, info level)
    #[must_use]
    pub fn production() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::Json,
            display: DisplayConfig {
                colors: false,
                source: false,
                flatten: true,
                ..DisplayConfig::default()
            },
        }
    }

    /// Benchmark configuration: warnings only, so measured loops stay quiet
    #[must_use]
    pub fn bench() -> Self {
        Self {
            level: "warn".to_string(),
            format: Format::Compact,
            display: DisplayConfig {
                colors: false,
                time: false,
                ..DisplayConfig::default()
            },
        }
    }
}
