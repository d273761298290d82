//! Logging setup errors

use thiserror::Error;
use tracing_subscriber::util::TryInitError;

/// Result type for logger setup
pub type LogResult<T> = Result<T, LogError>;

/// Failures while configuring or installing the subscriber
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LogError {
    /// Filter directives could not be parsed
    #[error("invalid filter '{filter}': {reason}")]
    Filter { filter: String, reason: String },

    /// Unknown output format name
    #[error("unknown log format '{value}' (expected compact, pretty or json)")]
    Format { value: String },

    /// A global subscriber is already installed
    #[error("failed to install subscriber: {0}")]
    Init(#[from] TryInitError),
}

impl LogError {
    /// Get error code for categorization
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Filter { .. } => "LOG:FILTER",
            Self::Format { .. } => "LOG:FORMAT",
            Self::Init(_) => "LOG:INIT",
        }
    }
}
