//! Object pool errors

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for object pool operations
pub type PoolResult<T> = Result<T, PoolError>;

/// Failures of the persistent object pool
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    #[error("pool I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("pool file {} already exists", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("invalid layout tag: {reason}")]
    InvalidLayout { reason: String },

    #[error("pool size {size} is below the minimum of {min} bytes")]
    TooSmall { size: usize, min: usize },

    #[error("pool is corrupted: {reason}")]
    Corrupted { reason: String },

    #[error("layout mismatch: expected {expected:?}, found {found:?}")]
    LayoutMismatch { expected: String, found: String },

    #[error("pool {} is already open in this process", path.display())]
    AlreadyOpen { path: PathBuf },

    #[error("pool exhausted: requested {requested} bytes, {available} available")]
    Exhausted { requested: usize, available: usize },
}

impl PoolError {
    pub(crate) fn corrupted(reason: impl Into<String>) -> Self {
        Self::Corrupted {
            reason: reason.into(),
        }
    }

    /// Whether the pool file failed its consistency check
    #[must_use]
    pub fn is_inconsistent(&self) -> bool {
        matches!(self, Self::Corrupted { .. } | Self::LayoutMismatch { .. })
    }

    /// Get error code for categorization
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "POOL:IO",
            Self::AlreadyExists { .. } => "POOL:EXISTS",
            Self::InvalidLayout { .. } => "POOL:LAYOUT",
            Self::TooSmall { .. } => "POOL:SIZE",
            Self::Corrupted { .. } => "POOL:CORRUPTED",
            Self::LayoutMismatch { .. } => "POOL:LAYOUT_MISMATCH",
            Self::AlreadyOpen { .. } => "POOL:BUSY",
            Self::Exhausted { .. } => "POOL:EXHAUSTED",
        }
    }
}
