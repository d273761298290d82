//! Standalone error types for pmbench-alloc
//!
//! Every lifecycle operation reports failures through [`BenchError`]. The
//! variants follow the three lifecycle stages (setup, allocation, teardown)
//! plus the guard and configuration failures raised around them.

use std::io;

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::interface::LifecycleState;

/// Result type for harness operations
pub type BenchResult<T> = Result<T, BenchError>;

// ============================================================================
// Main Error Type
// ============================================================================

/// Allocation harness errors
#[must_use = "errors should be handled"]
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BenchError {
    /// `init_pool` could not establish a usable pool
    #[error("{backend}: pool setup failed in `{primitive}`: {reason}")]
    Setup {
        backend: &'static str,
        primitive: &'static str,
        reason: String,
        #[source]
        source: Option<io::Error>,
    },

    /// `alloc` could not satisfy the request from the current arena
    #[error("{backend}: out of memory allocating {requested} bytes{}", .available.map(|a| format!(" ({a} available)")).unwrap_or_default())]
    OutOfMemory {
        backend: &'static str,
        requested: usize,
        available: Option<usize>,
        #[source]
        source: Option<io::Error>,
    },

    /// `destroy_pool` could not fully release the pool
    #[error("{backend}: pool teardown failed in `{primitive}`: {reason}")]
    Teardown {
        backend: &'static str,
        primitive: &'static str,
        reason: String,
        #[source]
        source: Option<io::Error>,
    },

    /// The backend has no implementation for this operation
    #[error("{backend}: `{operation}` is not implemented")]
    NotImplemented {
        backend: &'static str,
        operation: &'static str,
    },

    /// A lifecycle operation was called out of order
    #[error("{backend}: `{operation}` called while the pool is {state}")]
    InvalidState {
        backend: &'static str,
        operation: &'static str,
        state: LifecycleState,
    },

    /// Configuration could not be used
    #[error("invalid configuration: {reason}")]
    Config { reason: String },
}

impl BenchError {
    /// Get error code for categorization
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Setup { .. } => "BENCH:SETUP",
            Self::OutOfMemory { .. } => "BENCH:ALLOC:OOM",
            Self::Teardown { .. } => "BENCH:TEARDOWN",
            Self::NotImplemented { .. } => "BENCH:UNIMPLEMENTED",
            Self::InvalidState { .. } => "BENCH:STATE",
            Self::Config { .. } => "BENCH:CONFIG",
        }
    }

    /// Name of the backend that raised the error, if any
    #[must_use]
    pub fn backend(&self) -> Option<&'static str> {
        match self {
            Self::Setup { backend, .. }
            | Self::OutOfMemory { backend, .. }
            | Self::Teardown { backend, .. }
            | Self::NotImplemented { backend, .. }
            | Self::InvalidState { backend, .. } => Some(*backend),
            Self::Config { .. } => None,
        }
    }

    /// Name of the failing primitive for setup and teardown errors
    #[must_use]
    pub fn primitive(&self) -> Option<&'static str> {
        match self {
            Self::Setup { primitive, .. } | Self::Teardown { primitive, .. } => Some(*primitive),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_setup(&self) -> bool {
        matches!(self, Self::Setup { .. })
    }

    #[must_use]
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, Self::OutOfMemory { .. })
    }

    #[must_use]
    pub fn is_teardown(&self) -> bool {
        matches!(self, Self::Teardown { .. })
    }

    #[must_use]
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, Self::NotImplemented { .. })
    }

    #[must_use]
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState { .. })
    }

    // ============================================================================
    // Convenience Constructors
    // ============================================================================

    /// Create setup error
    pub fn setup(backend: &'static str, primitive: &'static str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        error!(backend, primitive, %reason, "pool setup failed");

        Self::Setup {
            backend,
            primitive,
            reason,
            source: None,
        }
    }

    /// Create setup error from an I/O failure
    pub fn setup_io(backend: &'static str, primitive: &'static str, source: io::Error) -> Self {
        error!(backend, primitive, error = %source, "pool setup failed");

        Self::Setup {
            backend,
            primitive,
            reason: source.to_string(),
            source: Some(source),
        }
    }

    /// Create out of memory error
    pub fn out_of_memory(backend: &'static str, requested: usize) -> Self {
        debug!(backend, requested, "allocation failed");

        Self::OutOfMemory {
            backend,
            requested,
            available: None,
            source: None,
        }
    }

    /// Create out of memory error for an allocation aborted by an I/O failure
    pub fn out_of_memory_io(backend: &'static str, requested: usize, source: io::Error) -> Self {
        error!(backend, requested, error = %source, "allocation aborted");

        Self::OutOfMemory {
            backend,
            requested,
            available: None,
            source: Some(source),
        }
    }

    /// Create arena exhausted error
    pub fn exhausted(backend: &'static str, requested: usize, available: usize) -> Self {
        debug!(backend, requested, available, "arena exhausted");

        Self::OutOfMemory {
            backend,
            requested,
            available: Some(available),
            source: None,
        }
    }

    /// Create teardown error
    pub fn teardown(backend: &'static str, primitive: &'static str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        error!(backend, primitive, %reason, "pool teardown failed");

        Self::Teardown {
            backend,
            primitive,
            reason,
            source: None,
        }
    }

    /// Create teardown error from an I/O failure
    pub fn teardown_io(backend: &'static str, primitive: &'static str, source: io::Error) -> Self {
        error!(backend, primitive, error = %source, "pool teardown failed");

        Self::Teardown {
            backend,
            primitive,
            reason: source.to_string(),
            source: Some(source),
        }
    }

    /// Create not implemented error
    pub fn not_implemented(backend: &'static str, operation: &'static str) -> Self {
        Self::NotImplemented { backend, operation }
    }

    /// Create lifecycle violation error
    pub fn invalid_state(
        backend: &'static str,
        operation: &'static str,
        state: LifecycleState,
    ) -> Self {
        warn!(backend, operation, %state, "lifecycle violation");

        Self::InvalidState {
            backend,
            operation,
            state,
        }
    }

    /// Create invalid config error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }
}
