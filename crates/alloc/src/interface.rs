//! Lifecycle guard around a backend
//!
//! [`Interface`] enforces the `init_pool → alloc* → destroy_pool` ordering
//! that raw backends leave to their caller. Out-of-order calls fail with
//! [`BenchError::InvalidState`] without reaching the backend.

use core::fmt;
use core::ptr::NonNull;

use tracing::{debug, warn};

use crate::backend::{AnyBackend, Backend, BackendKind};
use crate::config::BenchConfig;
use crate::error::{BenchError, BenchResult};

/// Where an [`Interface`] is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// No pool yet, or `init_pool` failed
    Closed,
    /// Pool established; allocations allowed
    Open,
    /// `destroy_pool` has run; the interface is spent
    Destroyed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::Destroyed => "destroyed",
        })
    }
}

/// The selected backend plus its lifecycle state
///
/// # Examples
///
/// ```
/// use pmbench_alloc::{BackendKind, BenchConfig, Interface};
///
/// let config = BenchConfig { backend: BackendKind::Malloc, ..Default::default() };
/// let mut interface = Interface::from_config(&config).unwrap();
///
/// interface.init_pool().unwrap();
/// let region = interface.alloc(64).unwrap();
/// assert_eq!(region.len(), 64);
/// interface.destroy_pool().unwrap();
/// ```
#[derive(Debug)]
pub struct Interface<B: Backend = AnyBackend> {
    backend: B,
    state: LifecycleState,
}

impl Interface<AnyBackend> {
    /// Builds the backend named by `config`
    pub fn from_config(config: &BenchConfig) -> BenchResult<Self> {
        config.validate()?;
        Ok(Self::new(AnyBackend::new(config.backend, &config.pool)?))
    }
}

impl<B: Backend> Interface<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: LifecycleState::Closed,
        }
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    #[must_use]
    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Largest single request a fresh pool can satisfy, if bounded
    pub fn capacity(&self) -> Option<usize> {
        self.backend.capacity()
    }

    /// Establishes the pool; only valid once, from `Closed`
    pub fn init_pool(&mut self) -> BenchResult<()> {
        self.require(LifecycleState::Closed, "init_pool")?;
        self.backend.init_pool()?;
        self.state = LifecycleState::Open;
        debug!(backend = self.backend.name(), "pool initialised");
        Ok(())
    }

    /// Requests `size` bytes; only valid while `Open`
    #[inline]
    pub fn alloc(&mut self, size: usize) -> BenchResult<NonNull<[u8]>> {
        if self.state != LifecycleState::Open {
            return Err(BenchError::invalid_state(self.backend.name(), "alloc", self.state));
        }
        self.backend.alloc(size)
    }

    /// Releases the pool; only valid while `Open`
    ///
    /// The interface is `Destroyed` afterwards even if teardown failed.
    pub fn destroy_pool(&mut self) -> BenchResult<()> {
        self.require(LifecycleState::Open, "destroy_pool")?;
        self.state = LifecycleState::Destroyed;
        self.backend.destroy_pool()?;
        debug!(backend = self.backend.name(), "pool destroyed");
        Ok(())
    }

    fn require(&self, wanted: LifecycleState, operation: &'static str) -> BenchResult<()> {
        if self.state == wanted {
            Ok(())
        } else {
            Err(BenchError::invalid_state(self.backend.name(), operation, self.state))
        }
    }
}

impl<B: Backend> Drop for Interface<B> {
    fn drop(&mut self) {
        if self.state == LifecycleState::Open {
            warn!(
                backend = self.backend.name(),
                "interface dropped with an open pool; pool files are left in place"
            );
        }
    }
}
