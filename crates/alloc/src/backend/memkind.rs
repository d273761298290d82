//! Kind-based allocator backend with persistent memory as the kind
//!
//! A [`PmemKind`] is a kind descriptor: a mapped arena in the pool directory
//! that hands out jemalloc-style size classes. The backend creates the kind
//! in `init_pool`, allocates from it, and destroys it in `destroy_pool`,
//! reporting a failed destruction as a teardown error.

use core::ptr::NonNull;
use std::io;
use std::path::Path;

use tracing::debug;

use super::{Backend, BackendKind};
use crate::arena::{AllocPolicy, MappedArena};
use crate::config::PoolConfig;
use crate::error::{BenchError, BenchResult};
use crate::interface::LifecycleState;

/// Persistent-memory kind descriptor
#[derive(Debug)]
pub struct PmemKind {
    arena: MappedArena,
}

impl PmemKind {
    /// Creates a kind of at most `max_size` bytes backed by `dir`
    pub fn create_pmem(dir: &Path, max_size: usize) -> io::Result<Self> {
        let arena = MappedArena::create_in(dir, max_size, AllocPolicy::SizeClasses)?;
        Ok(Self { arena })
    }

    /// Allocates `size` bytes rounded to the kind's size class
    #[inline]
    pub fn malloc(&mut self, size: usize) -> Option<NonNull<[u8]>> {
        self.arena.alloc(size)
    }

    /// Largest request that would still succeed
    pub fn available(&self) -> usize {
        self.arena.available()
    }

    /// Bytes consumed by size-class blocks so far
    pub fn used(&self) -> usize {
        self.arena.used()
    }

    /// Destroys the kind, releasing its arena
    pub fn destroy(self) -> io::Result<()> {
        self.arena.release()
    }
}

/// Backend allocating from a [`PmemKind`]
#[derive(Debug)]
pub struct MemkindBackend {
    config: PoolConfig,
    pmem_kind: Option<PmemKind>,
}

impl MemkindBackend {
    pub fn new(config: PoolConfig) -> Self {
        Self { config, pmem_kind: None }
    }

    /// The live kind, if the pool is open
    pub fn pmem_kind(&self) -> Option<&PmemKind> {
        self.pmem_kind.as_ref()
    }
}

impl Backend for MemkindBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Memkind
    }

    fn init_pool(&mut self) -> BenchResult<()> {
        if self.pmem_kind.is_some() {
            return Err(BenchError::setup(self.name(), "create_pmem", "kind already exists"));
        }

        let kind = PmemKind::create_pmem(self.config.directory(), self.config.size)
            .map_err(|e| BenchError::setup_io(self.name(), "create_pmem", e))?;

        debug!(
            backend = self.name(),
            dir = %self.config.directory().display(),
            max_size = self.config.size,
            "pmem kind created"
        );
        self.pmem_kind = Some(kind);
        Ok(())
    }

    #[inline]
    fn alloc(&mut self, size: usize) -> BenchResult<NonNull<[u8]>> {
        let backend = self.name();
        let kind = self
            .pmem_kind
            .as_mut()
            .ok_or_else(|| BenchError::invalid_state(backend, "alloc", LifecycleState::Closed))?;

        kind.malloc(size)
            .ok_or_else(|| BenchError::exhausted(backend, size, kind.available()))
    }

    fn destroy_pool(&mut self) -> BenchResult<()> {
        let kind = self
            .pmem_kind
            .take()
            .ok_or_else(|| BenchError::teardown(self.name(), "destroy_kind", "no kind to destroy"))?;

        kind.destroy()
            .map_err(|e| BenchError::teardown_io(self.name(), "destroy_kind", e))?;

        debug!(backend = self.name(), "pmem kind destroyed");
        Ok(())
    }

    fn capacity(&self) -> Option<usize> {
        Some(AllocPolicy::SizeClasses.max_request(self.config.size))
    }
}
