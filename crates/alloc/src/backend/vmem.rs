//! Byte-addressable persistent-memory arena backend
//!
//! `init_pool` maps a fresh arena of the configured size inside the pool
//! directory; `destroy_pool` unmaps it. The backing file is unlinked from the
//! start, so a crashed run leaves nothing behind.

use core::ptr::NonNull;

use tracing::debug;

use super::{Backend, BackendKind};
use crate::arena::{AllocPolicy, MappedArena};
use crate::config::PoolConfig;
use crate::error::{BenchError, BenchResult};
use crate::interface::LifecycleState;

/// Backend over a [`MappedArena`] with 16-byte granules
#[derive(Debug)]
pub struct VmemBackend {
    config: PoolConfig,
    arena: Option<MappedArena>,
}

impl VmemBackend {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            arena: None,
        }
    }

    /// The live arena, if the pool is open
    pub fn arena(&self) -> Option<&MappedArena> {
        self.arena.as_ref()
    }
}

impl Backend for VmemBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Vmem
    }

    fn init_pool(&mut self) -> BenchResult<()> {
        if self.arena.is_some() {
            return Err(BenchError::setup(self.name(), "create", "pool is already open"));
        }

        let arena = MappedArena::create_in(
            self.config.directory(),
            self.config.size,
            AllocPolicy::granular(),
        )
        .map_err(|e| BenchError::setup_io(self.name(), "create", e))?;

        debug!(
            backend = self.name(),
            dir = %self.config.directory().display(),
            size = arena.len(),
            "arena mapped"
        );
        self.arena = Some(arena);
        Ok(())
    }

    #[inline]
    fn alloc(&mut self, size: usize) -> BenchResult<NonNull<[u8]>> {
        let backend = self.name();
        let arena = self
            .arena
            .as_mut()
            .ok_or_else(|| BenchError::invalid_state(backend, "alloc", LifecycleState::Closed))?;

        arena
            .alloc(size)
            .ok_or_else(|| BenchError::exhausted(backend, size, arena.available()))
    }

    fn destroy_pool(&mut self) -> BenchResult<()> {
        let arena = self
            .arena
            .take()
            .ok_or_else(|| BenchError::teardown(self.name(), "delete", "pool is not open"))?;

        arena
            .release()
            .map_err(|e| BenchError::teardown_io(self.name(), "delete", e))?;

        debug!(backend = self.name(), "arena released");
        Ok(())
    }

    fn capacity(&self) -> Option<usize> {
        Some(AllocPolicy::granular().max_request(self.config.size))
    }
}
