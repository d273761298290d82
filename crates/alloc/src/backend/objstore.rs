//! Object-store backends over a named pool file
//!
//! Both variants keep one [`ObjectPool`] at `<directory>/<backend name>`,
//! with the file name doubling as the layout tag. `init_pool` creates the
//! file if it is missing, verifies it, and opens it; `destroy_pool` closes
//! the pool and removes the file.
//!
//! The low-level variant stops there: it never learned to carve objects out
//! of the pool, and every allocation reports [`BenchError::NotImplemented`].

use core::ptr::NonNull;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{Backend, BackendKind};
use crate::config::PoolConfig;
use crate::error::{BenchError, BenchResult};
use crate::interface::LifecycleState;
use crate::pool::{ObjectPool, PoolError, is_open};

/// Type tag stamped on objects allocated as raw byte arrays
pub const BYTES_TYPE_TAG: u32 = 1;

fn setup_error(backend: &'static str, primitive: &'static str, err: PoolError) -> BenchError {
    match err {
        PoolError::Io(source) => BenchError::setup_io(backend, primitive, source),
        other => BenchError::setup(backend, primitive, other.to_string()),
    }
}

fn teardown_error(backend: &'static str, primitive: &'static str, err: PoolError) -> BenchError {
    match err {
        PoolError::Io(source) => BenchError::teardown_io(backend, primitive, source),
        other => BenchError::teardown(backend, primitive, other.to_string()),
    }
}

/// A pool file and, between init and destroy, its open handle
#[derive(Debug)]
struct PoolSlot {
    path: PathBuf,
    layout: &'static str,
    size: usize,
    pool: Option<ObjectPool>,
}

impl PoolSlot {
    fn new(name: &'static str, config: &PoolConfig) -> Self {
        Self {
            path: config.pool_path(name),
            layout: name,
            size: config.size,
            pool: None,
        }
    }

    fn init(&mut self, backend: &'static str) -> BenchResult<()> {
        if self.pool.is_some() || is_open(&self.path) {
            return Err(BenchError::setup(backend, "open", "pool is already open"));
        }

        let exists = self
            .path
            .try_exists()
            .map_err(|e| BenchError::setup_io(backend, "create", e))?;
        let created = if exists {
            false
        } else {
            match ObjectPool::create(&self.path, self.layout, self.size) {
                Ok(pool) => {
                    pool.close().map_err(|e| setup_error(backend, "create", e))?;
                    true
                }
                Err(PoolError::AlreadyExists { .. }) => false,
                Err(e) => return Err(setup_error(backend, "create", e)),
            }
        };
        if !created {
            debug!(backend, path = %self.path.display(), "reusing existing pool file");
        }

        match ObjectPool::check(&self.path, self.layout) {
            Ok(true) => {}
            Ok(false) => {
                return Err(BenchError::setup(
                    backend,
                    "check",
                    format!("{} failed its consistency check", self.path.display()),
                ));
            }
            Err(e) => return Err(setup_error(backend, "check", e)),
        }

        let pool = ObjectPool::open(&self.path, self.layout).map_err(|e| setup_error(backend, "open", e))?;
        self.pool = Some(pool);
        Ok(())
    }

    fn open_pool(&mut self, backend: &'static str) -> BenchResult<&mut ObjectPool> {
        self.pool
            .as_mut()
            .ok_or_else(|| BenchError::invalid_state(backend, "alloc", LifecycleState::Closed))
    }

    fn destroy(&mut self, backend: &'static str) -> BenchResult<()> {
        let pool = self
            .pool
            .take()
            .ok_or_else(|| BenchError::teardown(backend, "close", "pool is not open"))?;
        pool.close().map_err(|e| teardown_error(backend, "close", e))?;

        fs::remove_file(&self.path).map_err(|e| BenchError::teardown_io(backend, "remove", e))?;
        debug!(backend, path = %self.path.display(), "pool file removed");
        Ok(())
    }
}

/// Low-level object store; allocation is not implemented
#[derive(Debug)]
pub struct ObjAllocBackend {
    slot: PoolSlot,
}

impl ObjAllocBackend {
    pub fn new(config: &PoolConfig) -> Self {
        Self {
            slot: PoolSlot::new(BackendKind::PmemobjAlloc.name(), config),
        }
    }

    /// The open pool, between `init_pool` and `destroy_pool`
    pub fn pool(&self) -> Option<&ObjectPool> {
        self.slot.pool.as_ref()
    }

    /// Location of the pool file
    pub fn path(&self) -> &Path {
        &self.slot.path
    }
}

impl Backend for ObjAllocBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::PmemobjAlloc
    }

    fn init_pool(&mut self) -> BenchResult<()> {
        self.slot.init(self.name())
    }

    fn alloc(&mut self, _size: usize) -> BenchResult<NonNull<[u8]>> {
        Err(BenchError::not_implemented(self.name(), "alloc"))
    }

    fn destroy_pool(&mut self) -> BenchResult<()> {
        self.slot.destroy(self.name())
    }

    fn capacity(&self) -> Option<usize> {
        Some(ObjectPool::capacity_for(self.slot.size))
    }
}

/// Object store with crash-atomic allocation
#[derive(Debug)]
pub struct PersistentAtomicBackend {
    slot: PoolSlot,
}

impl PersistentAtomicBackend {
    pub fn new(config: &PoolConfig) -> Self {
        Self {
            slot: PoolSlot::new(BackendKind::MakePersistentAtomic.name(), config),
        }
    }

    /// The open pool, between `init_pool` and `destroy_pool`
    pub fn pool(&self) -> Option<&ObjectPool> {
        self.slot.pool.as_ref()
    }

    /// Location of the pool file
    pub fn path(&self) -> &Path {
        &self.slot.path
    }
}

impl Backend for PersistentAtomicBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::MakePersistentAtomic
    }

    fn init_pool(&mut self) -> BenchResult<()> {
        self.slot.init(self.name())
    }

    #[inline]
    fn alloc(&mut self, size: usize) -> BenchResult<NonNull<[u8]>> {
        let backend = self.name();
        let pool = self.slot.open_pool(backend)?;

        pool.alloc_atomic(size, BYTES_TYPE_TAG).map_err(|e| match e {
            PoolError::Exhausted {
                requested,
                available,
            } => BenchError::exhausted(backend, requested, available),
            PoolError::Io(source) => BenchError::out_of_memory_io(backend, size, source),
            other => {
                debug!(backend, error = %other, "atomic allocation aborted");
                BenchError::out_of_memory(backend, size)
            }
        })
    }

    fn destroy_pool(&mut self) -> BenchResult<()> {
        self.slot.destroy(self.name())
    }

    fn capacity(&self) -> Option<usize> {
        Some(ObjectPool::capacity_for(self.slot.size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_path_is_named_after_backend() {
        let config = PoolConfig::new("/mnt/pmem", 1 << 20);
        assert_eq!(
            ObjAllocBackend::new(&config).path(),
            Path::new("/mnt/pmem/pmemobj_alloc")
        );
        assert_eq!(
            PersistentAtomicBackend::new(&config).path(),
            Path::new("/mnt/pmem/make_persistent_atomic")
        );
    }

    #[test]
    fn test_alloc_before_init_is_lifecycle_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = PersistentAtomicBackend::new(&PoolConfig::new(dir.path(), 1 << 16));
        assert!(backend.alloc(8).unwrap_err().is_invalid_state());
    }

    #[test]
    fn test_missing_directory_fails_create() {
        let mut backend = PersistentAtomicBackend::new(&PoolConfig::new("/definitely/not/here", 1 << 16));
        let err = backend.init_pool().unwrap_err();
        assert_eq!(err.primitive(), Some("create"));
    }

    #[test]
    fn test_destroy_without_init() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = ObjAllocBackend::new(&PoolConfig::new(dir.path(), 1 << 16));
        let err = backend.destroy_pool().unwrap_err();
        assert!(err.is_teardown());
        assert_eq!(err.primitive(), Some("close"));
    }
}
