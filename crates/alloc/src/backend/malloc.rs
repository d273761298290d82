//! libc `malloc` backends
//!
//! [`MallocBackend`] is the general-purpose heap allocator. [`VmmallocBackend`]
//! is the pmem-aware deployment of the same call: the heap is redirected
//! into the pool directory outside the process (libvmmalloc is preloaded with
//! `VMMALLOC_POOL_DIR`), so the only thing this side can do is verify that the
//! directory is usable before the run starts.

use core::ptr::NonNull;

use tracing::debug;

use super::{Backend, BackendKind, empty_region};
use crate::config::PoolConfig;
use crate::error::{BenchError, BenchResult};

#[inline(always)]
fn malloc_region(backend: &'static str, size: usize) -> BenchResult<NonNull<[u8]>> {
    // SAFETY: malloc accepts any size and reports failure with a null return.
    let ptr = unsafe { libc::malloc(size) };

    match NonNull::new(ptr.cast::<u8>()) {
        Some(ptr) => Ok(NonNull::slice_from_raw_parts(ptr, size)),
        // malloc(0) may legitimately return null
        None if size == 0 => Ok(empty_region()),
        None => Err(BenchError::out_of_memory(backend, size)),
    }
}

/// # Safety
///
/// `region` must come from [`malloc_region`] and not be used again.
pub(crate) unsafe fn release(region: NonNull<[u8]>) {
    let ptr = region.cast::<u8>();
    if ptr == empty_region().cast::<u8>() {
        return;
    }
    // SAFETY: the caller guarantees `ptr` was returned by malloc.
    unsafe { libc::free(ptr.as_ptr().cast()) };
}

/// Backend calling libc `malloc`
#[derive(Debug, Clone, Copy, Default)]
pub struct MallocBackend;

impl MallocBackend {
    #[inline]
    pub const fn new() -> Self {
        Self
    }
}

impl Backend for MallocBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Malloc
    }

    fn init_pool(&mut self) -> BenchResult<()> {
        Ok(())
    }

    #[inline]
    fn alloc(&mut self, size: usize) -> BenchResult<NonNull<[u8]>> {
        malloc_region(self.name(), size)
    }

    fn destroy_pool(&mut self) -> BenchResult<()> {
        Ok(())
    }
}

/// Backend calling libc `malloc` with the heap placed in the pool directory
#[derive(Debug, Clone)]
pub struct VmmallocBackend {
    config: PoolConfig,
}

impl VmmallocBackend {
    pub fn new(config: PoolConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

impl Backend for VmmallocBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Vmmalloc
    }

    fn init_pool(&mut self) -> BenchResult<()> {
        let dir = self.config.directory();
        let meta = std::fs::metadata(dir).map_err(|e| BenchError::setup_io(self.name(), "create", e))?;
        if !meta.is_dir() {
            return Err(BenchError::setup(
                self.name(),
                "create",
                format!("{} is not a directory", dir.display()),
            ));
        }
        if meta.permissions().readonly() {
            return Err(BenchError::setup(
                self.name(),
                "create",
                format!("{} is read-only", dir.display()),
            ));
        }

        debug!(backend = self.name(), dir = %dir.display(), "heap directory verified");
        Ok(())
    }

    #[inline]
    fn alloc(&mut self, size: usize) -> BenchResult<NonNull<[u8]>> {
        malloc_region(self.name(), size)
    }

    fn destroy_pool(&mut self) -> BenchResult<()> {
        Ok(())
    }
}
