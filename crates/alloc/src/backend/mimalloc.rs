//! mimalloc backend
//!
//! A heap allocator built for multi-threaded workloads, called directly
//! through its `GlobalAlloc` implementation so the harness allocator stays
//! independent of whatever the host binary installs as `#[global_allocator]`.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::NonNull;

use ::mimalloc::MiMalloc;

use super::{Backend, BackendKind, HEAP_ALIGN, empty_region};
use crate::error::{BenchError, BenchResult};

/// Backend wrapping mimalloc
#[derive(Debug, Clone, Copy, Default)]
pub struct MiMallocBackend;

impl MiMallocBackend {
    #[inline]
    pub const fn new() -> Self {
        Self
    }
}

impl Backend for MiMallocBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::MiMalloc
    }

    fn init_pool(&mut self) -> BenchResult<()> {
        Ok(())
    }

    #[inline]
    fn alloc(&mut self, size: usize) -> BenchResult<NonNull<[u8]>> {
        if size == 0 {
            return Ok(empty_region());
        }

        let layout = Layout::from_size_align(size, HEAP_ALIGN)
            .map_err(|_| BenchError::out_of_memory(self.name(), size))?;

        // SAFETY: non-zero size, valid alignment; MiMalloc returns null on failure.
        let ptr = unsafe { MiMalloc.alloc(layout) };

        NonNull::new(ptr)
            .map(|ptr| NonNull::slice_from_raw_parts(ptr, size))
            .ok_or_else(|| BenchError::out_of_memory(self.name(), size))
    }

    fn destroy_pool(&mut self) -> BenchResult<()> {
        Ok(())
    }
}

/// # Safety
///
/// `region` must come from [`MiMallocBackend::alloc`] and not be used again.
pub(crate) unsafe fn release(region: NonNull<[u8]>) {
    if region.len() == 0 {
        return;
    }
    // SAFETY: the caller guarantees `region` was allocated above with this
    // size and alignment.
    unsafe {
        let layout = Layout::from_size_align_unchecked(region.len(), HEAP_ALIGN);
        MiMalloc.dealloc(region.cast::<u8>().as_ptr(), layout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_allocation() {
        let mut backend = MiMallocBackend::new();
        backend.init_pool().unwrap();
        let region = backend.alloc(4096).unwrap();
        assert_eq!(region.len(), 4096);
        assert_eq!(region.cast::<u8>().as_ptr() as usize % HEAP_ALIGN, 0);
        backend.destroy_pool().unwrap();
    }

    #[test]
    fn test_unsatisfiable_request() {
        let mut backend = MiMallocBackend::new();
        assert!(backend.alloc(usize::MAX).unwrap_err().is_out_of_memory());
    }
}
