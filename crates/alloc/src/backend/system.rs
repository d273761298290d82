//! Rust global allocator backend
//!
//! The in-process default: every request goes to `std::alloc::alloc`, the
//! same path `Box` and `Vec` use. The process heap is the arena, so the pool
//! operations are no-ops.

use core::alloc::Layout;
use core::ptr::NonNull;

use super::{Backend, BackendKind, HEAP_ALIGN, empty_region};
use crate::error::{BenchError, BenchResult};

/// Backend wrapping the Rust global allocator
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBackend;

impl DefaultBackend {
    /// Creates a new DefaultBackend
    ///
    /// This is a zero-cost operation as the backend contains no state.
    #[inline]
    pub const fn new() -> Self {
        Self
    }
}

impl Backend for DefaultBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Default
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

        // SAFETY: layout has a non-zero size (checked above) and a valid
        // power-of-two alignment (Layout::from_size_align succeeded).
        let ptr = unsafe { std::alloc::alloc(layout) };

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
/// `region` must come from [`DefaultBackend::alloc`] and not be used again.
pub(crate) unsafe fn release(region: NonNull<[u8]>) {
    if region.len() == 0 {
        return;
    }
    // SAFETY: the caller guarantees `region` was allocated above, where the
    // same size and alignment formed a valid layout.
    unsafe {
        let layout = Layout::from_size_align_unchecked(region.len(), HEAP_ALIGN);
        std::alloc::dealloc(region.cast::<u8>().as_ptr(), layout);
    }
}
