//! File-backed mapped arenas
//!
//! A [`MappedArena`] is an unlinked temporary file created inside the pool
//! directory, sized to the pool capacity and mapped read/write. Requests are
//! served by bumping a cursor through the mapping; individual frees are not
//! supported and the whole arena is released at once.
//!
//! ## Invariants
//!
//! - Allocated ranges never overlap and never leave `[0, len)`
//! - The cursor only moves forward
//! - Block sizes and alignment are dictated by the [`AllocPolicy`]

use core::ptr::NonNull;
use std::fs::File;
use std::io;
use std::path::Path;

use memmap2::MmapMut;

use crate::utils::{align_down, align_up, checked_align_up};

/// Smallest arena that can be mapped
pub const MIN_ARENA_SIZE: usize = PAGE_SIZE;

/// Granularity of the large size classes
pub const PAGE_SIZE: usize = 4096;

/// Smallest size class of [`AllocPolicy::SizeClasses`]
pub const MIN_SIZE_CLASS: usize = 8;

/// How requests are rounded into blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocPolicy {
    /// Round every request up to `align`, blocks aligned to `align`
    Aligned { align: usize },
    /// Powers of two from 8 bytes to one page, then whole pages
    SizeClasses,
}

impl AllocPolicy {
    /// Policy of the byte-addressable arena: 16-byte granules
    pub const fn granular() -> Self {
        Self::Aligned { align: 16 }
    }

    /// Alignment of every block start
    #[inline(always)]
    pub const fn alignment(self) -> usize {
        match self {
            Self::Aligned { align } => align,
            Self::SizeClasses => MIN_SIZE_CLASS,
        }
    }

    /// Block size used for a request of `size` bytes
    ///
    /// Returns `None` when rounding overflows.
    #[inline(always)]
    pub fn block_size(self, size: usize) -> Option<usize> {
        match self {
            Self::Aligned { align } => checked_align_up(size.max(1), align),
            Self::SizeClasses if size <= MIN_SIZE_CLASS => Some(MIN_SIZE_CLASS),
            Self::SizeClasses if size <= PAGE_SIZE => Some(size.next_power_of_two()),
            Self::SizeClasses => checked_align_up(size, PAGE_SIZE),
        }
    }

    /// Largest request whose block fits in `len` bytes
    pub fn max_request(self, len: usize) -> usize {
        match self {
            Self::Aligned { align } => align_down(len, align),
            Self::SizeClasses if len >= PAGE_SIZE => align_down(len, PAGE_SIZE),
            Self::SizeClasses if len >= MIN_SIZE_CLASS => 1 << len.ilog2(),
            Self::SizeClasses => 0,
        }
    }
}

/// Bump arena over a mapped temporary file
#[derive(Debug)]
pub struct MappedArena {
    map: MmapMut,
    file: File,
    cursor: usize,
    policy: AllocPolicy,
}

impl MappedArena {
    /// Creates an arena of `size` bytes backed by a file inside `dir`
    ///
    /// The file is unlinked on creation, so nothing is left in `dir` once the
    /// arena is released or the process exits.
    pub fn create_in(dir: &Path, size: usize, policy: AllocPolicy) -> io::Result<Self> {
        if size < MIN_ARENA_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("arena size {size} is below the minimum of {MIN_ARENA_SIZE} bytes"),
            ));
        }

        let file = tempfile::tempfile_in(dir)?;
        file.set_len(size as u64)?;

        // SAFETY: the file is private to this arena (unlinked, never shared),
        // so no other mapping or process can truncate it underneath us.
        let map = unsafe { MmapMut::map_mut(&file)? };

        Ok(Self {
            map,
            file,
            cursor: 0,
            policy,
        })
    }

    /// Carves a region of `size` bytes from the arena
    ///
    /// Returns `None` once the arena cannot hold the rounded block.
    #[inline]
    pub fn alloc(&mut self, size: usize) -> Option<NonNull<[u8]>> {
        let block = self.policy.block_size(size)?;
        let start = checked_align_up(self.cursor, self.policy.alignment())?;
        let end = start.checked_add(block)?;
        if end > self.map.len() {
            return None;
        }
        self.cursor = end;

        // SAFETY: start + block <= len, so the offset stays inside the mapping.
        let ptr = unsafe { self.map.as_mut_ptr().add(start) };
        NonNull::new(ptr).map(|ptr| NonNull::slice_from_raw_parts(ptr, size))
    }

    /// Mapped length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Bytes consumed so far, including rounding
    #[inline]
    pub fn used(&self) -> usize {
        self.cursor
    }

    /// Largest request that would still succeed
    pub fn available(&self) -> usize {
        let start = align_up(self.cursor, self.policy.alignment()).min(self.len());
        self.policy.max_request(self.len() - start)
    }

    /// Largest request a fresh arena of this size can satisfy
    pub fn capacity(&self) -> usize {
        self.policy.max_request(self.len())
    }

    pub fn policy(&self) -> AllocPolicy {
        self.policy
    }

    /// Unmaps the arena and gives the file's blocks back to the filesystem
    pub fn release(self) -> io::Result<()> {
        let Self { map, file, .. } = self;
        drop(map);
        file.set_len(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_classes() {
        let p = AllocPolicy::SizeClasses;
        assert_eq!(p.block_size(0), Some(8));
        assert_eq!(p.block_size(9), Some(16));
        assert_eq!(p.block_size(4096), Some(4096));
        assert_eq!(p.block_size(4097), Some(8192));
        assert_eq!(p.block_size(usize::MAX), None);
    }

    #[test]
    fn test_max_request_fits_block() {
        for policy in [AllocPolicy::granular(), AllocPolicy::SizeClasses] {
            for len in [4096, 5000, 8191, 1 << 20] {
                let max = policy.max_request(len);
                assert!(policy.block_size(max).unwrap() <= len);
                assert!(policy.block_size(max + 1).unwrap() > len);
            }
        }
    }

    #[test]
    fn test_arena_rejects_tiny_size() {
        let dir = tempfile::tempdir().unwrap();
        let err = MappedArena::create_in(dir.path(), 100, AllocPolicy::granular()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_arena_leaves_no_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let arena = MappedArena::create_in(dir.path(), 8192, AllocPolicy::granular()).unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        arena.release().unwrap();
    }

    #[test]
    fn test_arena_exhaustion() {
        let dir = tempfile::tempdir().unwrap();
        let mut arena = MappedArena::create_in(dir.path(), 4096, AllocPolicy::granular()).unwrap();
        assert_eq!(arena.capacity(), 4096);

        for _ in 0..64 {
            arena.alloc(64).unwrap();
        }
        assert_eq!(arena.available(), 0);
        assert!(arena.alloc(1).is_none());
        assert_eq!(arena.used(), 4096);
    }

    #[test]
    fn test_regions_are_disjoint_and_writable() {
        let dir = tempfile::tempdir().unwrap();
        let mut arena = MappedArena::create_in(dir.path(), 8192, AllocPolicy::SizeClasses).unwrap();

        let a = arena.alloc(24).unwrap();
        let b = arena.alloc(24).unwrap();
        let (a_start, b_start) = (a.cast::<u8>().as_ptr() as usize, b.cast::<u8>().as_ptr() as usize);
        assert!(b_start >= a_start + 32);

        // SAFETY: both regions are live and 24 bytes long.
        unsafe {
            core::ptr::write_bytes(a.cast::<u8>().as_ptr(), 0xAA, 24);
            core::ptr::write_bytes(b.cast::<u8>().as_ptr(), 0xBB, 24);
            assert_eq!(*a.cast::<u8>().as_ptr().add(23), 0xAA);
        }
    }
}
