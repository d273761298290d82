//! Persistent object pool
//!
//! An [`ObjectPool`] is a named pool file holding a checksummed header
//! followed by a heap of objects. Objects are appended at the heap cursor and
//! never freed; the whole file is removed when the pool is destroyed.
//!
//! # Lifecycle
//!
//! ```text
//! create ──► close ──► check ──► open ──► alloc_atomic* ──► close
//! ```
//!
//! [`ObjectPool::check`] verifies that a file on disk is a consistent pool of
//! the expected layout before it is opened. A file is considered consistent
//! when:
//!
//! - its length equals the recorded pool size
//! - magic, version, layout tag and header checksum match
//! - the heap cursor is in bounds and 64-byte aligned
//! - walking the objects from the heap start lands exactly on the cursor,
//!   visiting as many objects as the header records
//!
//! # Crash behaviour
//!
//! [`ObjectPool::alloc_atomic`] persists the object header before it
//! publishes the object by advancing the cursor. A crash in between leaves
//! an unreachable block past the cursor, which the check ignores.

mod error;
mod header;
mod registry;

use core::ptr::NonNull;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapMut};
use tracing::{debug, trace};

pub use error::{PoolError, PoolResult};
pub use header::{
    MAX_LAYOUT_LEN, OBJECT_HEADER_SIZE, ObjectHeader, POOL_HEADER_SIZE, PoolHeader, validate_layout,
};
pub use registry::is_open;

use registry::Registration;

use crate::utils::{align_down, checked_align_up};

/// Every object block is a multiple of this size
pub const MIN_ALLOC_CLASS: usize = 64;

/// Smallest pool that can hold one minimal object
pub const MIN_POOL_SIZE: usize = POOL_HEADER_SIZE + MIN_ALLOC_CLASS;

/// Block consumed by an object of `size` data bytes
#[inline]
fn block_size(size: usize) -> Option<usize> {
    checked_align_up(size.checked_add(OBJECT_HEADER_SIZE)?, MIN_ALLOC_CLASS)
}

/// Largest object that fits in `remaining` heap bytes
#[inline]
fn max_object(remaining: usize) -> usize {
    align_down(remaining, MIN_ALLOC_CLASS).saturating_sub(OBJECT_HEADER_SIZE)
}

/// An open pool file
#[derive(Debug)]
pub struct ObjectPool {
    map: MmapMut,
    file: File,
    header: PoolHeader,
    path: PathBuf,
    _registration: Registration,
}

impl ObjectPool {
    /// Creates a new pool file of `size` bytes tagged with `layout`
    ///
    /// Fails with [`PoolError::AlreadyExists`] if the file is already there.
    /// The file is created with permissions `0o666` (subject to the umask).
    pub fn create(path: impl AsRef<Path>, layout: &str, size: usize) -> PoolResult<Self> {
        let path = path.as_ref();
        validate_layout(layout)?;
        if size < MIN_POOL_SIZE {
            return Err(PoolError::TooSmall {
                size,
                min: MIN_POOL_SIZE,
            });
        }

        let registration = Registration::claim(path)?;

        let mut options = OpenOptions::new();
        options.read(true).write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o666);
        }
        let file = options.open(path).map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => PoolError::AlreadyExists {
                path: path.to_path_buf(),
            },
            _ => PoolError::Io(e),
        })?;

        let header = PoolHeader::new(layout, size as u64);
        let map = match Self::format(&file, &header) {
            Ok(map) => map,
            Err(e) => {
                // A half-written file would fail every later check
                let _ = std::fs::remove_file(path);
                return Err(e.into());
            }
        };

        debug!(path = %path.display(), layout, size, "object pool created");

        Ok(Self {
            map,
            file,
            header,
            path: path.to_path_buf(),
            _registration: registration,
        })
    }

    fn format(file: &File, header: &PoolHeader) -> io::Result<MmapMut> {
        file.set_len(header.pool_size)?;

        // SAFETY: the file was just created exclusively by this process and is
        // registered as open, so no other pool maps or resizes it.
        let mut map = unsafe { MmapMut::map_mut(file)? };
        header.encode(&mut map[..POOL_HEADER_SIZE]);
        map.flush_range(0, POOL_HEADER_SIZE)?;
        Ok(map)
    }

    /// Checks whether the file at `path` is a consistent pool of `layout`
    ///
    /// Inconsistent files yield `Ok(false)`; only failures to read the file
    /// are errors.
    pub fn check(path: impl AsRef<Path>, layout: &str) -> PoolResult<bool> {
        let path = path.as_ref();
        let file = File::open(path)?;

        let verdict = Self::map_readonly(&file).and_then(|map| verify(&map, layout));
        match verdict {
            Ok(header) => {
                trace!(
                    path = %path.display(),
                    objects = header.object_count,
                    "object pool is consistent"
                );
                Ok(true)
            }
            Err(e) if e.is_inconsistent() => {
                debug!(path = %path.display(), error = %e, "object pool failed check");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn map_readonly(file: &File) -> PoolResult<Mmap> {
        let len = file.metadata()?.len();
        if len < POOL_HEADER_SIZE as u64 {
            return Err(PoolError::corrupted(format!("file truncated to {len} bytes")));
        }

        // SAFETY: the mapping is read-only and only lives for the duration
        // of the check.
        let map = unsafe { Mmap::map(file)? };
        Ok(map)
    }

    /// Opens an existing pool of `layout`
    pub fn open(path: impl AsRef<Path>, layout: &str) -> PoolResult<Self> {
        let path = path.as_ref();
        let registration = Registration::claim(path)?;

        let file = OpenOptions::new().read(true).write(true).open(path)?;
        if file.metadata()?.len() < POOL_HEADER_SIZE as u64 {
            return Err(PoolError::corrupted("file is shorter than the pool header"));
        }

        // SAFETY: the path is registered as open, so this process holds the
        // only read/write mapping of the file.
        let map = unsafe { MmapMut::map_mut(&file)? };
        let header = verify(&map, layout)?;

        debug!(
            path = %path.display(),
            layout,
            objects = header.object_count,
            "object pool opened"
        );

        Ok(Self {
            map,
            file,
            header,
            path: path.to_path_buf(),
            _registration: registration,
        })
    }

    /// Allocates an object of `size` bytes tagged with `type_tag`
    ///
    /// The object is persisted before it becomes reachable: its header is
    /// flushed first, then the pool header with the advanced cursor.
    pub fn alloc_atomic(&mut self, size: usize, type_tag: u32) -> PoolResult<NonNull<[u8]>> {
        let exhausted = |pool: &Self| PoolError::Exhausted {
            requested: size,
            available: pool.available(),
        };

        let start = self.header.heap_cursor as usize;
        let block = block_size(size).ok_or_else(|| exhausted(self))?;
        let end = start
            .checked_add(block)
            .filter(|end| *end <= self.map.len())
            .ok_or_else(|| exhausted(self))?;

        let object = ObjectHeader {
            size: size as u64,
            type_tag,
        };
        object.encode(&mut self.map[start..start + OBJECT_HEADER_SIZE]);
        self.map.flush_range(start, OBJECT_HEADER_SIZE)?;

        let mut next = self.header.clone();
        next.heap_cursor = end as u64;
        next.object_count += 1;
        self.commit_header(next, |map| map.flush_range(0, POOL_HEADER_SIZE))?;

        let data = start + OBJECT_HEADER_SIZE;
        Ok(NonNull::from(&mut self.map[data..data + size]))
    }

    /// Writes `next` over the on-disk header and adopts it once `flush` succeeds
    ///
    /// On failure the previous header bytes are restored and `self.header`
    /// is left untouched.
    fn commit_header<F>(&mut self, next: PoolHeader, flush: F) -> io::Result<()>
    where
        F: FnOnce(&MmapMut) -> io::Result<()>,
    {
        next.encode(&mut self.map[..POOL_HEADER_SIZE]);
        if let Err(e) = flush(&self.map) {
            self.header.encode(&mut self.map[..POOL_HEADER_SIZE]);
            return Err(e);
        }
        self.header = next;
        Ok(())
    }

    /// Flushes and closes the pool, leaving the file in place
    pub fn close(self) -> PoolResult<()> {
        self.map.flush()?;
        self.file.sync_all()?;
        debug!(path = %self.path.display(), objects = self.header.object_count, "object pool closed");
        Ok(())
    }

    /// Largest object a freshly created pool of this size can hold
    pub fn capacity(&self) -> usize {
        Self::capacity_for(self.pool_size())
    }

    /// Largest object a freshly created pool of `pool_size` bytes can hold
    pub const fn capacity_for(pool_size: usize) -> usize {
        if pool_size < POOL_HEADER_SIZE {
            return 0;
        }
        let heap = align_down(pool_size - POOL_HEADER_SIZE, MIN_ALLOC_CLASS);
        heap.saturating_sub(OBJECT_HEADER_SIZE)
    }

    /// Largest object that still fits
    pub fn available(&self) -> usize {
        max_object(self.map.len().saturating_sub(self.header.heap_cursor as usize))
    }

    pub fn object_count(&self) -> u64 {
        self.header.object_count
    }

    pub fn pool_size(&self) -> usize {
        self.map.len()
    }

    pub fn layout(&self) -> &str {
        &self.header.layout
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Validates a mapped pool image against `layout`
fn verify(buf: &[u8], layout: &str) -> PoolResult<PoolHeader> {
    let header = PoolHeader::decode(buf)?;

    if header.layout != layout {
        return Err(PoolError::LayoutMismatch {
            expected: layout.to_string(),
            found: header.layout,
        });
    }
    if header.pool_size != buf.len() as u64 {
        return Err(PoolError::corrupted(format!(
            "recorded size {} does not match file length {}",
            header.pool_size,
            buf.len()
        )));
    }
    if header.heap_offset != POOL_HEADER_SIZE as u64 {
        return Err(PoolError::corrupted(format!(
            "unexpected heap offset {}",
            header.heap_offset
        )));
    }

    let cursor = usize::try_from(header.heap_cursor)
        .ok()
        .filter(|c| (POOL_HEADER_SIZE..=buf.len()).contains(c))
        .ok_or_else(|| PoolError::corrupted(format!("heap cursor {} out of bounds", header.heap_cursor)))?;
    if cursor % MIN_ALLOC_CLASS != 0 {
        return Err(PoolError::corrupted(format!("heap cursor {cursor} is misaligned")));
    }

    let mut at = POOL_HEADER_SIZE;
    let mut count = 0u64;
    while at < cursor {
        let object = ObjectHeader::decode(&buf[at..cursor])
            .ok_or_else(|| PoolError::corrupted(format!("no object header at offset {at}")))?;
        let block = usize::try_from(object.size)
            .ok()
            .and_then(block_size)
            .ok_or_else(|| PoolError::corrupted(format!("object at offset {at} is oversized")))?;
        at = at.saturating_add(block);
        count += 1;
    }

    if at != cursor {
        return Err(PoolError::corrupted(format!(
            "object chain ends at {at}, cursor is {cursor}"
        )));
    }
    if count != header.object_count {
        return Err(PoolError::corrupted(format!(
            "found {count} objects, header records {}",
            header.object_count
        )));
    }

    Ok(header)
}
