//! Allocation backends
//!
//! Every backend implements the same three-step contract:
//! - [`Backend::init_pool`] establishes the arena
//! - [`Backend::alloc`] draws a region from it (the measured hot path)
//! - [`Backend::destroy_pool`] releases it
//!
//! Heap backends treat the process heap as their arena and have no-op pool
//! operations. Persistent backends own a mapped arena or a pool file for the
//! duration of the `init_pool`..`destroy_pool` window.
//!
//! [`AnyBackend`] selects one backend from a [`BackendKind`] and dispatches
//! through a plain `match`, so the measured path carries no vtable call.

use core::fmt;
use core::ptr::NonNull;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::PoolConfig;
use crate::error::{BenchError, BenchResult};

mod malloc;
mod memkind;
#[cfg(feature = "mimalloc")]
mod mimalloc;
mod objstore;
mod system;
mod vmem;

pub use malloc::{MallocBackend, VmmallocBackend};
pub use memkind::{MemkindBackend, PmemKind};
#[cfg(feature = "mimalloc")]
pub use self::mimalloc::MiMallocBackend;
pub use objstore::{ObjAllocBackend, PersistentAtomicBackend};
pub use system::DefaultBackend;
pub use vmem::VmemBackend;

/// Alignment handed out by the heap backends, matching `operator new`
pub const HEAP_ALIGN: usize = 16;

/// Pool lifecycle contract shared by every allocation strategy
///
/// Backends are single-owner: all operations take `&mut self` and no
/// internal locking guards the allocation path. Callers are expected to
/// call `init_pool` once, `alloc` any number of times, then `destroy_pool`
/// once. [`Interface`](crate::Interface) enforces that ordering.
pub trait Backend: Send {
    /// Which variant this is
    fn kind(&self) -> BackendKind;

    /// Stable backend name used in errors and logs
    fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Establishes the pool
    fn init_pool(&mut self) -> BenchResult<()>;

    /// Requests `size` bytes from the current pool
    ///
    /// The returned region has length `size` and stays valid until the pool
    /// is destroyed (heap backends never reclaim it). Zero-sized requests
    /// succeed with a well-aligned, possibly dangling pointer.
    fn alloc(&mut self, size: usize) -> BenchResult<NonNull<[u8]>>;

    /// Releases the pool
    fn destroy_pool(&mut self) -> BenchResult<()>;

    /// Largest single request a freshly initialised pool can satisfy
    ///
    /// `None` for heap backends, whose arena has no fixed bound.
    fn capacity(&self) -> Option<usize> {
        None
    }
}

/// Identifies one allocation strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// The Rust global allocator
    #[default]
    Default,
    /// libc `malloc`
    Malloc,
    /// mimalloc, a heap allocator tuned for multi-threaded workloads
    #[serde(rename = "mimalloc")]
    MiMalloc,
    /// Byte-addressable arena mapped from a file in the pool directory
    Vmem,
    /// libc `malloc` with the heap redirected into the pool directory
    Vmmalloc,
    /// Kind-based allocator with persistent memory as the kind
    Memkind,
    /// Low-level persistent object store with a manual pool layout
    PmemobjAlloc,
    /// Persistent object store with atomic allocation
    MakePersistentAtomic,
}

impl BackendKind {
    /// Every backend, in declaration order
    pub const ALL: [Self; 8] = [
        Self::Default,
        Self::Malloc,
        Self::MiMalloc,
        Self::Vmem,
        Self::Vmmalloc,
        Self::Memkind,
        Self::PmemobjAlloc,
        Self::MakePersistentAtomic,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Malloc => "malloc",
            Self::MiMalloc => "mimalloc",
            Self::Vmem => "vmem",
            Self::Vmmalloc => "vmmalloc",
            Self::Memkind => "memkind",
            Self::PmemobjAlloc => "pmemobj_alloc",
            Self::MakePersistentAtomic => "make_persistent_atomic",
        }
    }

    /// Whether the backend draws from the configured pool directory
    #[must_use]
    pub const fn is_persistent(self) -> bool {
        matches!(
            self,
            Self::Vmem | Self::Vmmalloc | Self::Memkind | Self::PmemobjAlloc | Self::MakePersistentAtomic
        )
    }

    /// File name of the named pool file, for object-store backends
    #[must_use]
    pub const fn pool_file_name(self) -> Option<&'static str> {
        match self {
            Self::PmemobjAlloc | Self::MakePersistentAtomic => Some(self.name()),
            _ => None,
        }
    }

    /// Whether this build can construct the backend
    #[must_use]
    pub const fn is_available(self) -> bool {
        match self {
            Self::MiMalloc => cfg!(feature = "mimalloc"),
            _ => true,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|k| k.name()).collect();
                BenchError::invalid_config(format!(
                    "unknown backend `{s}` (expected one of: {})",
                    known.join(", ")
                ))
            })
    }
}

/// One backend chosen from configuration
///
/// Exactly one variant is live per instance; there is no fallback between
/// variants.
#[derive(Debug)]
pub enum AnyBackend {
    Default(DefaultBackend),
    Malloc(MallocBackend),
    #[cfg(feature = "mimalloc")]
    MiMalloc(MiMallocBackend),
    Vmem(VmemBackend),
    Vmmalloc(VmmallocBackend),
    Memkind(MemkindBackend),
    PmemobjAlloc(ObjAllocBackend),
    MakePersistentAtomic(PersistentAtomicBackend),
}

impl AnyBackend {
    /// Constructs the backend for `kind`
    ///
    /// Construction never touches the filesystem; pools are only created by
    /// `init_pool`.
    pub fn new(kind: BackendKind, pool: &PoolConfig) -> BenchResult<Self> {
        let backend = match kind {
            BackendKind::Default => Self::Default(DefaultBackend::new()),
            BackendKind::Malloc => Self::Malloc(MallocBackend::new()),
            #[cfg(feature = "mimalloc")]
            BackendKind::MiMalloc => Self::MiMalloc(MiMallocBackend::new()),
            #[cfg(not(feature = "mimalloc"))]
            BackendKind::MiMalloc => {
                return Err(BenchError::invalid_config(
                    "backend `mimalloc` requires the `mimalloc` feature",
                ));
            }
            BackendKind::Vmem => Self::Vmem(VmemBackend::new(pool.clone())),
            BackendKind::Vmmalloc => Self::Vmmalloc(VmmallocBackend::new(pool.clone())),
            BackendKind::Memkind => Self::Memkind(MemkindBackend::new(pool.clone())),
            BackendKind::PmemobjAlloc => Self::PmemobjAlloc(ObjAllocBackend::new(pool)),
            BackendKind::MakePersistentAtomic => {
                Self::MakePersistentAtomic(PersistentAtomicBackend::new(pool))
            }
        };
        Ok(backend)
    }
}

/// Forwards a call to whichever backend is live
macro_rules! dispatch {
    ($self:expr, $b:ident => $call:expr) => {
        match $self {
            AnyBackend::Default($b) => $call,
            AnyBackend::Malloc($b) => $call,
            #[cfg(feature = "mimalloc")]
            AnyBackend::MiMalloc($b) => $call,
            AnyBackend::Vmem($b) => $call,
            AnyBackend::Vmmalloc($b) => $call,
            AnyBackend::Memkind($b) => $call,
            AnyBackend::PmemobjAlloc($b) => $call,
            AnyBackend::MakePersistentAtomic($b) => $call,
        }
    };
}

impl Backend for AnyBackend {
    fn kind(&self) -> BackendKind {
        dispatch!(self, b => b.kind())
    }

    fn init_pool(&mut self) -> BenchResult<()> {
        dispatch!(self, b => b.init_pool())
    }

    #[inline(always)]
    fn alloc(&mut self, size: usize) -> BenchResult<NonNull<[u8]>> {
        dispatch!(self, b => b.alloc(size))
    }

    fn destroy_pool(&mut self) -> BenchResult<()> {
        dispatch!(self, b => b.destroy_pool())
    }

    fn capacity(&self) -> Option<usize> {
        dispatch!(self, b => b.capacity())
    }
}

/// Returns a region from a heap backend to the allocator it came from
///
/// Bounded backends reclaim their regions all at once in `destroy_pool`;
/// for them this does nothing and returns `false`.
///
/// # Safety
///
/// `region` must have been returned by `alloc` on a backend of `kind` and
/// must not be used afterwards.
pub unsafe fn release_heap_region(kind: BackendKind, region: NonNull<[u8]>) -> bool {
    // SAFETY: forwarded from the caller.
    unsafe {
        match kind {
            BackendKind::Default => system::release(region),
            BackendKind::Malloc | BackendKind::Vmmalloc => malloc::release(region),
            #[cfg(feature = "mimalloc")]
            BackendKind::MiMalloc => self::mimalloc::release(region),
            _ => return false,
        }
    }
    true
}

#[repr(C, align(16))]
struct HeapAligned([u8; HEAP_ALIGN]);

/// Zero-length region at a well-aligned dangling address
#[inline(always)]
pub(crate) fn empty_region() -> NonNull<[u8]> {
    let ptr = NonNull::<HeapAligned>::dangling().cast::<u8>();
    NonNull::slice_from_raw_parts(ptr, 0)
}
