//! Allocator backends for the pmbench allocation harness
//!
//! Every backend exposes the same three-step contract so one benchmark
//! driver can measure them all:
//!
//! 1. `init_pool` establishes an arena
//! 2. `alloc(size)` draws regions from it (the measured operation)
//! 3. `destroy_pool` releases it
//!
//! # Backends
//!
//! | Kind | Arena |
//! |---|---|
//! | `default` | Rust global allocator |
//! | `malloc` | libc `malloc` |
//! | `mimalloc` | mimalloc (feature `mimalloc`) |
//! | `vmem` | mapped file in the pool directory, 16-byte granules |
//! | `vmmalloc` | libc `malloc`, pool directory validated at init |
//! | `memkind` | mapped file in the pool directory, size classes |
//! | `pmemobj_alloc` | object pool file; allocation not implemented |
//! | `make_persistent_atomic` | object pool file, crash-atomic allocation |
//!
//! # Features
//!
//! - `mimalloc` (default): builds the mimalloc backend
//!
//! # Example
//!
//! ```no_run
//! use pmbench_alloc::prelude::*;
//!
//! fn main() -> BenchResult<()> {
//!     let config = BenchConfig::from_env()?;
//!     let mut interface = Interface::from_config(&config)?;
//!
//!     interface.init_pool()?;
//!     for _ in 0..1_000 {
//!         interface.alloc(64)?;
//!     }
//!     interface.destroy_pool()?;
//!     Ok(())
//! }
//! ```

#![allow(unsafe_code)]

pub mod arena;
pub mod backend;
pub mod config;
pub mod error;
pub mod interface;
pub mod pool;
pub mod utils;

pub use backend::{AnyBackend, Backend, BackendKind};
pub use config::{BenchConfig, PoolConfig};
pub use error::{BenchError, BenchResult};
pub use interface::{Interface, LifecycleState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports for driving a backend
pub mod prelude {
    pub use crate::backend::{AnyBackend, Backend, BackendKind};
    pub use crate::config::{BenchConfig, PoolConfig};
    pub use crate::error::{BenchError, BenchResult};
    pub use crate::interface::{Interface, LifecycleState};
}
