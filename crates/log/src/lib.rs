//! # pmbench-log
//!
//! Logging setup for the pmbench harness: one call installs a
//! `tracing-subscriber` fmt subscriber filtered by `EnvFilter`.
//!
//! ## Quick Start
//!
//! ```rust
//! fn main() -> pmbench_log::LogResult<()> {
//!     // PMBENCH_LOG / RUST_LOG if set, otherwise a build-dependent preset
//!     pmbench_log::auto_init()?;
//!
//!     pmbench_log::info!(backend = "vmem", "pool ready");
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]

mod builder;
mod config;
mod error;

pub use builder::LoggerBuilder;
pub use config::{Config, DisplayConfig, ENV_LOG, ENV_LOG_FORMAT, Format};
pub use error::{LogError, LogResult};

// Re-export tracing macros
pub use tracing::{debug, error, info, trace, warn};

/// Initialize from the environment, or a preset when nothing is set
///
/// An unrecognised `PMBENCH_LOG_FORMAT` is reported as [`LogError::Format`].
///
/// Does nothing if a global subscriber is already installed, so test
/// binaries and benches can call it unconditionally.
pub fn auto_init() -> LogResult<()> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    let has_env = std::env::var_os(ENV_LOG).is_some() || std::env::var_os("RUST_LOG").is_some();
    if has_env {
        init_with(Config::try_from_env()?)
    } else if cfg!(debug_assertions) {
        init_with(Config::development())
    } else {
        init_with(Config::production())
    }
}

/// Initialize with default configuration
pub fn init() -> LogResult<()> {
    init_with(Config::default())
}

/// Initialize with custom configuration
pub fn init_with(config: Config) -> LogResult<()> {
    LoggerBuilder::from_config(config).build()
}
