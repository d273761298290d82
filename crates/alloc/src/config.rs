//! Harness configuration
//!
//! [`PoolConfig`] carries the location and capacity of persistent arenas;
//! [`BenchConfig`] adds the backend choice. Both deserialize with serde and
//! can be read from the environment.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::backend::BackendKind;
use crate::error::{BenchError, BenchResult};
use crate::utils::parse_size;

/// Default capacity of persistent arenas (64 MiB)
pub const DEFAULT_POOL_SIZE: usize = 64 * 1024 * 1024;

/// Backend selector
pub const ENV_BACKEND: &str = "PMBENCH_BACKEND";
/// Directory holding persistent pools
pub const ENV_POOL_DIR: &str = "PMBENCH_POOL_DIR";
/// Fallback directory, shared with libvmmalloc deployments
pub const ENV_VMMALLOC_POOL_DIR: &str = "VMMALLOC_POOL_DIR";
/// Pool capacity, plain bytes or with a `K`/`M`/`G` suffix
pub const ENV_POOL_SIZE: &str = "PMBENCH_POOL_SIZE";

/// Location and capacity of a persistent-memory-backed arena
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Directory in which pool files and mapped arenas are created
    pub directory: PathBuf,

    /// Arena capacity in bytes
    #[serde(deserialize_with = "size_serde::deserialize")]
    pub size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            directory: std::env::temp_dir(),
            size: DEFAULT_POOL_SIZE,
        }
    }
}

impl PoolConfig {
    /// Creates a pool configuration
    pub fn new(directory: impl Into<PathBuf>, size: usize) -> Self {
        Self {
            directory: directory.into(),
            size,
        }
    }

    /// Path of a named pool file inside the configured directory
    #[must_use]
    pub fn pool_path(&self, name: &str) -> PathBuf {
        self.directory.join(name)
    }

    /// Directory in which pools are created
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Rejects configurations no backend could use
    pub fn validate(&self) -> BenchResult<()> {
        if self.directory.as_os_str().is_empty() {
            return Err(BenchError::invalid_config("pool directory is empty"));
        }
        if self.size == 0 {
            return Err(BenchError::invalid_config("pool size must be non-zero"));
        }
        Ok(())
    }
}

/// Complete configuration of one benchmark run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Backend measured by this run
    pub backend: BackendKind,

    /// Arena settings for persistent backends
    pub pool: PoolConfig,
}

impl BenchConfig {
    pub fn new(backend: BackendKind, pool: PoolConfig) -> Self {
        Self { backend, pool }
    }

    /// Create configuration from environment variables
    pub fn from_env() -> BenchResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup
    ///
    /// Unset keys keep their defaults. The pool directory falls back to
    /// `VMMALLOC_POOL_DIR` when `PMBENCH_POOL_DIR` is absent.
    pub fn from_lookup<F>(lookup: F) -> BenchResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(backend) = lookup(ENV_BACKEND) {
            trace!(key = ENV_BACKEND, value = %backend, "loading config");
            config.backend = backend.parse()?;
        }

        if let Some(dir) = lookup(ENV_POOL_DIR).or_else(|| lookup(ENV_VMMALLOC_POOL_DIR)) {
            trace!(key = ENV_POOL_DIR, value = %dir, "loading config");
            config.pool.directory = PathBuf::from(dir);
        }

        if let Some(size) = lookup(ENV_POOL_SIZE) {
            trace!(key = ENV_POOL_SIZE, value = %size, "loading config");
            config.pool.size = parse_size(&size).ok_or_else(|| {
                BenchError::invalid_config(format!(
                    "{ENV_POOL_SIZE}: cannot parse `{size}` as a byte count"
                ))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BenchResult<()> {
        self.pool.validate()
    }
}

/// Accepts either an integer or a suffixed string such as `"64M"`
mod size_serde {
    use std::fmt;

    use serde::Deserializer;
    use serde::de::{self, Visitor};

    use crate::utils::parse_size;

    struct SizeVisitor;

    impl Visitor<'_> for SizeVisitor {
        type Value = usize;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a byte count or a size string like \"64M\"")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<usize, E> {
            usize::try_from(v).map_err(|_| E::custom(format!("size {v} does not fit in usize")))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<usize, E> {
            usize::try_from(v).map_err(|_| E::custom(format!("size {v} must be non-negative")))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<usize, E> {
            parse_size(v).ok_or_else(|| E::custom(format!("invalid size `{v}`")))
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
        deserializer.deserialize_any(SizeVisitor)
    }
}
