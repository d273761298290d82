//! Process-wide registry of open pool files
//!
//! A pool file may be mapped by at most one [`ObjectPool`](super::ObjectPool)
//! in this process. Each open pool holds a [`Registration`] that releases its
//! claim when dropped.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::{PoolError, PoolResult};

static OPEN_POOLS: Mutex<Vec<PathBuf>> = Mutex::new(Vec::new());

/// Claim on a pool path, released on drop
#[derive(Debug)]
pub(crate) struct Registration {
    path: PathBuf,
}

impl Registration {
    /// Claims `path`, failing if another pool in this process holds it
    pub(crate) fn claim(path: &Path) -> PoolResult<Self> {
        let key = std::path::absolute(path)?;

        let mut open = OPEN_POOLS.lock();
        if open.contains(&key) {
            return Err(PoolError::AlreadyOpen { path: key });
        }
        open.push(key.clone());

        Ok(Self { path: key })
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        OPEN_POOLS.lock().retain(|p| p != &self.path);
    }
}

/// Whether any pool in this process holds `path`
pub fn is_open(path: &Path) -> bool {
    std::path::absolute(path).is_ok_and(|key| OPEN_POOLS.lock().contains(&key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_is_exclusive_until_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool");

        let first = Registration::claim(&path).unwrap();
        assert!(is_open(&path));
        assert!(matches!(
            Registration::claim(&path),
            Err(PoolError::AlreadyOpen { .. })
        ));

        drop(first);
        assert!(!is_open(&path));
        let _again = Registration::claim(&path).unwrap();
    }
}
