//! Integration tests for the object-store backends
//!
//! These tests verify:
//! - Pool files are created on first init and reused afterwards
//! - Corrupted pool files stop init at the consistency check
//! - Destroy removes the pool file
//! - Allocation respects the pool's capacity

use std::fs;
use std::ops::Range;
use std::path::PathBuf;
use std::ptr::NonNull;

use pmbench_alloc::backend::{ObjAllocBackend, PersistentAtomicBackend};
use pmbench_alloc::pool::{MIN_ALLOC_CLASS, ObjectPool, POOL_HEADER_SIZE};
use pmbench_alloc::prelude::*;
use rstest::rstest;
use tempfile::TempDir;

const POOL_SIZE: usize = 1 << 16;

/// Helper to create a backend over a fresh directory
fn atomic_backend(size: usize) -> (TempDir, PersistentAtomicBackend) {
    let dir = tempfile::tempdir().unwrap();
    let backend = PersistentAtomicBackend::new(&PoolConfig::new(dir.path(), size));
    (dir, backend)
}

fn pool_file(dir: &TempDir, kind: BackendKind) -> PathBuf {
    dir.path().join(kind.name())
}

fn span(region: NonNull<[u8]>) -> Range<usize> {
    let start = region.cast::<u8>().as_ptr() as usize;
    start..start + region.len()
}

#[test]
fn test_fresh_directory_scenario() {
    let (dir, mut backend) = atomic_backend(POOL_SIZE);
    let path = pool_file(&dir, BackendKind::MakePersistentAtomic);
    assert!(!path.exists());

    backend.init_pool().unwrap();
    assert!(path.exists());
    assert_eq!(fs::metadata(&path).unwrap().len(), POOL_SIZE as u64);

    let spans: Vec<_> = (0..16).map(|_| span(backend.alloc(64).unwrap())).collect();
    for (i, a) in spans.iter().enumerate() {
        assert_eq!(a.len(), 64);
        for b in &spans[i + 1..] {
            assert!(a.end <= b.start || b.end <= a.start, "{a:?} overlaps {b:?}");
        }
    }
    assert_eq!(backend.pool().unwrap().object_count(), 16);

    backend.destroy_pool().unwrap();
    assert!(!path.exists());
    assert!(backend.pool().is_none());
}

#[rstest]
fn test_sizes_within_capacity_succeed(#[values(0, 1, 64, 4096)] size: usize) {
    let (_dir, mut backend) = atomic_backend(POOL_SIZE);
    backend.init_pool().unwrap();
    assert_eq!(backend.alloc(size).unwrap().len(), size);
    backend.destroy_pool().unwrap();
}

#[test]
fn test_capacity_boundary() {
    let (_dir, mut backend) = atomic_backend(POOL_SIZE);
    let capacity = backend.capacity().unwrap();

    backend.init_pool().unwrap();
    assert!(backend.alloc(capacity + 1).unwrap_err().is_out_of_memory());
    assert_eq!(backend.alloc(capacity).unwrap().len(), capacity);
    backend.destroy_pool().unwrap();
}

#[test]
fn test_exhausting_small_pool() {
    let (_dir, mut backend) = atomic_backend(4096);
    backend.init_pool().unwrap();

    let mut granted = 0usize;
    let err = loop {
        match backend.alloc(64) {
            Ok(_) => granted += 1,
            Err(e) => break e,
        }
    };
    assert!(err.is_out_of_memory(), "{err}");
    // Each 64-byte object plus its header occupies two allocation classes
    assert_eq!(granted, (4096 - POOL_HEADER_SIZE) / (2 * MIN_ALLOC_CLASS));
    backend.destroy_pool().unwrap();
}

#[test]
fn test_existing_pool_is_reused() {
    let (dir, mut first) = atomic_backend(POOL_SIZE);
    first.init_pool().unwrap();
    for _ in 0..3 {
        first.alloc(100).unwrap();
    }
    // Dropping without destroy leaves the file behind, as a crashed run would
    drop(first);
    assert!(pool_file(&dir, BackendKind::MakePersistentAtomic).exists());

    let mut second = PersistentAtomicBackend::new(&PoolConfig::new(dir.path(), POOL_SIZE));
    second.init_pool().unwrap();
    assert_eq!(second.pool().unwrap().object_count(), 3);
    second.destroy_pool().unwrap();
}

#[test]
fn test_existing_pool_is_opened_whatever_the_configured_size() {
    let (dir, mut first) = atomic_backend(POOL_SIZE);
    first.init_pool().unwrap();
    first.alloc(64).unwrap();
    drop(first);

    // Too small to create, but the file is already there
    let mut second = PersistentAtomicBackend::new(&PoolConfig::new(dir.path(), 128));
    second.init_pool().unwrap();
    let pool = second.pool().unwrap();
    assert_eq!(pool.pool_size(), POOL_SIZE);
    assert_eq!(pool.object_count(), 1);

    second.alloc(64).unwrap();
    second.destroy_pool().unwrap();
    assert!(!pool_file(&dir, BackendKind::MakePersistentAtomic).exists());
}

#[rstest]
#[case::zero_filled(vec![0u8; POOL_SIZE])]
#[case::truncated(vec![0xFFu8; 100])]
#[case::empty(Vec::new())]
fn test_corrupted_pool_fails_check(#[case] contents: Vec<u8>) {
    let (dir, mut backend) = atomic_backend(POOL_SIZE);
    fs::write(pool_file(&dir, BackendKind::MakePersistentAtomic), contents).unwrap();

    let err = backend.init_pool().unwrap_err();
    assert!(err.is_setup());
    assert_eq!(err.primitive(), Some("check"));
    assert!(backend.pool().is_none());
    assert!(backend.alloc(8).unwrap_err().is_invalid_state());
}

#[test]
fn test_truncated_after_previous_run_fails_check() {
    let (dir, mut backend) = atomic_backend(POOL_SIZE);
    backend.init_pool().unwrap();
    backend.alloc(64).unwrap();
    drop(backend);

    let path = pool_file(&dir, BackendKind::MakePersistentAtomic);
    fs::OpenOptions::new()
        .write(true)
        .open(&path)
        .unwrap()
        .set_len(POOL_SIZE as u64 / 2)
        .unwrap();

    let mut backend = PersistentAtomicBackend::new(&PoolConfig::new(dir.path(), POOL_SIZE));
    assert_eq!(backend.init_pool().unwrap_err().primitive(), Some("check"));
}

#[test]
fn test_layout_mismatch_fails_check() {
    let (dir, mut backend) = atomic_backend(POOL_SIZE);
    let path = pool_file(&dir, BackendKind::MakePersistentAtomic);
    ObjectPool::create(&path, "some_other_layout", POOL_SIZE)
        .unwrap()
        .close()
        .unwrap();

    let err = backend.init_pool().unwrap_err();
    assert_eq!(err.primitive(), Some("check"));
}

#[test]
fn test_second_open_of_same_pool_fails() {
    let (dir, mut first) = atomic_backend(POOL_SIZE);
    first.init_pool().unwrap();

    let mut second = PersistentAtomicBackend::new(&PoolConfig::new(dir.path(), POOL_SIZE));
    let err = second.init_pool().unwrap_err();
    assert!(err.is_setup());
    assert_eq!(err.primitive(), Some("open"));

    first.destroy_pool().unwrap();
}

#[test]
fn test_tiny_pool_fails_create() {
    let (dir, mut backend) = atomic_backend(100);
    let err = backend.init_pool().unwrap_err();
    assert_eq!(err.primitive(), Some("create"));
    assert!(!pool_file(&dir, BackendKind::MakePersistentAtomic).exists());
}

#[test]
fn test_destroy_after_external_removal_is_teardown_error() {
    let (dir, mut backend) = atomic_backend(POOL_SIZE);
    backend.init_pool().unwrap();
    fs::remove_file(pool_file(&dir, BackendKind::MakePersistentAtomic)).unwrap();

    let err = backend.destroy_pool().unwrap_err();
    assert!(err.is_teardown());
    assert_eq!(err.primitive(), Some("remove"));
    assert_eq!(err.code(), "BENCH:TEARDOWN");
}

#[test]
fn test_low_level_store_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let mut backend = ObjAllocBackend::new(&PoolConfig::new(dir.path(), POOL_SIZE));
    let path = pool_file(&dir, BackendKind::PmemobjAlloc);

    backend.init_pool().unwrap();
    assert!(path.exists());
    assert_eq!(backend.pool().unwrap().layout(), "pmemobj_alloc");

    let err = backend.alloc(64).unwrap_err();
    assert!(err.is_not_implemented());
    assert_eq!(err.code(), "BENCH:UNIMPLEMENTED");

    backend.destroy_pool().unwrap();
    assert!(!path.exists());
}

#[test]
fn test_variants_use_separate_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = PoolConfig::new(dir.path(), POOL_SIZE);
    let mut low = AnyBackend::new(BackendKind::PmemobjAlloc, &config).unwrap();
    let mut high = AnyBackend::new(BackendKind::MakePersistentAtomic, &config).unwrap();

    low.init_pool().unwrap();
    high.init_pool().unwrap();
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);

    low.destroy_pool().unwrap();
    high.destroy_pool().unwrap();
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}
