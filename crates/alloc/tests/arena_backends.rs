//! Integration tests for the mapped-arena backends (vmem, memkind)

use std::ops::Range;
use std::ptr::NonNull;

use pmbench_alloc::prelude::*;
use rstest::rstest;
use tempfile::TempDir;

const POOL_SIZE: usize = 1 << 20;

fn open_backend(kind: BackendKind, size: usize) -> (TempDir, AnyBackend) {
    let dir = tempfile::tempdir().unwrap();
    let mut backend = AnyBackend::new(kind, &PoolConfig::new(dir.path(), size)).unwrap();
    backend.init_pool().unwrap();
    (dir, backend)
}

fn span(region: NonNull<[u8]>) -> Range<usize> {
    let start = region.cast::<u8>().as_ptr() as usize;
    start..start + region.len()
}

#[rstest]
fn test_sizes_within_capacity_succeed(
    #[values(BackendKind::Vmem, BackendKind::Memkind)] kind: BackendKind,
    #[values(0, 1, 64, 4096)] size: usize,
) {
    let (_dir, mut backend) = open_backend(kind, POOL_SIZE);
    let region = backend.alloc(size).unwrap();
    assert_eq!(region.len(), size);
    backend.destroy_pool().unwrap();
}

#[rstest]
fn test_capacity_boundary(#[values(BackendKind::Vmem, BackendKind::Memkind)] kind: BackendKind) {
    let (_dir, mut backend) = open_backend(kind, POOL_SIZE);
    let capacity = backend.capacity().unwrap();
    let err = backend.alloc(capacity + 1).unwrap_err();
    assert!(err.is_out_of_memory(), "{kind}: {err}");
    backend.destroy_pool().unwrap();

    let (_dir, mut backend) = open_backend(kind, POOL_SIZE);
    let region = backend.alloc(capacity).unwrap();
    assert_eq!(region.len(), capacity);
    backend.destroy_pool().unwrap();
}

#[rstest]
fn test_regions_are_distinct(#[values(BackendKind::Vmem, BackendKind::Memkind)] kind: BackendKind) {
    let (_dir, mut backend) = open_backend(kind, POOL_SIZE);

    let spans: Vec<_> = (0..32).map(|_| span(backend.alloc(64).unwrap())).collect();
    for (i, a) in spans.iter().enumerate() {
        for b in &spans[i + 1..] {
            assert!(a.end <= b.start || b.end <= a.start, "{a:?} overlaps {b:?}");
        }
    }
    backend.destroy_pool().unwrap();
}

#[rstest]
fn test_exhausting_small_arena(#[values(BackendKind::Vmem, BackendKind::Memkind)] kind: BackendKind) {
    let (_dir, mut backend) = open_backend(kind, 4096);

    let mut granted = 0;
    let err = loop {
        match backend.alloc(64) {
            Ok(_) => granted += 64,
            Err(e) => break e,
        }
    };
    assert!(err.is_out_of_memory());
    // 64 is a whole granule and a whole size class for both policies
    assert_eq!(granted, 4096);
    backend.destroy_pool().unwrap();
}

#[rstest]
fn test_arena_leaves_directory_clean(#[values(BackendKind::Vmem, BackendKind::Memkind)] kind: BackendKind) {
    let (dir, mut backend) = open_backend(kind, POOL_SIZE);
    backend.alloc(128).unwrap();
    backend.destroy_pool().unwrap();
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[rstest]
fn test_missing_directory_is_setup_error(
    #[values(BackendKind::Vmem, BackendKind::Memkind)] kind: BackendKind,
) {
    let mut backend = AnyBackend::new(kind, &PoolConfig::new("/definitely/not/here", POOL_SIZE)).unwrap();
    assert!(backend.init_pool().unwrap_err().is_setup());
}

#[test]
fn test_memkind_size_classes_visible_through_kind() {
    let dir = tempfile::tempdir().unwrap();
    let mut backend = pmbench_alloc::backend::MemkindBackend::new(PoolConfig::new(dir.path(), POOL_SIZE));
    backend.init_pool().unwrap();

    backend.alloc(9).unwrap();
    assert_eq!(backend.pmem_kind().unwrap().used(), 16);
    backend.destroy_pool().unwrap();
}
