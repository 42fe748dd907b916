// BlockVault content-addressed cache.
// Copyright 2024 The BlockVault Authors.

// This program is free software; you can redistribute it and/or modify
// it under the terms of the MIT license. See LICENSE for details.

//! End-to-end scenarios covering store, retrieve, remove, and dedup.

use pretty_assertions::assert_eq;

use blockvault::test_fixtures::{pseudo_random_bytes, ScratchCache};
use blockvault::Cache;

#[test]
fn store_then_retrieve_round_trips_exactly() {
    let cache = ScratchCache::with_block_size(16);
    let content = b"the quick brown fox jumps over the lazy dog";
    let file_id = cache.store_bytes(content);
    let retrieved = cache.retrieve_to_vec(&file_id);
    assert_eq!(retrieved, content);
}

#[test]
fn empty_file_round_trips_to_an_empty_manifest() {
    let cache = ScratchCache::with_block_size(16);
    let stats_before = cache.stats();
    let file_id = cache.store_bytes(b"");
    let stats_after = cache.stats();
    assert_eq!(stats_after.file_count, stats_before.file_count + 1);
    assert_eq!(
        stats_after.distinct_block_count,
        stats_before.distinct_block_count,
        "an empty file should not create any blocks"
    );
    assert_eq!(cache.retrieve_to_vec(&file_id), Vec::<u8>::new());
}

#[test]
fn identical_files_share_blocks() {
    let cache = ScratchCache::with_block_size(8);
    let content = pseudo_random_bytes(4096, 1);
    let first = cache.store_bytes(&content);
    let second = cache.store_bytes(&content);
    assert_ne!(first, second);

    let stats_after_first = cache.stats();
    let third = cache.store_bytes(&content);
    let stats_after_third = cache.stats();
    assert_eq!(
        stats_after_first.distinct_block_count,
        stats_after_third.distinct_block_count,
        "storing identical content again must not create new blocks"
    );
    assert_eq!(cache.retrieve_to_vec(&third), content);
}

#[test]
fn re_storing_under_the_same_file_id_releases_old_blocks() {
    let cache = ScratchCache::with_block_size(8);
    let file_id = "overwrite-me".to_string();
    cache.store_file(&file_id, &b"original contents here"[..]).unwrap();
    let stats_with_original = cache.stats();
    assert!(stats_with_original.distinct_block_count > 0);

    cache.store_file(&file_id, &b"totally different replacement bytes"[..]).unwrap();
    assert_eq!(cache.retrieve_to_vec(&file_id), b"totally different replacement bytes");

    // The old blocks are gone unless some other file still needs them.
    let gc_stats = cache.collect_garbage().unwrap();
    assert_eq!(gc_stats.blocks_deleted, 0, "overwrite should already have released unshared old blocks");
}

#[test]
fn remove_file_then_retrieve_is_not_found() {
    let cache = ScratchCache::with_block_size(16);
    let file_id = cache.store_bytes(b"short lived");
    assert!(cache.exists(&file_id));
    cache.remove_file(&file_id).unwrap();
    assert!(!cache.exists(&file_id));

    let mut sink = Vec::new();
    let err = cache.retrieve_file(&file_id, &mut sink).unwrap_err();
    assert_eq!(err.category(), blockvault::ErrorCategory::NotFound);
}

#[test]
fn removing_one_of_two_files_sharing_a_block_keeps_the_block() {
    let cache = ScratchCache::with_block_size(8);
    let shared_content = pseudo_random_bytes(64, 2);
    let a = cache.store_bytes(&shared_content);
    let b = cache.store_bytes(&shared_content);

    cache.remove_file(&a).unwrap();
    assert_eq!(cache.retrieve_to_vec(&b), shared_content);
}

#[test]
fn list_file_ids_reflects_stores_and_removals() {
    let cache = ScratchCache::with_block_size(16);
    let a = cache.store_bytes(b"one");
    let b = cache.store_bytes(b"two");
    let mut ids = cache.list_file_ids();
    ids.sort();
    let mut expected = vec![a.clone(), b.clone()];
    expected.sort();
    assert_eq!(ids, expected);

    cache.remove_file(&a).unwrap();
    assert_eq!(cache.list_file_ids(), vec![b]);
}

#[test]
fn retrieving_unknown_file_id_is_not_found() {
    let cache = ScratchCache::with_block_size(16);
    let mut sink = Vec::new();
    let err = cache.retrieve_file("never-stored", &mut sink).unwrap_err();
    assert_eq!(err.category(), blockvault::ErrorCategory::NotFound);
}

#[test]
fn file_larger_than_several_blocks_round_trips() {
    let cache = ScratchCache::with_block_size(37); // deliberately awkward size
    let content = pseudo_random_bytes(10_000, 3);
    let file_id = cache.store_bytes(&content);
    assert_eq!(cache.retrieve_to_vec(&file_id), content);
}

#[test]
fn reopening_an_existing_cache_preserves_stored_files() {
    let tempdir = tempfile::TempDir::new().unwrap();
    let cache_dir = tempdir.path().join("cache");
    let content = b"durable across reopen";
    let file_id;
    {
        let cache = Cache::open(
            &cache_dir,
            blockvault::OpenOptions {
                create: true,
                block_size: Some(16),
            },
        )
        .unwrap();
        file_id = Cache::new_file_id();
        cache.store_file(&file_id, &content[..]).unwrap();
    }
    let cache = Cache::open(
        &cache_dir,
        blockvault::OpenOptions {
            create: false,
            block_size: None,
        },
    )
    .unwrap();
    let mut out = Vec::new();
    cache.retrieve_file(&file_id, &mut out).unwrap();
    assert_eq!(out, content);
}

#[test]
fn validate_reports_no_problems_on_a_healthy_cache() {
    let cache = ScratchCache::with_block_size(16);
    cache.store_bytes(b"healthy content");
    let report = cache.validate().unwrap();
    assert!(report.is_ok());
}
