// BlockVault content-addressed cache.
// Copyright 2024 The BlockVault Authors.

// This program is free software; you can redistribute it and/or modify
// it under the terms of the MIT license. See LICENSE for details.

//! Garbage collection: reconciling on-disk blocks against the index.

use blockvault::test_fixtures::ScratchCache;

#[test]
fn collect_garbage_is_a_noop_on_a_healthy_cache() {
    let cache = ScratchCache::with_block_size(16);
    cache.store_bytes(b"nothing to clean up here");
    let stats = cache.collect_garbage().unwrap();
    assert_eq!(stats.blocks_deleted, 0);
    assert_eq!(stats.bytes_reclaimed, 0);
}

#[test]
fn collect_garbage_deletes_blocks_with_no_index_entry() {
    let cache = ScratchCache::with_block_size(16);
    let content = b"orphaned block content";
    let hash = blockvault::BlockHash::hash_bytes(content);
    let relpath = format!("{}/{}", hash.shard_prefix(2), hash);
    let blocks_dir = cache.path().join("blocks");
    let shard_dir = blocks_dir.join(hash.shard_prefix(2));
    std::fs::create_dir_all(&shard_dir).unwrap();
    std::fs::write(blocks_dir.join(&relpath), content).unwrap();

    let stats = cache.collect_garbage().unwrap();
    assert_eq!(stats.blocks_deleted, 1);
    assert_eq!(stats.bytes_reclaimed, content.len() as u64);
    assert!(!blocks_dir.join(&relpath).exists());
}

#[test]
fn collect_garbage_twice_in_a_row_finds_nothing_the_second_time() {
    let cache = ScratchCache::with_block_size(16);
    let content = b"leftover";
    let hash = blockvault::BlockHash::hash_bytes(content);
    let shard_dir = cache.path().join("blocks").join(hash.shard_prefix(2));
    std::fs::create_dir_all(&shard_dir).unwrap();
    std::fs::write(shard_dir.join(hash.to_string()), content).unwrap();

    let first = cache.collect_garbage().unwrap();
    assert_eq!(first.blocks_deleted, 1);
    let second = cache.collect_garbage().unwrap();
    assert_eq!(second.blocks_deleted, 0);
}

#[test]
fn collect_garbage_never_touches_referenced_blocks() {
    let cache = ScratchCache::with_block_size(16);
    let file_id = cache.store_bytes(b"keep me around");
    let stats_before = cache.stats();
    cache.collect_garbage().unwrap();
    let stats_after = cache.stats();
    assert_eq!(stats_before, stats_after);
    assert_eq!(cache.retrieve_to_vec(&file_id), b"keep me around");
}
