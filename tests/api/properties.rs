// BlockVault content-addressed cache.
// Copyright 2024 The BlockVault Authors.

// This program is free software; you can redistribute it and/or modify
// it under the terms of the MIT license. See LICENSE for details.

//! Property-based tests covering the cache's core invariants: round-trip
//! fidelity, refcount accounting, and garbage-collection safety under
//! arbitrary sequences of store/remove operations.

use std::collections::HashMap;

use proptest::collection::vec as prop_vec;
use proptest::prelude::*;

use blockvault::test_fixtures::ScratchCache;

proptest! {
    /// P1 (paraphrased): storing then retrieving any byte sequence returns
    /// exactly those bytes, regardless of block size or content length.
    #[test]
    fn store_then_retrieve_is_identity(
        content in prop_vec(any::<u8>(), 0..5000),
        block_size in 1u64..64,
    ) {
        let cache = ScratchCache::with_block_size(block_size);
        let file_id = cache.store_bytes(&content);
        let retrieved = cache.retrieve_to_vec(&file_id);
        prop_assert_eq!(retrieved, content);
    }

    /// Every distinct block's refcount equals the number of times it
    /// appears across all current manifests, summed.
    #[test]
    fn refcounts_equal_occurrences_across_manifests(
        contents in prop_vec(prop_vec(any::<u8>(), 0..500), 1..6),
    ) {
        let cache = ScratchCache::with_block_size(16);
        let mut block_hashes_per_file = Vec::new();
        for content in &contents {
            let file_id = cache.store_bytes(content);
            block_hashes_per_file.push((file_id, content.clone()));
        }

        let mut expected_counts: HashMap<blockvault::BlockHash, u64> = HashMap::new();
        for (_, content) in &block_hashes_per_file {
            for chunk in blockvault::Chunker::new(content.as_slice(), 16) {
                let chunk = chunk.unwrap();
                *expected_counts.entry(chunk.hash).or_insert(0) += 1;
            }
        }

        for (hash, expected) in expected_counts {
            let refcount = cache.block_refcount(&hash).expect("block should still be indexed");
            prop_assert_eq!(refcount, expected);
        }
    }

    /// Removing every file that references a block eventually makes that
    /// block disappear from the index and from disk; `collect_garbage`
    /// then finds nothing left to do.
    #[test]
    fn removing_all_referencing_files_frees_the_block(
        content in prop_vec(any::<u8>(), 1..2000),
        duplicate_count in 1usize..4,
    ) {
        let cache = ScratchCache::with_block_size(32);
        let file_ids: Vec<String> = (0..duplicate_count)
            .map(|_| cache.store_bytes(&content))
            .collect();

        for file_id in &file_ids {
            cache.remove_file(file_id).unwrap();
        }

        let gc_stats = cache.collect_garbage().unwrap();
        prop_assert_eq!(gc_stats.blocks_deleted, 0, "removal should already have deleted unreferenced blocks");
        prop_assert_eq!(cache.stats().distinct_block_count, 0);
    }
}
