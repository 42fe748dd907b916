// BlockVault content-addressed cache.
// Copyright 2024 The BlockVault Authors.

// This program is free software; you can redistribute it and/or modify
// it under the terms of the MIT license. See LICENSE for details.

//! Concurrent access from multiple threads sharing one `Cache` handle.

use std::thread;

use blockvault::test_fixtures::{pseudo_random_bytes, ScratchCache};
use blockvault::Cache;

#[test]
fn concurrent_stores_of_distinct_files_all_survive() {
    let scratch = ScratchCache::with_block_size(32);
    let cache: Cache = (*scratch).clone();

    let file_ids: Vec<String> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                scope.spawn(move || {
                    let content = pseudo_random_bytes(2000, i as u64);
                    let file_id = Cache::new_file_id();
                    cache.store_file(&file_id, content.as_slice()).unwrap();
                    (file_id, content)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| {
                let (file_id, content) = h.join().unwrap();
                let mut out = Vec::new();
                cache.retrieve_file(&file_id, &mut out).unwrap();
                assert_eq!(out, content);
                file_id
            })
            .collect()
    });

    let mut listed = cache.list_file_ids();
    listed.sort();
    let mut expected = file_ids;
    expected.sort();
    assert_eq!(listed, expected);
}

#[test]
fn concurrent_stores_of_identical_content_deduplicate_to_one_block_set() {
    let scratch = ScratchCache::with_block_size(32);
    let cache: Cache = (*scratch).clone();
    let content = pseudo_random_bytes(5000, 99);

    thread::scope(|scope| {
        for _ in 0..6 {
            let cache = cache.clone();
            let content = content.clone();
            scope.spawn(move || {
                let file_id = Cache::new_file_id();
                cache.store_file(&file_id, content.as_slice()).unwrap();
            });
        }
    });

    let stats = cache.stats();
    let expected_blocks = (content.len() + 31) / 32;
    assert_eq!(stats.distinct_block_count, expected_blocks);
    assert_eq!(stats.file_count, 6);
}
