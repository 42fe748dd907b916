// BlockVault content-addressed cache.
// Copyright 2024 The BlockVault Authors.

// This program is free software; you can redistribute it and/or modify
// it under the terms of the MIT license. See LICENSE for details.

//! Utilities to set up test environments.
//!
//! Fixtures that create directories are automatically deleted when the
//! object is dropped.

use std::io::Write;
use std::ops::Deref;

use tempfile::TempDir;

use crate::engine::{Cache, OpenOptions};

/// A temporary cache, deleted when it goes out of scope.
///
/// `ScratchCache` derefs to [`Cache`], so it can be used anywhere a `Cache`
/// is expected.
pub struct ScratchCache {
    _tempdir: TempDir, // held only for cleanup
    cache: Cache,
}

impl ScratchCache {
    pub fn new() -> ScratchCache {
        Self::with_block_size(4096)
    }

    pub fn with_block_size(block_size: u64) -> ScratchCache {
        let tempdir = TempDir::new().unwrap();
        let cache_dir = tempdir.path().join("cache");
        let cache = Cache::open(
            &cache_dir,
            OpenOptions {
                create: true,
                block_size: Some(block_size),
            },
        )
        .unwrap();
        ScratchCache {
            _tempdir: tempdir,
            cache,
        }
    }

    /// Store `content` under a freshly minted file id and return it.
    pub fn store_bytes(&self, content: &[u8]) -> String {
        let file_id = Cache::new_file_id();
        self.cache.store_file(&file_id, content).unwrap();
        file_id
    }

    pub fn retrieve_to_vec(&self, file_id: &str) -> Vec<u8> {
        let mut out = Vec::new();
        self.cache.retrieve_file(file_id, &mut out).unwrap();
        out
    }
}

impl Deref for ScratchCache {
    type Target = Cache;

    fn deref(&self) -> &Cache {
        &self.cache
    }
}

impl Default for ScratchCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic pseudo-random byte content, useful for generating test
/// files larger than one block without needing real entropy.
pub fn pseudo_random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed ^ 0x9E3779B97F4A7C15;
    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        // xorshift64*: fast, deterministic, good enough for test fixtures.
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        out.extend_from_slice(&state.to_le_bytes());
    }
    out.truncate(len);
    out
}

/// A temporary directory containing plain files, for building up source
/// content to feed into a cache under test.
pub struct TreeFixture {
    pub root: std::path::PathBuf,
    _tempdir: TempDir, // held only for cleanup
}

impl TreeFixture {
    pub fn new() -> TreeFixture {
        let tempdir = TempDir::new().unwrap();
        let root = tempdir.path().to_path_buf();
        TreeFixture {
            _tempdir: tempdir,
            root,
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.root
    }

    /// Make a file in the tree with the given contents. Returns the full path.
    pub fn create_file_with_contents(&self, relative_path: &str, contents: &[u8]) -> std::path::PathBuf {
        let full_path = self.root.join(relative_path);
        let mut f = std::fs::File::create(&full_path).unwrap();
        f.write_all(contents).unwrap();
        full_path
    }
}

impl Default for TreeFixture {
    fn default() -> Self {
        Self::new()
    }
}
