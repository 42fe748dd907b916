// BlockVault content-addressed cache.
// Copyright 2024 The BlockVault Authors.

// This program is free software; you can redistribute it and/or modify
// it under the terms of the MIT license. See LICENSE for details.

//! Cross-process coordination (§6.4): a single advisory lock on a sentinel
//! file, shared by readers and held exclusively by mutators.
//!
//! This only protects against concurrent access from other processes.
//! Within one process, [`crate::engine::Cache`] additionally wraps the
//! in-memory index in an `RwLock`, so the two layers compose: the
//! process-level lock is acquired once per `Cache`, and the in-process lock
//! is taken per operation.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs4::FileExt;

use crate::errors::{Error, Result};

const LOCK_FILE_NAME: &str = "lock";

/// An open handle on the cache's lock sentinel file, used to take shared or
/// exclusive advisory locks.
#[derive(Debug)]
pub struct CacheLock {
    file: File,
    path: PathBuf,
}

impl CacheLock {
    pub fn open(cache_dir: &Path) -> Result<CacheLock> {
        let path = cache_dir.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(|source| Error::Lock {
                kind: "open",
                path: path.clone(),
                source,
            })?;
        Ok(CacheLock { file, path })
    }

    /// Take a shared lock, blocking until available. Any number of readers
    /// may hold this concurrently, but not while a writer holds the
    /// exclusive lock.
    pub fn lock_shared(&self) -> Result<LockGuard<'_>> {
        self.file.lock_shared().map_err(|source| Error::Lock {
            kind: "shared",
            path: self.path.clone(),
            source,
        })?;
        Ok(LockGuard { lock: self })
    }

    /// Take the exclusive lock, blocking until available. Held for the
    /// duration of any operation that mutates the index or the blockdir.
    pub fn lock_exclusive(&self) -> Result<LockGuard<'_>> {
        self.file.lock_exclusive().map_err(|source| Error::Lock {
            kind: "exclusive",
            path: self.path.clone(),
            source,
        })?;
        Ok(LockGuard { lock: self })
    }
}

/// RAII guard releasing the process-level lock on drop.
#[must_use]
#[derive(Debug)]
pub struct LockGuard<'a> {
    lock: &'a CacheLock,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        let _ = self.lock.file.unlock();
    }
}

#[cfg(test)]
mod test {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn shared_locks_can_be_held_concurrently() {
        let tempdir = TempDir::new().unwrap();
        let lock = CacheLock::open(tempdir.path()).unwrap();
        let a = lock.lock_shared().unwrap();
        let b = lock.lock_shared().unwrap();
        drop(a);
        drop(b);
    }

    #[test]
    fn exclusive_lock_can_be_reacquired_after_release() {
        let tempdir = TempDir::new().unwrap();
        let lock = CacheLock::open(tempdir.path()).unwrap();
        {
            let _guard = lock.lock_exclusive().unwrap();
        }
        let _guard = lock.lock_exclusive().unwrap();
    }
}
