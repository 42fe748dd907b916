// BlockVault content-addressed cache.
// Copyright 2024 The BlockVault Authors.

// This program is free software; you can redistribute it and/or modify
// it under the terms of the MIT license. See LICENSE for details.

//! The Cache Engine: the public API that orchestrates the chunker, block
//! store, and index into the store/retrieve/remove operations callers
//! actually use (§5).

use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use cachedir::ensure_tag;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::blockdir::{BlockDir, WriteOutcome};
use crate::chunker::Chunker;
use crate::config::{Config, DEFAULT_BLOCK_SIZE};
use crate::errors::{Error, Result};
use crate::hash::BlockHash;
use crate::index::{Index, IndexStats, Mutation, Transaction};
use crate::lock::CacheLock;
use crate::manifest::{FileId, Manifest};
use crate::misc::bytes_to_human_mb;
use crate::transport::Transport;

const BLOCKS_SUBDIR: &str = "blocks";
const INDEX_SUBDIR: &str = "index";

/// Options controlling [`Cache::open`].
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenOptions {
    /// Create the cache directory and config if nothing is there yet.
    pub create: bool,
    /// Block size to create with, or to require of an existing cache.
    /// Ignored (the recorded value is used as-is) when `None` and the
    /// cache already exists.
    pub block_size: Option<u64>,
}

/// A content-addressed, block-deduplicated file cache rooted at one
/// directory on local disk.
///
/// `Cache` owns the process-level lock, the block store, and the index; it
/// is the only type in this crate most callers need to touch. Cloning is
/// cheap (an `Arc` around the shared state) so a `Cache` can be handed to
/// multiple threads, each taking the lock only for the duration of one
/// operation (§6.4).
#[derive(Clone, Debug)]
pub struct Cache {
    inner: Arc<CacheInner>,
}

#[derive(Debug)]
struct CacheInner {
    cache_dir: PathBuf,
    config: Config,
    blockdir: BlockDir,
    index: RwLock<Index>,
    lock: CacheLock,
}

/// Snapshot of cache-wide counters returned by [`Cache::stats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub file_count: usize,
    pub distinct_block_count: usize,
    pub total_distinct_bytes: u64,
    pub total_logical_bytes: u64,
}

impl From<IndexStats> for CacheStats {
    fn from(s: IndexStats) -> CacheStats {
        CacheStats {
            file_count: s.file_count,
            distinct_block_count: s.distinct_block_count,
            total_distinct_bytes: s.total_distinct_bytes,
            total_logical_bytes: s.total_logical_bytes,
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "files:            {}", self.file_count)?;
        writeln!(f, "distinct blocks:  {}", self.distinct_block_count)?;
        writeln!(
            f,
            "bytes on disk:    {}",
            bytes_to_human_mb(self.total_distinct_bytes)
        )?;
        writeln!(
            f,
            "logical bytes:    {}",
            bytes_to_human_mb(self.total_logical_bytes)
        )
    }
}

/// The outcome of [`Cache::collect_garbage`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GcStats {
    pub blocks_deleted: usize,
    pub bytes_reclaimed: u64,
}

impl fmt::Display for GcStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "deleted {} unreferenced blocks, reclaiming {}",
            self.blocks_deleted,
            bytes_to_human_mb(self.bytes_reclaimed)
        )
    }
}

/// The outcome of [`Cache::validate`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidateReport {
    pub blocks_checked: usize,
    pub missing_blocks: Vec<BlockHash>,
    pub corrupt_blocks: Vec<BlockHash>,
}

impl ValidateReport {
    pub fn is_ok(&self) -> bool {
        self.missing_blocks.is_empty() && self.corrupt_blocks.is_empty()
    }
}

impl fmt::Display for ValidateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "checked {} blocks", self.blocks_checked)?;
        if self.is_ok() {
            return write!(f, "no problems found");
        }
        if !self.missing_blocks.is_empty() {
            writeln!(f, "{} blocks missing from disk", self.missing_blocks.len())?;
        }
        if !self.corrupt_blocks.is_empty() {
            write!(f, "{} blocks corrupt", self.corrupt_blocks.len())?;
        }
        Ok(())
    }
}

impl Cache {
    /// Open a cache rooted at `cache_dir`, creating it (and writing its
    /// config, `CACHEDIR.TAG`, and empty block/index subdirectories) if
    /// `options.create` is set and nothing is there yet.
    #[instrument(skip(options))]
    pub fn open(cache_dir: &Path, options: OpenOptions) -> Result<Cache> {
        if options.create {
            fs::create_dir_all(cache_dir).map_err(|source| Error::CreateCacheDir {
                path: cache_dir.to_owned(),
                source,
            })?;
            if let Err(err) = ensure_tag(cache_dir) {
                warn!(%err, "failed to write CACHEDIR.TAG");
            }
        }
        let config = Config::open_or_create(cache_dir, options.block_size, options.create)?;
        let lock = CacheLock::open(cache_dir)?;
        let transport: Arc<dyn Transport> =
            Arc::new(<dyn Transport>::local(&cache_dir.join(BLOCKS_SUBDIR)));
        let blockdir = if options.create {
            BlockDir::create(transport)?
        } else {
            BlockDir::new(transport)
        };
        let index = Index::open(&cache_dir.join(INDEX_SUBDIR))?;
        info!(path = %cache_dir.display(), block_size = config.block_size, "opened cache");
        Ok(Cache {
            inner: Arc::new(CacheInner {
                cache_dir: cache_dir.to_owned(),
                config,
                blockdir,
                index: RwLock::new(index),
                lock,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.cache_dir
    }

    pub fn block_size(&self) -> u64 {
        self.inner.config.block_size
    }

    /// Mint a fresh, randomly generated file id. Callers with their own
    /// natural key (a URL, a content path) are free to use that instead and
    /// never call this (§9).
    pub fn new_file_id() -> FileId {
        Uuid::new_v4().to_string()
    }

    /// Split `reader`'s contents into blocks, store any not already
    /// present, and record a manifest under `file_id`.
    ///
    /// All-or-nothing (§7): if reading or hashing fails partway through,
    /// any blocks newly written for this call are rolled back (decref'd
    /// and, if that drops them to zero, deleted) before the error is
    /// returned, so a failed `store_file` never leaves a partial manifest
    /// or stray refcounts behind.
    #[instrument(skip(self, reader))]
    pub fn store_file(&self, file_id: &str, reader: impl Read) -> Result<Manifest> {
        let _guard = self.inner.lock.lock_exclusive()?;
        let mut index = self.inner.index.write().expect("index lock poisoned");

        let mut block_hashes = Vec::new();
        let mut total_length = 0u64;
        let mut newly_written: Vec<BlockHash> = Vec::new();
        let mut txn = Transaction::new();

        let result: Result<()> = (|| {
            for chunk in Chunker::new(reader, self.inner.config.block_size) {
                let chunk = chunk.map_err(|source| Error::ReadSourceFile {
                    path: PathBuf::new(),
                    source,
                })?;
                total_length += chunk.len();
                if index.lookup_block(&chunk.hash).is_none() {
                    if self.inner.blockdir.write(&chunk.hash, &chunk.bytes)? == WriteOutcome::Written
                    {
                        newly_written.push(chunk.hash.clone());
                    }
                    txn.push(Mutation::InsertBlock {
                        hash: chunk.hash.clone(),
                        length: chunk.len(),
                    });
                }
                txn.push(Mutation::Incref {
                    hash: chunk.hash.clone(),
                });
                block_hashes.push(chunk.hash);
            }
            Ok(())
        })();

        if let Err(err) = result {
            for hash in &newly_written {
                // Best-effort: the block was never referenced by any
                // manifest, so leaving it behind is a leaked block, not a
                // correctness problem, and will be reclaimed by GC.
                if let Err(cleanup_err) = self.inner.blockdir.delete(hash) {
                    warn!(%hash, %cleanup_err, "failed to roll back block after aborted store_file");
                }
            }
            return Err(err);
        }

        let manifest = Manifest {
            block_hashes,
            total_length,
        };

        let mut decref_candidates = Vec::new();
        if let Some(previous) = index.get_manifest(file_id).cloned() {
            for hash in previous.block_hashes {
                txn.push(Mutation::Decref { hash: hash.clone() });
                decref_candidates.push(hash);
            }
        }
        txn.push(Mutation::PutManifest {
            file_id: file_id.to_string(),
            manifest: manifest.clone(),
        });

        index.commit(txn)?;
        self.delete_blocks_dropped_to_zero(&index, &decref_candidates)?;
        Ok(manifest)
    }

    /// Convenience wrapper over [`Cache::store_file`] that reads from a path
    /// on disk rather than an arbitrary `Read`, matching the engine API
    /// table's `store_file(path, file_id?)` signature (§6.4) and reporting
    /// the source path on failure, which the generic `Read`-based entry
    /// point cannot do on its own.
    pub fn store_file_from_path(&self, source_path: &Path, file_id: &str) -> Result<Manifest> {
        let f = File::open(source_path).map_err(|source| Error::ReadSourceFile {
            path: source_path.to_owned(),
            source,
        })?;
        self.store_file(file_id, std::io::BufReader::new(f))
    }

    /// Reassemble `file_id`'s blocks, in order, writing them to `writer`.
    #[instrument(skip(self, writer))]
    pub fn retrieve_file(&self, file_id: &str, mut writer: impl Write) -> Result<()> {
        let _guard = self.inner.lock.lock_shared()?;
        let index = self.inner.index.read().expect("index lock poisoned");
        let manifest = index
            .get_manifest(file_id)
            .ok_or_else(|| Error::FileNotFound {
                file_id: file_id.to_string(),
            })?
            .clone();
        let lengths: Vec<u64> = manifest
            .block_hashes
            .iter()
            .map(|hash| {
                index
                    .lookup_block(hash)
                    .map(|entry| entry.length)
                    .ok_or_else(|| Error::BlockMissing { hash: hash.clone() })
            })
            .collect::<Result<_>>()?;
        drop(index);

        for (hash, length) in manifest.block_hashes.iter().zip(lengths) {
            let bytes = self.inner.blockdir.read(hash, length)?;
            writer
                .write_all(&bytes)
                .map_err(|source| Error::WriteDestinationFile {
                    path: PathBuf::new(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Convenience wrapper over [`Cache::retrieve_file`] that writes to a
    /// fresh file at `dest`, atomically (write-to-temp-then-rename), rather
    /// than to an arbitrary `Write`.
    pub fn retrieve_file_to_path(&self, file_id: &str, dest: &Path) -> Result<()> {
        let tmp_path = dest.with_extension("bvtmp");
        let f = File::create(&tmp_path).map_err(|source| Error::WriteDestinationFile {
            path: tmp_path.clone(),
            source,
        })?;
        let mut writer = BufWriter::new(f);
        self.retrieve_file(file_id, &mut writer)?;
        writer.flush().map_err(|source| Error::WriteDestinationFile {
            path: tmp_path.clone(),
            source,
        })?;
        drop(writer);
        fs::rename(&tmp_path, dest).map_err(|source| Error::WriteDestinationFile {
            path: dest.to_owned(),
            source,
        })
    }

    /// Drop `file_id`'s manifest and decref every block it referenced,
    /// deleting any block that reaches a zero refcount as a result.
    #[instrument(skip(self))]
    pub fn remove_file(&self, file_id: &str) -> Result<()> {
        let _guard = self.inner.lock.lock_exclusive()?;
        let mut index = self.inner.index.write().expect("index lock poisoned");
        let manifest = index
            .get_manifest(file_id)
            .ok_or_else(|| Error::FileNotFound {
                file_id: file_id.to_string(),
            })?
            .clone();

        let mut txn = Transaction::new();
        for hash in &manifest.block_hashes {
            txn.push(Mutation::Decref { hash: hash.clone() });
        }
        txn.push(Mutation::DeleteManifest {
            file_id: file_id.to_string(),
        });
        index.commit(txn)?;
        self.delete_blocks_dropped_to_zero(&index, &manifest.block_hashes)?;
        Ok(())
    }

    /// Delete on disk any of `candidates` the index no longer references.
    ///
    /// The index already drops a `BlockEntry` as soon as its refcount hits
    /// zero (see `index::apply_transaction`); a candidate hash missing from
    /// `index.lookup_block` after the commit is exactly the set that just
    /// became garbage, so this is the only place `Cache` needs to delete
    /// block files rather than leaving that entirely to `collect_garbage`.
    fn delete_blocks_dropped_to_zero(&self, index: &Index, candidates: &[BlockHash]) -> Result<()> {
        for hash in candidates {
            if index.lookup_block(hash).is_none() {
                self.inner.blockdir.delete(hash)?;
            }
        }
        Ok(())
    }

    pub fn exists(&self, file_id: &str) -> bool {
        let index = self.inner.index.read().expect("index lock poisoned");
        index.contains_file(file_id)
    }

    /// The current refcount of a block, or `None` if it isn't known to the
    /// index (either never stored or already collected).
    pub fn block_refcount(&self, hash: &BlockHash) -> Option<u64> {
        let index = self.inner.index.read().expect("index lock poisoned");
        index.lookup_block(hash).map(|entry| entry.refcount)
    }

    pub fn list_file_ids(&self) -> Vec<FileId> {
        let index = self.inner.index.read().expect("index lock poisoned");
        index.list_file_ids()
    }

    pub fn stats(&self) -> CacheStats {
        let index = self.inner.index.read().expect("index lock poisoned");
        index.aggregate_stats().into()
    }

    /// Delete every on-disk block with no entry in the index.
    ///
    /// The index itself never holds a zero-refcount entry, so this only
    /// needs to reconcile one direction: block files present on disk with
    /// no corresponding index entry at all. That window can open briefly
    /// between `BlockDir::write` and the index commit that references it
    /// (or be left behind by a process that crashed between the two) —
    /// this sweep is how the cache catches up.
    #[instrument(skip(self))]
    pub fn collect_garbage(&self) -> Result<GcStats> {
        let _guard = self.inner.lock.lock_exclusive()?;
        let index = self.inner.index.read().expect("index lock poisoned");
        let known: std::collections::HashSet<BlockHash> =
            index.all_block_hashes().into_iter().collect();
        drop(index);

        let mut stats = GcStats::default();
        for hash in self.inner.blockdir.block_names()? {
            if known.contains(&hash) {
                continue;
            }
            if let Ok(len) = self.inner.blockdir.size_on_disk(&hash) {
                stats.bytes_reclaimed += len;
            }
            self.inner.blockdir.delete(&hash)?;
            stats.blocks_deleted += 1;
        }
        info!(blocks_deleted = stats.blocks_deleted, "garbage collection complete");
        Ok(stats)
    }

    /// Re-read and re-hash every block referenced by the index, reporting
    /// any that are missing or whose content no longer matches its hash.
    #[instrument(skip(self))]
    pub fn validate(&self) -> Result<ValidateReport> {
        let _guard = self.inner.lock.lock_shared()?;
        let index = self.inner.index.read().expect("index lock poisoned");
        let hashes = index.all_block_hashes();
        let entries: Vec<_> = hashes
            .iter()
            .filter_map(|h| index.lookup_block(h).map(|e| (h.clone(), e)))
            .collect();
        drop(index);

        let mut report = ValidateReport {
            blocks_checked: entries.len(),
            ..Default::default()
        };
        for (hash, entry) in entries {
            match self.inner.blockdir.read_verified(&hash, entry.length) {
                Ok(_) => {}
                Err(Error::BlockFileMissing { .. }) | Err(Error::ReadBlock { .. }) => {
                    report.missing_blocks.push(hash);
                }
                Err(Error::BlockCorrupt { .. }) | Err(Error::BlockHashMismatch { .. }) => {
                    report.corrupt_blocks.push(hash);
                }
                Err(other) => return Err(other),
            }
        }
        Ok(report)
    }

    /// Write a fresh index snapshot and truncate the journal.
    pub fn compact_index(&self) -> Result<()> {
        let _guard = self.inner.lock.lock_exclusive()?;
        let mut index = self.inner.index.write().expect("index lock poisoned");
        index.compact()
    }
}

/// Placeholder kept for API discoverability: there is no persistent
/// connection or background task to stop, so closing a [`Cache`] is just
/// dropping it. Exists so callers migrating from engines that do need an
/// explicit close have a call to replace it with (§9).
impl Cache {
    pub fn close(self) {
        drop(self);
    }
}
