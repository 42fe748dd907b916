// BlockVault content-addressed cache.
// Copyright 2024 The BlockVault Authors.

// This program is free software; you can redistribute it and/or modify
// it under the terms of the MIT license. See LICENSE for details.

//! The Index: the in-memory and on-disk catalog of which blocks exist, how
//! many manifests reference each one, and which manifest corresponds to
//! each stored file id.
//!
//! Durability follows a snapshot-plus-journal design (§4.3, §6.2): the
//! index is periodically written out whole as `index/snapshot.json`, and
//! every mutation between snapshots is appended to `index/journal.log` as
//! one newline-delimited JSON [`Transaction`], fsynced before the call that
//! produced it returns. Opening the cache replays the last snapshot plus
//! every complete transaction after it. A journal line that fails to parse
//! is treated as the tail of a write that was interrupted by a crash
//! mid-append (P6): it is logged and ignored rather than rejected, since
//! the operation that produced it never observably completed.
//!
//! `Index` itself holds no lock; `Cache` wraps it in an `Arc<RwLock<Index>>`
//! and is responsible for serializing mutations (§6.4: one cache-wide
//! reader/writer lock, not one per block).

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::errors::{Error, Result};
use crate::hash::BlockHash;
use crate::manifest::{FileId, Manifest};

const SNAPSHOT_FILE_NAME: &str = "snapshot.json";
const JOURNAL_FILE_NAME: &str = "journal.log";

/// What the index knows about one block, independent of which files
/// reference it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEntry {
    pub length: u64,
    pub refcount: u64,
}

/// One indivisible change to the index.
///
/// A single high-level cache operation (`store_file`, `remove_file`, ...)
/// produces a [`Transaction`] containing every `Mutation` it needs, applied
/// in order; the whole transaction is appended to the journal as one line,
/// so a reader replaying the journal never observes it half-applied.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Mutation {
    InsertBlock { hash: BlockHash, length: u64 },
    Incref { hash: BlockHash },
    Decref { hash: BlockHash },
    PutManifest { file_id: FileId, manifest: Manifest },
    DeleteManifest { file_id: FileId },
}

/// A group of [`Mutation`]s that must be applied, and replayed, as a unit.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Transaction {
    pub mutations: Vec<Mutation>,
}

impl Transaction {
    pub fn new() -> Transaction {
        Transaction::default()
    }

    pub fn push(&mut self, mutation: Mutation) {
        self.mutations.push(mutation);
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }
}

/// Snapshot of the whole index, written out by [`Index::compact`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    blocks: HashMap<BlockHash, BlockEntry>,
    manifests: HashMap<FileId, Manifest>,
}

/// Aggregate counters reported by [`Index::aggregate_stats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub file_count: usize,
    pub distinct_block_count: usize,
    pub total_distinct_bytes: u64,
    pub total_logical_bytes: u64,
}

/// The in-memory catalog, backed by a snapshot file and an append-only
/// journal on disk.
#[derive(Debug)]
pub struct Index {
    blocks: HashMap<BlockHash, BlockEntry>,
    manifests: HashMap<FileId, Manifest>,
    index_dir: PathBuf,
    journal: File,
}

impl Index {
    /// Open (or initialize) the index rooted at `index_dir`, replaying the
    /// snapshot and any journal entries written since.
    #[instrument(skip_all)]
    pub fn open(index_dir: &Path) -> Result<Index> {
        fs::create_dir_all(index_dir).map_err(|source| Error::CreateCacheDir {
            path: index_dir.to_owned(),
            source,
        })?;
        let snapshot = Self::read_snapshot(index_dir)?;
        let mut blocks = snapshot.blocks;
        let mut manifests = snapshot.manifests;
        let journal_path = index_dir.join(JOURNAL_FILE_NAME);
        Self::replay_journal(&journal_path, &mut blocks, &mut manifests)?;
        let journal = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&journal_path)
            .map_err(|source| Error::WriteIndex {
                path: journal_path.clone(),
                source,
            })?;
        Ok(Index {
            blocks,
            manifests,
            index_dir: index_dir.to_owned(),
            journal,
        })
    }

    fn read_snapshot(index_dir: &Path) -> Result<Snapshot> {
        let path = index_dir.join(SNAPSHOT_FILE_NAME);
        match fs::read(&path) {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|source| Error::DeserializeIndex {
                    path,
                    line: 0,
                    source,
                })
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Snapshot::default()),
            Err(source) => Err(Error::ReadIndex { path, source }),
        }
    }

    fn replay_journal(
        journal_path: &Path,
        blocks: &mut HashMap<BlockHash, BlockEntry>,
        manifests: &mut HashMap<FileId, Manifest>,
    ) -> Result<()> {
        let file = match File::open(journal_path) {
            Ok(f) => f,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(source) => {
                return Err(Error::ReadIndex {
                    path: journal_path.to_owned(),
                    source,
                })
            }
        };
        let reader = BufReader::new(file);
        for (line_no, line) in reader.lines().enumerate() {
            let line = line.map_err(|source| Error::ReadIndex {
                path: journal_path.to_owned(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Transaction>(&line) {
                Ok(txn) => apply_transaction(blocks, manifests, &txn),
                Err(source) => {
                    // A partial trailing line means the process crashed mid
                    // append (P6): the write never completed, so the
                    // mutations it would have contained never took effect.
                    // Anything after it is unreachable, so stop here rather
                    // than treating later good-looking lines as valid.
                    warn!(
                        path = %journal_path.display(),
                        line = line_no,
                        %source,
                        "ignoring unparsable tail of index journal (likely an interrupted write)"
                    );
                    break;
                }
            }
        }
        Ok(())
    }

    /// Apply and durably append one transaction.
    ///
    /// The journal line is written and fsynced before this returns, so a
    /// crash immediately after is equivalent to a crash before: the caller
    /// observes the operation either fully applied or not at all.
    #[instrument(skip_all)]
    pub fn commit(&mut self, txn: Transaction) -> Result<()> {
        if txn.is_empty() {
            return Ok(());
        }
        let mut line = serde_json::to_vec(&txn).map_err(|source| Error::SerializeIndex { source })?;
        line.push(b'\n');
        self.journal
            .write_all(&line)
            .map_err(|source| Error::WriteIndex {
                path: self.journal_path(),
                source,
            })?;
        self.journal.sync_all().map_err(|source| Error::WriteIndex {
            path: self.journal_path(),
            source,
        })?;
        apply_transaction(&mut self.blocks, &mut self.manifests, &txn);
        Ok(())
    }

    fn journal_path(&self) -> PathBuf {
        self.index_dir.join(JOURNAL_FILE_NAME)
    }

    /// Write a fresh snapshot reflecting the current in-memory state and
    /// truncate the journal, so future opens replay a shorter history.
    ///
    /// Not called automatically: `Cache` decides when compaction is worth
    /// its cost (§6.2 leaves the policy unspecified).
    #[instrument(skip_all)]
    pub fn compact(&mut self) -> Result<()> {
        let snapshot = Snapshot {
            blocks: self.blocks.clone(),
            manifests: self.manifests.clone(),
        };
        let snapshot_path = self.index_dir.join(SNAPSHOT_FILE_NAME);
        let tmp_path = self
            .index_dir
            .join(format!(".{SNAPSHOT_FILE_NAME}.tmp-{}", std::process::id()));
        let bytes = serde_json::to_vec(&snapshot).map_err(|source| Error::SerializeIndex { source })?;
        fs::write(&tmp_path, &bytes).map_err(|source| Error::WriteIndex {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &snapshot_path).map_err(|source| Error::WriteIndex {
            path: snapshot_path.clone(),
            source,
        })?;
        let journal_path = self.journal_path();
        self.journal = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&journal_path)
            .map_err(|source| Error::WriteIndex {
                path: journal_path.clone(),
                source,
            })?;
        // Reopen for subsequent appends.
        self.journal = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&journal_path)
            .map_err(|source| Error::WriteIndex {
                path: journal_path,
                source,
            })?;
        debug!(
            blocks = self.blocks.len(),
            manifests = self.manifests.len(),
            "compacted index snapshot"
        );
        Ok(())
    }

    // --- Read-only queries -------------------------------------------------

    pub fn lookup_block(&self, hash: &BlockHash) -> Option<BlockEntry> {
        self.blocks.get(hash).copied()
    }

    pub fn get_manifest(&self, file_id: &str) -> Option<&Manifest> {
        self.manifests.get(file_id)
    }

    pub fn contains_file(&self, file_id: &str) -> bool {
        self.manifests.contains_key(file_id)
    }

    pub fn list_file_ids(&self) -> Vec<FileId> {
        self.manifests.keys().cloned().collect()
    }

    /// Every block hash currently known to the index, used by garbage
    /// collection to decide which on-disk blocks are unreferenced.
    pub fn all_block_hashes(&self) -> Vec<BlockHash> {
        self.blocks.keys().cloned().collect()
    }

    pub fn aggregate_stats(&self) -> IndexStats {
        IndexStats {
            file_count: self.manifests.len(),
            distinct_block_count: self.blocks.len(),
            total_distinct_bytes: self.blocks.values().map(|e| e.length).sum(),
            total_logical_bytes: self.manifests.values().map(|m| m.total_length).sum(),
        }
    }
}

/// Apply every mutation in `txn` to the in-memory maps, in order.
///
/// This is the single code path used both when committing a new
/// transaction and when replaying the journal on open, so the two can
/// never disagree about what a transaction means.
fn apply_transaction(
    blocks: &mut HashMap<BlockHash, BlockEntry>,
    manifests: &mut HashMap<FileId, Manifest>,
    txn: &Transaction,
) {
    for mutation in &txn.mutations {
        match mutation {
            Mutation::InsertBlock { hash, length } => {
                blocks.entry(hash.clone()).or_insert(BlockEntry {
                    length: *length,
                    refcount: 0,
                });
            }
            Mutation::Incref { hash } => {
                if let Some(entry) = blocks.get_mut(hash) {
                    entry.refcount += 1;
                }
            }
            Mutation::Decref { hash } => {
                if let Some(entry) = blocks.get_mut(hash) {
                    entry.refcount = entry.refcount.saturating_sub(1);
                    if entry.refcount == 0 {
                        blocks.remove(hash);
                    }
                }
            }
            Mutation::PutManifest { file_id, manifest } => {
                manifests.insert(file_id.clone(), manifest.clone());
            }
            Mutation::DeleteManifest { file_id } => {
                manifests.remove(file_id);
            }
        }
    }
}
