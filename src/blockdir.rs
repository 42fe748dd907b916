// BlockVault content-addressed cache.
// Copyright 2024 The BlockVault Authors.

// This program is free software; you can redistribute it and/or modify
// it under the terms of the MIT license. See LICENSE for details.

//! The Block Store: persists and retrieves immutable byte sequences keyed
//! by content hash.
//!
//! Blocks live at `<cache_dir>/blocks/<shard>/<hash>`, where `<shard>` is
//! the first two hex characters of the hash (§6.1): 256 shards, bounding
//! the number of entries in any one directory regardless of cache size.
//!
//! The Index (not this module) is the authoritative catalog of which
//! blocks exist (§6.3) — `BlockDir` itself never needs to scan the
//! filesystem to answer "do I have this block", only to read or write its
//! bytes. Scanning is reserved for maintenance operations: [`BlockDir::block_names`]
//! backs `Cache::collect_garbage` and `Cache::validate`.

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use rayon::prelude::*;
use tracing::{instrument, trace, warn};

use crate::errors::{Error, Result};
use crate::hash::BlockHash;
use crate::transport::{Kind, Transport};

/// Number of leading hex characters of the hash used as the shard name.
pub const SHARD_NAME_CHARS: usize = 2;

fn shard_relpath(hash: &BlockHash) -> String {
    hash.shard_prefix(SHARD_NAME_CHARS)
}

/// The transport-relative path of the block file for `hash`.
pub fn block_relpath(hash: &BlockHash) -> String {
    format!("{}/{}", shard_relpath(hash), hash)
}

/// The outcome of [`BlockDir::write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The block was not previously present and has now been written.
    Written,
    /// A block with this hash was already on disk; nothing was written.
    /// Safe because blocks are immutable and addressed by content: an
    /// existing file under this name is byte-identical by construction.
    AlreadyExists,
}

/// A directory of content-addressed, immutable block files.
#[derive(Debug)]
pub struct BlockDir {
    transport: Arc<dyn Transport>,
}

impl BlockDir {
    pub fn new(transport: Arc<dyn Transport>) -> BlockDir {
        BlockDir { transport }
    }

    pub fn create(transport: Arc<dyn Transport>) -> Result<BlockDir> {
        transport
            .create_dir("")
            .map_err(|source| Error::CreateBlockSubdir {
                path: transport.local_path("").unwrap_or_default(),
                source,
            })?;
        Ok(BlockDir::new(transport))
    }

    /// Write a block's bytes under its content hash, unless a block with
    /// that hash is already present.
    ///
    /// The caller is responsible for having computed `hash` as the hash of
    /// `bytes`; this is not re-verified here (the expensive path is
    /// re-verification on read, not on write, per §4.2).
    #[instrument(skip(self, bytes))]
    pub fn write(&self, hash: &BlockHash, bytes: &[u8]) -> Result<WriteOutcome> {
        let relpath = block_relpath(hash);
        if self
            .transport
            .exists(&relpath)
            .map_err(|source| Error::WriteBlock {
                hash: hash.clone(),
                source,
            })?
        {
            trace!(%hash, "block already present, skipping write");
            return Ok(WriteOutcome::AlreadyExists);
        }
        self.transport
            .create_dir(&shard_relpath(hash))
            .map_err(|source| Error::CreateBlockSubdir {
                path: self
                    .transport
                    .local_path(&shard_relpath(hash))
                    .unwrap_or_default(),
                source,
            })?;
        self.transport
            .write_file(&relpath, bytes)
            .map_err(|source| Error::WriteBlock {
                hash: hash.clone(),
                source,
            })?;
        Ok(WriteOutcome::Written)
    }

    /// True if a block file exists for `hash`.
    ///
    /// This performs a filesystem stat. On the hot path, prefer consulting
    /// the Index, which tracks existence in memory without touching disk.
    pub fn contains(&self, hash: &BlockHash) -> Result<bool> {
        let relpath = block_relpath(hash);
        match self.transport.metadata(&relpath) {
            Ok(meta) => Ok(meta.kind == Kind::File && meta.len > 0),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(Error::ReadBlock {
                hash: hash.clone(),
                source,
            }),
        }
    }

    /// The on-disk size of a block, independent of what the index expects
    /// it to be. Used when deleting an unreferenced block during garbage
    /// collection, where there is by definition no index entry to check
    /// against.
    pub fn size_on_disk(&self, hash: &BlockHash) -> Result<u64> {
        let relpath = block_relpath(hash);
        let meta = self
            .transport
            .metadata(&relpath)
            .map_err(|source| Error::ReadBlock {
                hash: hash.clone(),
                source,
            })?;
        Ok(meta.len)
    }

    /// Read back the complete contents of a block.
    ///
    /// `expected_len` is the length recorded for this hash in the Index.
    /// If the on-disk file's size doesn't match, this is reported as
    /// [`Error::BlockCorrupt`] rather than silently returning truncated or
    /// padded data.
    #[instrument(skip(self))]
    pub fn read(&self, hash: &BlockHash, expected_len: u64) -> Result<Bytes> {
        let relpath = block_relpath(hash);
        let meta = self.transport.metadata(&relpath).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                Error::BlockFileMissing {
                    hash: hash.clone(),
                    source,
                }
            } else {
                Error::ReadBlock {
                    hash: hash.clone(),
                    source,
                }
            }
        })?;
        if meta.len != expected_len {
            return Err(Error::BlockCorrupt {
                hash: hash.clone(),
                actual_len: meta.len,
                expected_len,
            });
        }
        let bytes = self.transport.read_file(&relpath).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                Error::BlockFileMissing {
                    hash: hash.clone(),
                    source,
                }
            } else {
                Error::ReadBlock {
                    hash: hash.clone(),
                    source,
                }
            }
        })?;
        Ok(Bytes::from(bytes))
    }

    /// Read back a block and confirm its bytes still hash to `hash`.
    ///
    /// Used by [`crate::engine::Cache::validate`]; too expensive to run on
    /// every `read` (§4.2 explicitly leaves unconditional verification out
    /// of the hot path).
    pub fn read_verified(&self, hash: &BlockHash, expected_len: u64) -> Result<Bytes> {
        let bytes = self.read(hash, expected_len)?;
        let rehashed = BlockHash::hash_bytes(&bytes);
        if rehashed != *hash {
            return Err(Error::BlockHashMismatch {
                hash: hash.clone(),
                rehashed,
            });
        }
        Ok(bytes)
    }

    /// Delete a block's file. Missing files are tolerated: the Index is
    /// authoritative, so a block already absent on disk is not an error to
    /// the caller (it may be cleaning up after a previous partial GC).
    pub fn delete(&self, hash: &BlockHash) -> Result<()> {
        self.transport
            .remove_file(&block_relpath(hash))
            .map_err(|source| Error::WriteBlock {
                hash: hash.clone(),
                source,
            })
    }

    fn shard_names(&self) -> Result<Vec<String>> {
        let listing = self
            .transport
            .list_dir("")
            .map_err(|source| Error::ListBlocks {
                path: self.transport.local_path("").unwrap_or_default(),
                source,
            })?;
        let mut dirs = listing.dirs;
        dirs.retain(|name| {
            let ok =
                name.len() == SHARD_NAME_CHARS && name.chars().all(|c| c.is_ascii_hexdigit());
            if !ok {
                warn!(shard = %name, "unexpected entry in blockdir, ignoring");
            }
            ok
        });
        Ok(dirs)
    }

    /// All block hashes present on disk, in arbitrary order.
    ///
    /// This is a filesystem scan, not an index read: used only by
    /// maintenance operations (`validate`, `collect_garbage`), never on the
    /// store/retrieve/remove hot path.
    pub fn block_names(&self) -> Result<Vec<BlockHash>> {
        let shards = self.shard_names()?;
        let transport = self.transport.clone();
        let hashes: Vec<BlockHash> = shards
            .into_par_iter()
            .map(|shard| {
                transport
                    .list_dir(&shard)
                    .map_err(|source| Error::ListBlocks {
                        path: transport.local_path(&shard).unwrap_or_default(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .flat_map(|listing| listing.files)
            .filter_map(|name| name.parse::<BlockHash>().ok())
            .collect();
        Ok(hashes)
    }
}
