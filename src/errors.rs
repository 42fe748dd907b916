// BlockVault content-addressed cache.
// Copyright 2024 The BlockVault Authors.

// This program is free software; you can redistribute it and/or modify
// it under the terms of the MIT license. See LICENSE for details.

//! Error types.
//!
//! Every fallible operation returns a [`Result`] carrying a single
//! [`Error`] enum. Each variant names the path, hash, or file id at fault,
//! and [`Error::category`] projects it onto the five-member taxonomy that
//! callers are expected to branch on (§7 of the design).

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::hash::BlockHash;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The coarse failure category a caller should branch on.
///
/// Individual [`Error`] variants are more specific (for logging and
/// diagnostics); `category()` collapses them onto this fixed set so
/// bindings in other languages don't need to match on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Io,
    NotFound,
    Integrity,
    ConfigMismatch,
    /// Reserved: nothing currently constructs an [`Error`] in this category.
    /// The block store signals "already present" through
    /// [`crate::blockdir::WriteOutcome::AlreadyExists`] rather than an error.
    AlreadyExists,
}

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to create cache directory {path:?}")]
    CreateCacheDir { path: PathBuf, source: io::Error },

    #[error("failed to create block subdirectory {path:?}")]
    CreateBlockSubdir { path: PathBuf, source: io::Error },

    #[error("failed to write block {hash}")]
    WriteBlock { hash: BlockHash, source: io::Error },

    #[error("failed to read block {hash}")]
    ReadBlock { hash: BlockHash, source: io::Error },

    #[error("block {hash} is missing from the blockdir")]
    BlockMissing { hash: BlockHash },

    #[error("block {hash} is referenced by the index but its file is missing on disk")]
    BlockFileMissing { hash: BlockHash, source: io::Error },

    #[error(
        "block {hash} on disk is {actual_len} bytes but the manifest expects {expected_len}"
    )]
    BlockCorrupt {
        hash: BlockHash,
        actual_len: u64,
        expected_len: u64,
    },

    #[error("block {hash} content does not match its hash (rehashed to {rehashed})")]
    BlockHashMismatch { hash: BlockHash, rehashed: BlockHash },

    #[error("failed to list blocks under {path:?}")]
    ListBlocks { path: PathBuf, source: io::Error },

    #[error("file {file_id:?} is not in the cache")]
    FileNotFound { file_id: String },

    #[error("cache directory {path:?} does not contain a config file; pass create=true to initialize it")]
    NotACache { path: PathBuf },

    #[error(
        "cache was created with block_size={existing_block_size} but opened with \
        block_size={requested_block_size}"
    )]
    BlockSizeMismatch {
        existing_block_size: u64,
        requested_block_size: u64,
    },

    #[error(
        "cache was created with hash_algorithm={existing:?} but this build uses {requested:?}"
    )]
    HashAlgorithmMismatch { existing: String, requested: String },

    #[error("cache config version {version} is not supported by this build")]
    UnsupportedConfigVersion { version: u32 },

    #[error("failed to read config file {path:?}")]
    ReadConfig { path: PathBuf, source: io::Error },

    #[error("failed to write config file {path:?}")]
    WriteConfig { path: PathBuf, source: io::Error },

    #[error("failed to parse config file {path:?}")]
    ParseConfig {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to read index journal {path:?}")]
    ReadIndex { path: PathBuf, source: io::Error },

    #[error("failed to write index journal {path:?}")]
    WriteIndex { path: PathBuf, source: io::Error },

    #[error("failed to serialize index record")]
    SerializeIndex { source: serde_json::Error },

    #[error("failed to deserialize index record in {path:?} at line {line}")]
    DeserializeIndex {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },

    #[error("failed to read source file {path:?}")]
    ReadSourceFile { path: PathBuf, source: io::Error },

    #[error("failed to write destination file {path:?}")]
    WriteDestinationFile { path: PathBuf, source: io::Error },

    #[error("failed to acquire {kind} lock on {path:?}")]
    Lock {
        kind: &'static str,
        path: PathBuf,
        source: io::Error,
    },

    #[error(transparent)]
    IoError {
        #[from]
        source: io::Error,
    },
}

impl Error {
    /// Project this error onto the coarse taxonomy of §7.
    pub fn category(&self) -> ErrorCategory {
        use Error::*;
        match self {
            FileNotFound { .. } | BlockMissing { .. } => ErrorCategory::NotFound,
            BlockFileMissing { .. } | BlockCorrupt { .. } | BlockHashMismatch { .. } => {
                ErrorCategory::Integrity
            }
            NotACache { .. }
            | BlockSizeMismatch { .. }
            | HashAlgorithmMismatch { .. }
            | UnsupportedConfigVersion { .. } => ErrorCategory::ConfigMismatch,
            _ => ErrorCategory::Io,
        }
    }
}
