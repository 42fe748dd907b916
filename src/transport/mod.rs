// BlockVault content-addressed cache.
// Copyright 2024 The BlockVault Authors.

// This program is free software; you can redistribute it and/or modify
// it under the terms of the MIT license. See LICENSE for details.

//! Filesystem abstraction used by the blockdir, the index, and the config
//! file, so that every on-disk write in the cache goes through the same
//! write-to-temp-then-rename primitive.
//!
//! The core only ever talks to a local disk (§1: transport/download is an
//! external collaborator) but keeping this as a narrow trait rather than
//! calling `std::fs` directly throughout the engine keeps the atomic-write
//! discipline in one place and makes it straightforward to substitute a
//! logging or in-memory transport in tests.

use std::io;
use std::path::Path;

pub mod local;

pub use local::LocalTransport;

/// Prefix used for temporary files created during an atomic write.
///
/// Any file seen with this prefix during a directory listing is a leftover
/// from an interrupted write and must never be treated as a block, a
/// config, or an index record.
pub const TMP_PREFIX: &str = ".bvtmp-";

/// The kind of filesystem entry named by a [`DirEntry`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Kind {
    File,
    Dir,
    Other,
}

/// Metadata about a single file, as returned by [`Transport::metadata`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Metadata {
    pub kind: Kind,
    pub len: u64,
}

/// The result of listing a directory: subdirectories and regular files,
/// with any stray temp files from interrupted writes filtered out.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ListDir {
    pub dirs: Vec<String>,
    pub files: Vec<String>,
}

/// Abstracted filesystem access rooted at a single directory.
///
/// All paths passed to these methods are relative to that root and use
/// forward slashes regardless of platform.
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// List the immediate contents of a directory under this transport.
    ///
    /// Returns an empty [`ListDir`] if the directory does not exist.
    fn list_dir(&self, relpath: &str) -> io::Result<ListDir>;

    /// Read a complete file into memory.
    fn read_file(&self, relpath: &str) -> io::Result<Vec<u8>>;

    /// True if `relpath` names an existing file or directory.
    fn exists(&self, relpath: &str) -> io::Result<bool>;

    /// Stat a single entry.
    fn metadata(&self, relpath: &str) -> io::Result<Metadata>;

    /// Create a directory (and any missing ancestors under the root), if it
    /// does not already exist.
    fn create_dir(&self, relpath: &str) -> io::Result<()>;

    /// Write a complete file, atomically: content is written to a sibling
    /// temporary file (named with [`TMP_PREFIX`]) and renamed into place,
    /// so a reader never observes a partially written file under its final
    /// name.
    fn write_file(&self, relpath: &str, content: &[u8]) -> io::Result<()>;

    /// Remove a file. Not an error if it is already absent.
    fn remove_file(&self, relpath: &str) -> io::Result<()>;

    /// The absolute filesystem path backing `relpath`, for opening files
    /// that need their own handle (e.g. the append-only index journal, or
    /// the lock sentinel).
    fn local_path(&self, relpath: &str) -> Option<std::path::PathBuf>;
}

impl dyn Transport {
    pub fn local(root: &Path) -> LocalTransport {
        LocalTransport::new(root)
    }
}
