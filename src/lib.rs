// BlockVault content-addressed cache.
// Copyright 2024 The BlockVault Authors.

// This program is free software; you can redistribute it and/or modify
// it under the terms of the MIT license. See LICENSE for details.

//! A content-addressed, block-deduplicated file cache.
//!
//! Files are split into fixed-size blocks ([`chunker`]), each addressed by
//! the BLAKE3 hash of its bytes ([`hash`]); identical blocks, whether
//! within one file or shared across many, are stored exactly once
//! ([`blockdir`]). A reference-counted catalog ([`index`]) tracks which
//! blocks exist and which file ids reconstitute from which block sequences
//! ([`manifest`]), durable across process restarts and crashes via a
//! snapshot-plus-journal persistence scheme.
//!
//! [`engine::Cache`] is the entry point most callers want:
//!
//! ```no_run
//! use std::path::Path;
//! use blockvault::{Cache, OpenOptions};
//!
//! # fn main() -> blockvault::Result<()> {
//! let cache = Cache::open(Path::new("/tmp/example-cache"), OpenOptions {
//!     create: true,
//!     block_size: None,
//! })?;
//! let file_id = Cache::new_file_id();
//! cache.store_file(&file_id, "hello world".as_bytes())?;
//! let mut out = Vec::new();
//! cache.retrieve_file(&file_id, &mut out)?;
//! assert_eq!(out, b"hello world");
//! # Ok(())
//! # }
//! ```

pub mod blockdir;
pub mod chunker;
pub mod config;
pub mod engine;
pub mod errors;
pub mod hash;
pub mod index;
pub mod lock;
pub mod manifest;
pub mod misc;
pub mod transport;

pub mod test_fixtures;

pub use blockdir::BlockDir;
pub use chunker::{Chunk, Chunker};
pub use config::{Config, DEFAULT_BLOCK_SIZE};
pub use engine::{Cache, CacheStats, GcStats, OpenOptions, ValidateReport};
pub use errors::{Error, ErrorCategory, Result};
pub use hash::{BlockHash, HASH_ALGORITHM};
pub use index::{BlockEntry, IndexStats};
pub use manifest::{FileId, Manifest};

/// The crate version, as recorded in `Cargo.toml`.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
