// BlockVault content-addressed cache.
// Copyright 2024 The BlockVault Authors.

// This program is free software; you can redistribute it and/or modify
// it under the terms of the MIT license. See LICENSE for details.

//! Content addresses for blocks.
//!
//! Every block is identified by the BLAKE3 hash of its uncompressed bytes,
//! hex-encoded for use as a filename and as a JSON map key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Number of raw bytes in a [`BlockHash`]. BLAKE3 produces a 256-bit digest.
pub const HASH_SIZE_BYTES: usize = 32;

/// The name of the hash algorithm recorded in the cache's `config` file.
///
/// Opening a cache whose recorded algorithm doesn't match this constant
/// fails with [`crate::Error::ConfigMismatch`] rather than silently
/// reinterpreting old block names under a new algorithm.
pub const HASH_ALGORITHM: &str = "blake3-256";

/// The content address of a [`crate::Chunk`]: the BLAKE3 hash of its bytes.
///
/// Hex-encoded, this is also the block's filename within the blockdir, and
/// the key under which its [`crate::index::BlockEntry`] is stored.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct BlockHash(Box<[u8; HASH_SIZE_BYTES]>);

impl BlockHash {
    /// Hash a complete block of bytes.
    pub fn hash_bytes(bytes: &[u8]) -> BlockHash {
        BlockHash(Box::new(*blake3::hash(bytes).as_bytes()))
    }

    /// The first `n` hex characters, used to form the blockdir shard name.
    pub fn shard_prefix(&self, n: usize) -> String {
        self.to_string()[..n].to_owned()
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0.as_ref()))
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({self})")
    }
}

impl FromStr for BlockHash {
    type Err = BlockHashParseError;

    fn from_str(s: &str) -> Result<BlockHash, BlockHashParseError> {
        let decoded = hex::decode(s).map_err(|_| BlockHashParseError(s.to_owned()))?;
        let arr: [u8; HASH_SIZE_BYTES] = decoded
            .try_into()
            .map_err(|_| BlockHashParseError(s.to_owned()))?;
        Ok(BlockHash(Box::new(arr)))
    }
}

impl TryFrom<String> for BlockHash {
    type Error = BlockHashParseError;

    fn try_from(s: String) -> Result<BlockHash, BlockHashParseError> {
        s.parse()
    }
}

impl From<BlockHash> for String {
    fn from(h: BlockHash) -> String {
        h.to_string()
    }
}

/// A string did not parse as a valid hex-encoded [`BlockHash`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid block hash {0:?}")]
pub struct BlockHashParseError(String);
