// BlockVault content-addressed cache.
// Copyright 2024 The BlockVault Authors.

// This program is free software; you can redistribute it and/or modify
// it under the terms of the MIT license. See LICENSE for details.

//! The manifest: the ordered list of block hashes that reconstitutes one
//! stored file, keyed by its [`FileId`].

use serde::{Deserialize, Serialize};

use crate::hash::BlockHash;

/// Caller- or engine-supplied opaque key identifying one stored file.
///
/// The cache treats this as an opaque string; minting a meaningful id from
/// a URL or filename is a concern of the outer convenience layer, not the
/// core (§9).
pub type FileId = String;

/// The ordered list of block hashes, and total length, that reconstitutes
/// one stored file.
///
/// Invariant (§3): for every hash listed here, the corresponding
/// `BlockEntry` in the index exists, and its refcount counts this listing
/// once per occurrence, summed over every manifest that references it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub block_hashes: Vec<BlockHash>,
    pub total_length: u64,
}
