// BlockVault content-addressed cache.
// Copyright 2024 The BlockVault Authors.

// This program is free software; you can redistribute it and/or modify
// it under the terms of the MIT license. See LICENSE for details.

//! Splits a byte stream into fixed-size, content-addressed blocks.
//!
//! See §4.1: the chunker reads sequentially and holds at most one block's
//! worth of bytes resident at a time. The final block may be shorter than
//! `block_size`; it is still addressed by its own hash like any other
//! block. A zero-length input produces zero chunks.

use std::io::Read;

use bytes::Bytes;

use crate::hash::BlockHash;

/// One fixed-size (except possibly the last) piece of a file.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub hash: BlockHash,
    pub bytes: Bytes,
}

impl Chunk {
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Reads `block_size`-byte chunks from `reader` until EOF.
///
/// `block_size` is fixed for the lifetime of the cache (§4.4): it is
/// recorded in the config file and validated on every open, because blocks
/// hashed under one size can't be reused under another.
pub struct Chunker<R> {
    reader: R,
    block_size: usize,
    done: bool,
}

impl<R: Read> Chunker<R> {
    pub fn new(reader: R, block_size: u64) -> Chunker<R> {
        assert!(block_size > 0, "block_size must be positive");
        Chunker {
            reader,
            block_size: block_size as usize,
            done: false,
        }
    }

    /// Read the next chunk, or `None` at end of stream.
    fn next_chunk(&mut self) -> std::io::Result<Option<Chunk>> {
        if self.done {
            return Ok(None);
        }
        let mut buf = vec![0u8; self.block_size];
        let mut filled = 0;
        while filled < self.block_size {
            let n = self.reader.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            self.done = true;
            return Ok(None);
        }
        if filled < self.block_size {
            // Short read: this was the last, partial block.
            self.done = true;
            buf.truncate(filled);
        }
        let bytes = Bytes::from(buf);
        let hash = BlockHash::hash_bytes(&bytes);
        Ok(Some(Chunk { hash, bytes }))
    }
}

impl<R: Read> Iterator for Chunker<R> {
    type Item = std::io::Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk().transpose()
    }
}
