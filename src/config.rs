// BlockVault content-addressed cache.
// Copyright 2024 The BlockVault Authors.

// This program is free software; you can redistribute it and/or modify
// it under the terms of the MIT license. See LICENSE for details.

//! The cache's config file: the small, rarely-changed record of parameters
//! that must stay fixed for the lifetime of a cache directory (§4.4).
//!
//! `block_size` and `hash_algorithm` are baked into every block's identity:
//! changing either after blocks exist would make the content addresses of
//! old and new blocks incomparable. `Config::open` refuses to proceed
//! rather than silently reinterpreting an existing cache under different
//! parameters.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::{Error, Result};
use crate::hash::HASH_ALGORITHM;

const CONFIG_FILE_NAME: &str = "blockvault.json";
const CURRENT_CONFIG_VERSION: u32 = 1;

/// Default block size, in bytes, for newly created caches: 1 MiB, matching
/// the midpoint of the range spec §4.1 calls out as typical.
pub const DEFAULT_BLOCK_SIZE: u64 = 1 << 20;

/// The parameters recorded in a cache's config file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub version: u32,
    pub block_size: u64,
    pub hash_algorithm: String,
}

impl Config {
    fn path(cache_dir: &Path) -> PathBuf {
        cache_dir.join(CONFIG_FILE_NAME)
    }

    /// Open an existing cache's config, or (if `create` is set and none
    /// exists yet) write a fresh one with `requested_block_size`.
    ///
    /// `requested_block_size` is only checked against an existing config
    /// when `Some`: a caller that just wants to open whatever cache is
    /// already there (the common case for `retrieve`/`remove`/`stats`)
    /// passes `None` and takes the recorded block size as given, rather
    /// than needing to already know it.
    pub fn open_or_create(
        cache_dir: &Path,
        requested_block_size: Option<u64>,
        create: bool,
    ) -> Result<Config> {
        let path = Self::path(cache_dir);
        match fs::read(&path) {
            Ok(bytes) => {
                let config: Config =
                    serde_json::from_slice(&bytes).map_err(|source| Error::ParseConfig {
                        path: path.clone(),
                        source,
                    })?;
                config.validate(requested_block_size)?;
                Ok(config)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                if !create {
                    return Err(Error::NotACache {
                        path: cache_dir.to_owned(),
                    });
                }
                let block_size = requested_block_size.unwrap_or(DEFAULT_BLOCK_SIZE);
                let config = Config {
                    version: CURRENT_CONFIG_VERSION,
                    block_size,
                    hash_algorithm: HASH_ALGORITHM.to_string(),
                };
                config.write(&path)?;
                info!(path = %path.display(), block_size, "initialized new cache");
                Ok(config)
            }
            Err(source) => Err(Error::ReadConfig { path, source }),
        }
    }

    fn validate(&self, requested_block_size: Option<u64>) -> Result<()> {
        if self.version != CURRENT_CONFIG_VERSION {
            return Err(Error::UnsupportedConfigVersion {
                version: self.version,
            });
        }
        if self.hash_algorithm != HASH_ALGORITHM {
            return Err(Error::HashAlgorithmMismatch {
                existing: self.hash_algorithm.clone(),
                requested: HASH_ALGORITHM.to_string(),
            });
        }
        if let Some(requested_block_size) = requested_block_size {
            if self.block_size != requested_block_size {
                return Err(Error::BlockSizeMismatch {
                    existing_block_size: self.block_size,
                    requested_block_size,
                });
            }
        }
        Ok(())
    }

    fn write(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self).map_err(|source| Error::ParseConfig {
            path: path.to_owned(),
            source,
        })?;
        fs::write(path, bytes).map_err(|source| Error::WriteConfig {
            path: path.to_owned(),
            source,
        })
    }
}
