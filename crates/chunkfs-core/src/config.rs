// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Configuration types for ChunkFS Core

use serde::{Deserialize, Serialize};

use crate::error::{FsError, FsResult};

/// Chunk length used when no configuration overrides it
pub const DEFAULT_BLOCK_SIZE: usize = 8;

/// Constants reported by `statfs`. They carry no disk-geometry meaning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatfsConfig {
    pub block_size: u64,
    pub blocks: u64,
    pub blocks_available: u64,
}

impl Default for StatfsConfig {
    fn default() -> Self {
        Self {
            block_size: 512,
            blocks: 4096,
            blocks_available: 2048,
        }
    }
}

/// Ownership recorded on newly created nodes (permissions are not enforced)
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityPolicy {
    pub default_uid: u32,
    pub default_gid: u32,
}

/// Top-level filesystem configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FsConfig {
    /// Length of every chunk except possibly the last one of a file
    pub block_size: usize,
    /// Permission bits of the root directory
    pub root_mode: u32,
    pub statfs: StatfsConfig,
    pub security: SecurityPolicy,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            root_mode: 0o755,
            statfs: StatfsConfig::default(),
            security: SecurityPolicy::default(),
        }
    }
}

impl FsConfig {
    /// Parse a JSON configuration document. Missing fields take their defaults.
    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn validate(&self) -> FsResult<()> {
        if self.block_size == 0 {
            return Err(FsError::InvalidArgument);
        }
        Ok(())
    }
}
