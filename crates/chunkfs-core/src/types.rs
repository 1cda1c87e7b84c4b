// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Core type definitions for ChunkFS

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Opaque handle identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandleId(pub u64);

impl HandleId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for HandleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// File timestamps, in seconds since the Unix epoch
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTimes {
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

impl FileTimes {
    pub fn now() -> Self {
        let now = current_timestamp();
        Self {
            atime: now,
            mtime: now,
            ctime: now,
        }
    }
}

pub(crate) fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Kind of filesystem node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Directory,
    RegularFile,
    Symlink,
}

impl NodeKind {
    /// File-type bits (`S_IF*`) for this kind
    pub fn type_bits(self) -> u32 {
        match self {
            NodeKind::Directory => libc::S_IFDIR as u32,
            NodeKind::RegularFile => libc::S_IFREG as u32,
            NodeKind::Symlink => libc::S_IFLNK as u32,
        }
    }

    /// Whether nodes of this kind own a chunked buffer
    pub fn has_content(self) -> bool {
        !matches!(self, NodeKind::Directory)
    }
}

/// File attributes as returned by `getattr`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    pub kind: NodeKind,
    /// Full mode including file-type bits
    pub mode: u32,
    pub nlink: u32,
    pub size: u64,
    pub uid: u32,
    pub gid: u32,
    pub times: FileTimes,
}

impl Attributes {
    pub fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }
}

/// Filesystem statistics as returned by `statfs`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatfsData {
    pub f_bsize: u64,
    pub f_blocks: u64,
    pub f_bavail: u64,
}
