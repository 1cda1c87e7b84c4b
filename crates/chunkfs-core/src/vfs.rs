// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Filesystem engine for ChunkFS Core
//!
//! [`FsCore`] is the entry point a provider adapter talks to. It owns the
//! node table and every file's chunked buffer behind a single lock, so calls
//! are serialized even when the host drives the engine from several
//! threads. Each operation takes the lock once and either applies fully or
//! fails before mutating anything.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::codec::Chunk;
use crate::config::FsConfig;
use crate::error::{FsError, FsResult};
use crate::node::NodeTable;
use crate::types::{Attributes, HandleId, NodeKind, StatfsData};

/// Mutable engine state guarded by the global lock
#[derive(Debug)]
struct FsState {
    table: NodeTable,
    next_handle_id: u64,
}

impl FsState {
    /// Handles are never reused or closed; the counter only grows.
    fn allocate_handle_id(&mut self) -> HandleId {
        let id = HandleId::new(self.next_handle_id);
        self.next_handle_id += 1;
        id
    }
}

/// The main filesystem core implementation
#[derive(Debug)]
pub struct FsCore {
    config: FsConfig,
    state: Mutex<FsState>,
}

impl FsCore {
    /// Create a new FsCore instance with the given configuration
    pub fn new(config: FsConfig) -> FsResult<Self> {
        config.validate()?;
        info!(block_size = config.block_size, "initializing chunked filesystem");
        let table = NodeTable::new(&config);
        Ok(Self {
            config,
            state: Mutex::new(FsState {
                table,
                next_handle_id: 1,
            }),
        })
    }

    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    pub fn block_size(&self) -> usize {
        self.config.block_size
    }

    fn state(&self) -> MutexGuard<'_, FsState> {
        // Operations validate before mutating, so a poisoned table is still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn chmod(&self, path: &Path, mode: u32) -> FsResult<()> {
        debug!(path = %path.display(), mode = format_args!("{:o}", mode), "chmod");
        self.state().table.chmod(path, mode)
    }

    pub fn chown(&self, path: &Path, uid: u32, gid: u32) -> FsResult<()> {
        debug!(path = %path.display(), uid, gid, "chown");
        self.state().table.chown(path, uid, gid)
    }

    /// Create (or silently replace) a regular file and open it.
    pub fn create(&self, path: &Path, mode: u32) -> FsResult<HandleId> {
        let mut state = self.state();
        state.table.create(path, mode)?;
        let fh = state.allocate_handle_id();
        debug!(path = %path.display(), mode = format_args!("{:o}", mode), %fh, "create");
        Ok(fh)
    }

    pub fn getattr(&self, path: &Path) -> FsResult<Attributes> {
        debug!(path = %path.display(), "getattr");
        self.state().table.getattr(path)
    }

    /// Extended attribute value; unset names read as empty.
    pub fn getxattr(&self, path: &Path, name: &str) -> FsResult<Vec<u8>> {
        debug!(path = %path.display(), name, "getxattr");
        self.state().table.getxattr(path, name)
    }

    pub fn listxattr(&self, path: &Path) -> FsResult<Vec<String>> {
        debug!(path = %path.display(), "listxattr");
        self.state().table.listxattr(path)
    }

    pub fn mkdir(&self, path: &Path, mode: u32) -> FsResult<()> {
        debug!(path = %path.display(), mode = format_args!("{:o}", mode), "mkdir");
        self.state().table.mkdir(path, mode)
    }

    /// Allocate a handle for an existing path. Flags are not interpreted.
    pub fn open(&self, path: &Path, flags: i32) -> FsResult<HandleId> {
        let mut state = self.state();
        if !state.table.contains(path) {
            return Err(FsError::NotFound);
        }
        let fh = state.allocate_handle_id();
        debug!(path = %path.display(), flags, %fh, "open");
        Ok(fh)
    }

    /// Return the whole content of a file.
    ///
    /// `size` and `offset` are accepted for adapter compatibility but not
    /// honored: the full reassembled buffer is always returned.
    pub fn read(&self, path: &Path, size: usize, offset: u64) -> FsResult<Vec<u8>> {
        debug!(path = %path.display(), size, offset, "read");
        let state = self.state();
        let buffer = state.table.buffer(path)?;
        Ok(buffer.read())
    }

    /// Entries of the (single-level) namespace, prefixed with `.` and `..`.
    pub fn readdir(&self, path: &Path) -> FsResult<Vec<String>> {
        debug!(path = %path.display(), "readdir");
        let state = self.state();
        state.table.node(path)?;
        Ok(state.table.listdir())
    }

    /// Link target as stored: the raw chunk sequence, not reassembled.
    pub fn readlink(&self, path: &Path) -> FsResult<Vec<Chunk>> {
        debug!(path = %path.display(), "readlink");
        let state = self.state();
        if state.table.node(path)?.kind != NodeKind::Symlink {
            return Err(FsError::InvalidArgument);
        }
        Ok(state.table.buffer(path)?.chunks().to_vec())
    }

    /// Remove an extended attribute; unset names are ignored.
    pub fn removexattr(&self, path: &Path, name: &str) -> FsResult<()> {
        debug!(path = %path.display(), name, "removexattr");
        self.state().table.removexattr(path, name)
    }

    pub fn rename(&self, old: &Path, new: &Path) -> FsResult<()> {
        debug!(old = %old.display(), new = %new.display(), "rename");
        self.state().table.rename(old, new)
    }

    pub fn rmdir(&self, path: &Path) -> FsResult<()> {
        debug!(path = %path.display(), "rmdir");
        self.state().table.rmdir(path)
    }

    pub fn setxattr(&self, path: &Path, name: &str, value: &[u8]) -> FsResult<()> {
        debug!(path = %path.display(), name, len = value.len(), "setxattr");
        self.state().table.setxattr(path, name, value)
    }

    /// Fixed statistics from the configuration.
    pub fn statfs(&self, path: &Path) -> FsResult<StatfsData> {
        debug!(path = %path.display(), "statfs");
        let statfs = &self.config.statfs;
        Ok(StatfsData {
            f_bsize: statfs.block_size,
            f_blocks: statfs.blocks,
            f_bavail: statfs.blocks_available,
        })
    }

    /// Create a symlink at `target` whose content is `source`.
    ///
    /// The recorded size is the chunk count of `source`, not its length.
    pub fn symlink(&self, target: &Path, source: &str) -> FsResult<()> {
        debug!(link = %target.display(), source, "symlink");
        self.state().table.symlink(target, source.as_bytes())
    }

    /// Cut the content to `length` bytes and re-chunk it.
    ///
    /// The node size becomes `length` even when less content was stored.
    pub fn truncate(&self, path: &Path, length: u64) -> FsResult<()> {
        debug!(path = %path.display(), length, "truncate");
        let mut state = self.state();
        let (node, buffer) = state.table.content_mut(path)?;
        buffer.truncate(length);
        node.size = length;
        Ok(())
    }

    pub fn unlink(&self, path: &Path) -> FsResult<()> {
        debug!(path = %path.display(), "unlink");
        self.state().table.unlink(path)
    }

    /// Set access/modification times, or both to now when `times` is `None`.
    pub fn utimens(&self, path: &Path, times: Option<(i64, i64)>) -> FsResult<()> {
        debug!(path = %path.display(), ?times, "utimens");
        self.state().table.utimens(path, times)
    }

    /// Append `data` to the file and return the number of bytes written.
    ///
    /// `offset` is ignored; content always grows at the end.
    pub fn write(&self, path: &Path, data: &[u8], offset: u64) -> FsResult<usize> {
        debug!(path = %path.display(), len = data.len(), offset, "write");
        let mut state = self.state();
        let (node, buffer) = state.table.content_mut(path)?;
        let written = buffer.write(data);
        node.size = buffer.logical_len();
        Ok(written)
    }

    /// Current chunk layout of a file or symlink
    pub fn chunks(&self, path: &Path) -> FsResult<Vec<Chunk>> {
        let state = self.state();
        Ok(state.table.buffer(path)?.chunks().to_vec())
    }
}
