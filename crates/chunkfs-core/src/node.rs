// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Path-keyed node table
//!
//! Every path maps to a [`Node`] holding its metadata. Regular files and
//! symlinks additionally own a [`ChunkedBuffer`] stored under the same path.
//! Only a single directory level below the root is modelled, so the table is
//! a flat map rather than a tree.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::buffer::ChunkedBuffer;
use crate::config::{FsConfig, SecurityPolicy};
use crate::error::{FsError, FsResult};
use crate::types::{Attributes, FileTimes, NodeKind};

/// Path of the root directory
pub const ROOT: &str = "/";

/// Bits of the existing mode that survive a `chmod`
const CHMOD_KEEP_MASK: u32 = 0o770000;

/// Metadata for one filesystem path
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub kind: NodeKind,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u32,
    pub size: u64,
    pub times: FileTimes,
    pub xattrs: BTreeMap<String, Vec<u8>>,
}

impl Node {
    fn new(kind: NodeKind, perm: u32, nlink: u32, owner: &SecurityPolicy) -> Self {
        Self {
            kind,
            mode: kind.type_bits() | perm,
            uid: owner.default_uid,
            gid: owner.default_gid,
            nlink,
            size: 0,
            times: FileTimes::now(),
            xattrs: BTreeMap::new(),
        }
    }

    pub fn attributes(&self) -> Attributes {
        Attributes {
            kind: self.kind,
            mode: self.mode,
            nlink: self.nlink,
            size: self.size,
            uid: self.uid,
            gid: self.gid,
            times: self.times,
        }
    }
}

/// Flat map from path to node metadata and content buffer
#[derive(Debug)]
pub struct NodeTable {
    block_size: usize,
    owner: SecurityPolicy,
    nodes: BTreeMap<PathBuf, Node>,
    buffers: HashMap<PathBuf, ChunkedBuffer>,
}

fn key(path: &Path) -> FsResult<PathBuf> {
    if !path.has_root() {
        return Err(FsError::InvalidArgument);
    }
    Ok(path.to_path_buf())
}

fn is_root(path: &Path) -> bool {
    path == Path::new(ROOT)
}

/// Key for a path that names something other than the root
fn child_key(path: &Path) -> FsResult<PathBuf> {
    let key = key(path)?;
    if is_root(&key) {
        return Err(FsError::InvalidArgument);
    }
    Ok(key)
}

impl NodeTable {
    pub fn new(config: &FsConfig) -> Self {
        let mut nodes = BTreeMap::new();
        let root = Node::new(NodeKind::Directory, config.root_mode, 2, &config.security);
        nodes.insert(PathBuf::from(ROOT), root);
        Self {
            block_size: config.block_size,
            owner: config.security.clone(),
            nodes,
            buffers: HashMap::new(),
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.nodes.contains_key(path)
    }

    pub fn node(&self, path: &Path) -> FsResult<&Node> {
        self.nodes.get(path).ok_or(FsError::NotFound)
    }

    fn node_mut(&mut self, path: &Path) -> FsResult<&mut Node> {
        self.nodes.get_mut(path).ok_or(FsError::NotFound)
    }

    fn root_mut(&mut self) -> &mut Node {
        self.nodes
            .entry(PathBuf::from(ROOT))
            .or_insert_with(|| Node::new(NodeKind::Directory, 0o755, 2, &self.owner))
    }

    /// Insert a regular file with an empty buffer, replacing whatever was
    /// stored at `path`.
    pub fn create(&mut self, path: &Path, mode: u32) -> FsResult<()> {
        let key = child_key(path)?;
        let node = Node::new(NodeKind::RegularFile, mode, 1, &self.owner);
        self.buffers.insert(key.clone(), ChunkedBuffer::new(self.block_size));
        self.nodes.insert(key, node);
        Ok(())
    }

    /// Insert a symlink whose buffer holds `source` split into chunks.
    ///
    /// The recorded size is the number of chunks, not the byte length.
    pub fn symlink(&mut self, path: &Path, source: &[u8]) -> FsResult<()> {
        let key = child_key(path)?;
        let mut buffer = ChunkedBuffer::new(self.block_size);
        buffer.initialize(source);
        let mut node = Node::new(NodeKind::Symlink, 0o777, 1, &self.owner);
        node.size = buffer.chunk_count() as u64;
        self.buffers.insert(key.clone(), buffer);
        self.nodes.insert(key, node);
        Ok(())
    }

    pub fn mkdir(&mut self, path: &Path, mode: u32) -> FsResult<()> {
        let key = child_key(path)?;
        let node = Node::new(NodeKind::Directory, mode, 2, &self.owner);
        self.buffers.remove(&key);
        self.nodes.insert(key, node);
        self.root_mut().nlink += 1;
        Ok(())
    }

    /// Remove a directory. Emptiness is not checked.
    pub fn rmdir(&mut self, path: &Path) -> FsResult<()> {
        let key = child_key(path)?;
        match self.node(&key)?.kind {
            NodeKind::Directory => {}
            _ => return Err(FsError::NotADirectory),
        }
        self.nodes.remove(&key);
        let root = self.root_mut();
        root.nlink = root.nlink.saturating_sub(1);
        Ok(())
    }

    pub fn unlink(&mut self, path: &Path) -> FsResult<()> {
        let key = child_key(path)?;
        if self.node(&key)?.kind == NodeKind::Directory {
            return Err(FsError::IsADirectory);
        }
        self.nodes.remove(&key);
        self.buffers.remove(&key);
        Ok(())
    }

    /// Move the node and its buffer from `old` to `new`. Anything stored at
    /// `new` is replaced.
    pub fn rename(&mut self, old: &Path, new: &Path) -> FsResult<()> {
        let old_key = child_key(old)?;
        let new_key = child_key(new)?;
        if !self.nodes.contains_key(&old_key) {
            return Err(FsError::NotFound);
        }
        if old_key == new_key {
            return Ok(());
        }

        let node = self.nodes.remove(&old_key).ok_or(FsError::NotFound)?;
        self.buffers.remove(&new_key);
        if let Some(buffer) = self.buffers.remove(&old_key) {
            self.buffers.insert(new_key.clone(), buffer);
        }
        self.nodes.insert(new_key, node);
        Ok(())
    }

    /// Replace the permission bits, keeping the file-type bits.
    pub fn chmod(&mut self, path: &Path, mode: u32) -> FsResult<()> {
        let node = self.node_mut(path)?;
        node.mode = (node.mode & CHMOD_KEEP_MASK) | mode;
        Ok(())
    }

    pub fn chown(&mut self, path: &Path, uid: u32, gid: u32) -> FsResult<()> {
        let node = self.node_mut(path)?;
        node.uid = uid;
        node.gid = gid;
        Ok(())
    }

    /// Set access and modification times; `None` means now.
    pub fn utimens(&mut self, path: &Path, times: Option<(i64, i64)>) -> FsResult<()> {
        let node = self.node_mut(path)?;
        let (atime, mtime) = times.unwrap_or_else(|| {
            let now = FileTimes::now();
            (now.atime, now.mtime)
        });
        node.times.atime = atime;
        node.times.mtime = mtime;
        Ok(())
    }

    pub fn getattr(&self, path: &Path) -> FsResult<Attributes> {
        self.node(path).map(Node::attributes)
    }

    /// `.`, `..` and every stored path without its leading separator.
    pub fn listdir(&self) -> Vec<String> {
        let mut entries = vec![".".to_string(), "..".to_string()];
        entries.extend(
            self.nodes
                .keys()
                .filter(|p| !is_root(p))
                .map(|p| p.strip_prefix(ROOT).unwrap_or(p).to_string_lossy().into_owned()),
        );
        entries
    }

    /// Value of an extended attribute; an unset name yields an empty value.
    pub fn getxattr(&self, path: &Path, name: &str) -> FsResult<Vec<u8>> {
        let node = self.node(path)?;
        Ok(node.xattrs.get(name).cloned().unwrap_or_default())
    }

    pub fn setxattr(&mut self, path: &Path, name: &str, value: &[u8]) -> FsResult<()> {
        let node = self.node_mut(path)?;
        node.xattrs.insert(name.to_string(), value.to_vec());
        Ok(())
    }

    pub fn listxattr(&self, path: &Path) -> FsResult<Vec<String>> {
        let node = self.node(path)?;
        Ok(node.xattrs.keys().cloned().collect())
    }

    /// Remove an extended attribute; removing an unset name is a no-op.
    pub fn removexattr(&mut self, path: &Path, name: &str) -> FsResult<()> {
        let node = self.node_mut(path)?;
        node.xattrs.remove(name);
        Ok(())
    }

    /// Node and buffer of a file or symlink, for content operations
    pub fn content_mut(&mut self, path: &Path) -> FsResult<(&mut Node, &mut ChunkedBuffer)> {
        let node = self.nodes.get_mut(path).ok_or(FsError::NotFound)?;
        if !node.kind.has_content() {
            return Err(FsError::IsADirectory);
        }
        let buffer = self.buffers.get_mut(path).ok_or(FsError::NotFound)?;
        Ok((node, buffer))
    }

    pub fn buffer(&self, path: &Path) -> FsResult<&ChunkedBuffer> {
        if !self.node(path)?.kind.has_content() {
            return Err(FsError::IsADirectory);
        }
        self.buffers.get(path).ok_or(FsError::NotFound)
    }
}
