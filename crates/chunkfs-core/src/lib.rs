// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! ChunkFS Core: an in-memory filesystem that stores file content as
//! fixed-size chunks.
//!
//! The engine ([`FsCore`]) exposes one synchronous call per POSIX-like verb
//! for a provider adapter to drive. File content lives in
//! [`ChunkedBuffer`]s: writes merge into the trailing chunk and re-split,
//! truncation reassembles and re-chunks, and reads join the chunks back.

pub mod buffer;
pub mod codec;
pub mod config;
pub mod error;
pub mod node;
pub mod types;
pub mod vfs;

pub use buffer::ChunkedBuffer;
pub use codec::{join, split, Chunk};
pub use config::{FsConfig, SecurityPolicy, StatfsConfig, DEFAULT_BLOCK_SIZE};
pub use error::{FsError, FsResult};
pub use node::{Node, NodeTable, ROOT};
pub use types::{Attributes, FileTimes, HandleId, NodeKind, StatfsData};
pub use vfs::FsCore;
