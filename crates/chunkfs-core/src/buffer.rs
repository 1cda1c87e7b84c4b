// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Per-file chunk storage
//!
//! A [`ChunkedBuffer`] holds the content of one regular file or symlink as an
//! ordered list of chunks. After every write or truncate all chunks except
//! the last are exactly `block_size` long and the last one is non-empty.
//! Only the trailing chunk is ever rewritten by an append, so the earlier
//! chunks of a file are left untouched.

use tracing::trace;

use crate::codec::{self, Chunk};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkedBuffer {
    block_size: usize,
    chunks: Vec<Chunk>,
}

impl ChunkedBuffer {
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size,
            chunks: Vec::new(),
        }
    }

    /// Replace the content with `content`, split without merging.
    pub fn initialize(&mut self, content: &[u8]) {
        self.chunks = codec::split(content, self.block_size);
    }

    /// Append `data` to the content.
    ///
    /// Any offset a caller may have is ignored; writes always land after
    /// the existing bytes. The trailing chunk is popped, merged with `data`
    /// and re-split, which restores full-length chunks ahead of the tail.
    pub fn write(&mut self, data: &[u8]) -> usize {
        match self.chunks.pop() {
            None => {
                self.chunks = codec::split(data, self.block_size);
            }
            Some(mut last) => {
                trace!(popped = last.len(), incoming = data.len(), "merging trailing chunk");
                last.extend_from_slice(data);
                self.chunks.extend(codec::split(&last, self.block_size));
            }
        }
        data.len()
    }

    /// Reassemble the whole content. The chunk sequence is left as it was.
    pub fn read(&self) -> Vec<u8> {
        codec::join(&self.chunks)
    }

    /// Keep only the first `length` bytes and re-chunk them.
    ///
    /// Asking for more bytes than are stored keeps everything; no zero
    /// padding is added.
    pub fn truncate(&mut self, length: u64) {
        let mut full = codec::join(&std::mem::take(&mut self.chunks));
        let keep = usize::try_from(length).map_or(full.len(), |l| l.min(full.len()));
        full.truncate(keep);
        self.chunks = codec::split(&full, self.block_size);
        trace!(keep, chunks = self.chunks.len(), "rebuilt chunks after truncate");
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Byte length derived from the chunk layout:
    /// `(chunks - 1) * block_size + len(last)`, or 0 with no chunks.
    pub fn logical_len(&self) -> u64 {
        match self.chunks.last() {
            None => 0,
            Some(last) => ((self.chunks.len() - 1) * self.block_size + last.len()) as u64,
        }
    }
}
