// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Splitting byte sequences into fixed-size chunks and joining them back

/// One contiguous slice of a file's bytes, at most `block_size` long
pub type Chunk = Vec<u8>;

/// Split `bytes` into consecutive windows of `block_size`.
///
/// The final window may be shorter; empty input yields no chunks.
/// `block_size` must be non-zero (enforced by `FsConfig::validate`).
pub fn split(bytes: &[u8], block_size: usize) -> Vec<Chunk> {
    debug_assert!(block_size > 0);
    bytes.chunks(block_size).map(<[u8]>::to_vec).collect()
}

/// Concatenate chunks in order.
pub fn join<C: AsRef<[u8]>>(chunks: &[C]) -> Vec<u8> {
    let len = chunks.iter().map(|c| c.as_ref().len()).sum();
    let mut out = Vec::with_capacity(len);
    for chunk in chunks {
        out.extend_from_slice(chunk.as_ref());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_split_reference_block_size() {
        let chunks = split(b"hello world", 8);
        assert_eq!(chunks, vec![b"hello wo".to_vec(), b"rld".to_vec()]);
    }

    #[test]
    fn test_split_exact_multiple() {
        let chunks = split(b"abcdefgh12345678", 8);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.len() == 8));
    }

    #[test]
    fn test_split_empty() {
        assert!(split(b"", 8).is_empty());
        assert!(join::<Chunk>(&[]).is_empty());
    }

    #[test]
    fn test_split_block_size_one() {
        let chunks = split(b"abc", 1);
        assert_eq!(chunks, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    proptest! {
        #[test]
        fn proptest_join_inverts_split(bytes in proptest::collection::vec(any::<u8>(), 0..512), k in 1usize..64) {
            prop_assert_eq!(join(&split(&bytes, k)), bytes);
        }

        #[test]
        fn proptest_chunk_shape(bytes in proptest::collection::vec(any::<u8>(), 0..512), k in 1usize..64) {
            let chunks = split(&bytes, k);
            if bytes.is_empty() {
                prop_assert!(chunks.is_empty());
            } else {
                let (last, init) = chunks.split_last().unwrap();
                prop_assert!(init.iter().all(|c| c.len() == k));
                prop_assert!(!last.is_empty() && last.len() <= k);
            }
        }
    }
}
