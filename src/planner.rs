//! Chunk planner: splits a byte range into fixed-size chunks.
//!
//! Fixed chunk size, independent of worker count — the number of chunks
//! floats with file size so every worker stays busy through the tail.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub start: u64,
    pub end: u64,
}

impl Chunk {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// `total` must be `>= 1`, `chunk_size` must be `>= 1`. Produces chunks
/// covering `[0, total)` exactly, disjoint, in ascending order.
pub fn plan(total: u64, chunk_size: u64) -> Vec<Chunk> {
    assert!(total >= 1, "plan() requires total >= 1");
    assert!(chunk_size >= 1, "plan() requires chunk_size >= 1");

    if total <= chunk_size {
        return vec![Chunk { index: 0, start: 0, end: total - 1 }];
    }

    let mut chunks = Vec::with_capacity(((total + chunk_size - 1) / chunk_size) as usize);
    let mut start = 0u64;
    let mut index = 0usize;
    while start < total {
        let end = (start + chunk_size - 1).min(total - 1);
        chunks.push(Chunk { index, start, end });
        start = end + 1;
        index += 1;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_byte_file_is_one_chunk() {
        let chunks = plan(1, 8);
        assert_eq!(chunks, vec![Chunk { index: 0, start: 0, end: 0 }]);
    }

    #[test]
    fn total_equals_chunk_size_is_single_chunk() {
        let chunks = plan(8, 8);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], Chunk { index: 0, start: 0, end: 7 });
    }

    #[test]
    fn total_equals_chunk_size_plus_one_is_two_chunks_last_size_one() {
        let chunks = plan(9, 8);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], Chunk { index: 0, start: 0, end: 7 });
        assert_eq!(chunks[1], Chunk { index: 1, start: 8, end: 8 });
    }

    #[test]
    fn hundred_mib_in_eight_mib_chunks_is_thirteen_chunks() {
        let total = 100 * 1024 * 1024u64;
        let chunk_size = 8 * 1024 * 1024u64;
        let chunks = plan(total, chunk_size);
        assert_eq!(chunks.len(), 13);
        assert_eq!(chunks.last().unwrap().end, total - 1);
    }

    #[test]
    fn chunks_are_disjoint_and_cover_total_exactly() {
        for total in [1u64, 2, 7, 8, 9, 1_000_003] {
            for chunk_size in [1u64, 3, 8, 1024] {
                let chunks = plan(total, chunk_size);
                let mut covered = 0u64;
                for (i, c) in chunks.iter().enumerate() {
                    assert_eq!(c.index, i);
                    assert_eq!(c.start, covered);
                    covered = c.end + 1;
                }
                assert_eq!(covered, total);
            }
        }
    }
}
