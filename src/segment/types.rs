//! Core types for the segment store

use serde::{Deserialize, Serialize};
use std::fmt;

/// Segment identifier, monotonically increasing per project index
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentId(pub u64);

impl SegmentId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seg_{:08}", self.0)
    }
}

/// Dense document number within a segment (0..doc_count)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocNo(pub u32);

impl DocNo {
    pub fn new(n: u32) -> Self {
        Self(n)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Occurrences of one term in one document
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub docno: DocNo,
    /// Strictly increasing token positions
    pub positions: Vec<u32>,
}

impl Posting {
    pub fn new(docno: DocNo, positions: Vec<u32>) -> Self {
        Self { docno, positions }
    }

    pub fn term_frequency(&self) -> u32 {
        self.positions.len() as u32
    }
}

/// Postings per block
pub const BLOCK_SIZE: usize = 128;

/// A block of postings with skip data
#[derive(Clone, Debug, Default)]
pub struct PostingBlock {
    pub docnos: Vec<DocNo>,
    pub positions: Vec<Vec<u32>>,
    /// Maximum document number in this block (for skip data)
    pub max_docno: DocNo,
    /// Maximum term frequency in this block
    pub max_tf: u32,
}

impl PostingBlock {
    pub fn new() -> Self {
        Self {
            docnos: Vec::with_capacity(BLOCK_SIZE),
            positions: Vec::with_capacity(BLOCK_SIZE),
            max_docno: DocNo(0),
            max_tf: 0,
        }
    }

    pub fn is_full(&self) -> bool {
        self.docnos.len() >= BLOCK_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.docnos.is_empty()
    }

    pub fn len(&self) -> usize {
        self.docnos.len()
    }

    pub fn push(&mut self, posting: Posting) {
        if posting.docno > self.max_docno {
            self.max_docno = posting.docno;
        }
        self.max_tf = self.max_tf.max(posting.term_frequency());
        self.docnos.push(posting.docno);
        self.positions.push(posting.positions);
    }
}

/// Posting list location and statistics stored in the term dictionary
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingListMeta {
    /// Offset in the postings file
    pub offset: u64,
    /// Length in bytes
    pub length: u64,
    /// Number of documents containing the term
    pub doc_frequency: u32,
    /// Total occurrences across all documents
    pub total_term_frequency: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_id() {
        let id = SegmentId::new(42);
        assert_eq!(id.next().0, 43);
        assert_eq!(id.to_string(), "seg_00000042");
    }

    #[test]
    fn test_posting_block() {
        let mut block = PostingBlock::new();
        assert!(block.is_empty());

        block.push(Posting::new(DocNo(1), vec![0, 4, 9]));
        block.push(Posting::new(DocNo(10), vec![2]));

        assert_eq!(block.len(), 2);
        assert!(!block.is_full());
        assert_eq!(block.max_docno, DocNo(10));
        assert_eq!(block.max_tf, 3);
    }
}
