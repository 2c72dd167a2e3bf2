//! Per-segment document length statistics

use serde::{Deserialize, Serialize};

use super::types::DocNo;

/// Document lengths of one segment, in `full` tokens
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentStatistics {
    pub doc_count: u32,
    /// Sum of all document lengths
    pub total_doc_length: u64,
    doc_lengths: Vec<u32>,
}

impl SegmentStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            doc_count: 0,
            total_doc_length: 0,
            doc_lengths: Vec::with_capacity(capacity),
        }
    }

    pub fn from_doc_lengths(doc_lengths: Vec<u32>) -> Self {
        Self {
            doc_count: doc_lengths.len() as u32,
            total_doc_length: doc_lengths.iter().map(|&l| l as u64).sum(),
            doc_lengths,
        }
    }

    /// Append a document and return its docno
    pub fn add_document(&mut self, doc_len: u32) -> DocNo {
        let docno = DocNo::new(self.doc_count);
        self.doc_lengths.push(doc_len);
        self.total_doc_length += doc_len as u64;
        self.doc_count += 1;
        docno
    }

    pub fn get_doc_length(&self, docno: DocNo) -> Option<u32> {
        self.doc_lengths.get(docno.as_usize()).copied()
    }

    pub fn avgdl(&self) -> f64 {
        if self.doc_count == 0 {
            0.0
        } else {
            self.total_doc_length as f64 / self.doc_count as f64
        }
    }

    pub fn doc_lengths(&self) -> &[u32] {
        &self.doc_lengths
    }
}
