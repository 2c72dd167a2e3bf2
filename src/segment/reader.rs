//! Immutable segment reader
//!
//! A reader owns the decoded contents of one committed segment: the term
//! dictionary, postings bytes, document records, symbol tables and length
//! statistics. Readers are shared through `Arc` by every generation that
//! lists the segment.

use std::collections::HashMap;
use std::io;

use serde::{Deserialize, Serialize};

use super::postings::{PostingIterator, PostingsReader};
use super::statistics::SegmentStatistics;
use super::term_dict::TermDictionary;
use super::types::{DocNo, Posting, PostingListMeta, SegmentId};
use crate::models::{Document, Field, SymbolEntry};

/// Metadata persisted with each segment
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMeta {
    pub id: SegmentId,
    /// Number of documents, including ones later tombstoned
    pub doc_count: u32,
    /// Size in bytes of all segment files combined
    pub size_bytes: u64,
    /// Creation time, seconds since the Unix epoch
    pub created_at: u64,
    /// CRC32 over all data files
    pub checksum: u64,
}

pub struct SegmentReader {
    meta: SegmentMeta,
    terms: TermDictionary,
    postings: PostingsReader,
    docs: Vec<Document>,
    symbols: Vec<Vec<SymbolEntry>>,
    stats: SegmentStatistics,
    by_path: HashMap<String, DocNo>,
}

impl SegmentReader {
    pub fn from_parts(
        meta: SegmentMeta,
        terms: TermDictionary,
        postings: PostingsReader,
        docs: Vec<Document>,
        symbols: Vec<Vec<SymbolEntry>>,
        stats: SegmentStatistics,
    ) -> io::Result<Self> {
        if docs.len() != meta.doc_count as usize
            || symbols.len() != docs.len()
            || stats.doc_count as usize != docs.len()
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "segment {} lists {} documents but holds {} records, {} symbol tables and {} lengths",
                    meta.id,
                    meta.doc_count,
                    docs.len(),
                    symbols.len(),
                    stats.doc_count
                ),
            ));
        }
        let by_path = docs
            .iter()
            .enumerate()
            .map(|(i, d)| (d.path.clone(), DocNo(i as u32)))
            .collect();
        Ok(Self {
            meta,
            terms,
            postings,
            docs,
            symbols,
            stats,
            by_path,
        })
    }

    pub fn meta(&self) -> &SegmentMeta {
        &self.meta
    }

    pub fn id(&self) -> SegmentId {
        self.meta.id
    }

    pub fn terms(&self) -> &TermDictionary {
        &self.terms
    }

    pub fn posting_meta(&self, field: Field, term: &str) -> Option<&PostingListMeta> {
        self.terms.get(field, term)
    }

    /// Posting iterator for a term, `None` when the term is absent
    pub fn postings(&self, field: Field, term: &str) -> io::Result<Option<PostingIterator<'_>>> {
        match self.terms.get(field, term) {
            Some(meta) => Ok(Some(self.postings.get_postings(meta)?)),
            None => Ok(None),
        }
    }

    /// Decode all postings of a term
    pub fn read_postings(&self, field: Field, term: &str) -> io::Result<Vec<Posting>> {
        match self.postings(field, term)? {
            Some(iter) => iter.collect(),
            None => Ok(Vec::new()),
        }
    }

    pub fn read_postings_with(&self, meta: &PostingListMeta) -> io::Result<Vec<Posting>> {
        self.postings.get_postings(meta)?.collect()
    }

    pub fn doc_frequency(&self, field: Field, term: &str) -> u32 {
        self.terms
            .get(field, term)
            .map(|m| m.doc_frequency)
            .unwrap_or(0)
    }

    pub fn document(&self, docno: DocNo) -> Option<&Document> {
        self.docs.get(docno.as_usize())
    }

    pub fn documents(&self) -> impl Iterator<Item = (DocNo, &Document)> {
        self.docs
            .iter()
            .enumerate()
            .map(|(i, d)| (DocNo(i as u32), d))
    }

    pub fn symbols(&self, docno: DocNo) -> &[SymbolEntry] {
        self.symbols
            .get(docno.as_usize())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Docno of a path in this segment
    pub fn find_path(&self, path: &str) -> Option<DocNo> {
        self.by_path.get(path).copied()
    }

    pub fn stats(&self) -> &SegmentStatistics {
        &self.stats
    }

    pub fn doc_count(&self) -> u32 {
        self.meta.doc_count
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }
}
