//! Query execution context
//!
//! A `QueryContext` is built for one segment of a pinned generation. Query
//! nodes use it to fetch postings and term expansions (cached for the life of
//! the context), to score against corpus-wide statistics and to observe
//! cancellation.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use roaring::RoaringBitmap;

use super::scoring::{CorpusStats, Scorer};
use crate::cancel::CancelToken;
use crate::error::SourcedexError;
use crate::models::{Document, Field, SymbolEntry};
use crate::segment::{DocNo, LiveSegment, Posting, SegmentReader};
use crate::Result;

/// Postings of one term, sorted by docno
pub type PostingList = Arc<Vec<Posting>>;

/// Query execution context providing access to one segment
pub struct QueryContext<'a> {
    segment: &'a LiveSegment,
    stats: &'a CorpusStats,
    scorer: &'a Scorer,
    cancel: &'a CancelToken,
    max_expansions: usize,

    /// Decoded posting lists, keyed by field and term
    postings_cache: RwLock<HashMap<(Field, String), PostingList>>,

    /// Prefix and wildcard expansions, keyed by a canonical pattern
    expansion_cache: RwLock<HashMap<String, Arc<Vec<String>>>>,
}

impl<'a> QueryContext<'a> {
    pub fn new(
        segment: &'a LiveSegment,
        stats: &'a CorpusStats,
        scorer: &'a Scorer,
        cancel: &'a CancelToken,
    ) -> Self {
        Self {
            segment,
            stats,
            scorer,
            cancel,
            max_expansions: usize::MAX,
            postings_cache: RwLock::new(HashMap::new()),
            expansion_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Cap on the number of terms a multi-term leaf may expand to
    pub fn with_max_expansions(mut self, max_expansions: usize) -> Self {
        self.max_expansions = max_expansions.max(1);
        self
    }

    pub fn segment(&self) -> &LiveSegment {
        self.segment
    }

    pub fn reader(&self) -> &SegmentReader {
        &self.segment.reader
    }

    pub fn stats(&self) -> &CorpusStats {
        self.stats
    }

    pub fn scorer(&self) -> &Scorer {
        self.scorer
    }

    pub fn max_expansions(&self) -> usize {
        self.max_expansions
    }

    /// `Err(Cancelled)` once the search has been cancelled or timed out
    pub fn check_cancelled(&self) -> Result<()> {
        self.cancel.check()
    }

    /// Every live document of the segment
    pub fn live_docs(&self) -> RoaringBitmap {
        let mut docs = RoaringBitmap::new();
        docs.insert_range(0..self.reader().doc_count());
        docs -= &self.segment.tombstones;
        docs
    }

    pub fn document(&self, docno: DocNo) -> Option<&Document> {
        self.reader().document(docno)
    }

    pub fn symbols(&self, docno: DocNo) -> &[SymbolEntry] {
        self.reader().symbols(docno)
    }

    /// `full` length of a document in tokens
    pub fn doc_length(&self, docno: DocNo) -> u32 {
        self.reader().stats().get_doc_length(docno).unwrap_or(0)
    }

    /// All postings of a term, including tombstoned documents
    pub fn postings(&self, field: Field, term: &str) -> Result<PostingList> {
        let key = (field, term.to_string());
        if let Some(cached) = self.postings_cache.read().get(&key) {
            return Ok(Arc::clone(cached));
        }

        let postings = self
            .reader()
            .read_postings(field, term)
            .map_err(|e| SourcedexError::CorruptSegment {
                segment: self.segment.id().0,
                reason: format!("postings of {}:{}: {}", field, term, e),
            })?;
        let postings = Arc::new(postings);
        self.postings_cache.write().insert(key, Arc::clone(&postings));
        Ok(postings)
    }

    /// The posting of a term in one document
    pub fn posting(&self, field: Field, term: &str, docno: DocNo) -> Result<Option<Posting>> {
        let postings = self.postings(field, term)?;
        Ok(postings
            .binary_search_by_key(&docno, |p| p.docno)
            .ok()
            .map(|idx| postings[idx].clone()))
    }

    /// Live documents containing a term
    pub fn term_docs(&self, field: Field, term: &str) -> Result<RoaringBitmap> {
        let postings = self.postings(field, term)?;
        let mut docs: RoaringBitmap = postings.iter().map(|p| p.docno.as_u32()).collect();
        docs -= &self.segment.tombstones;
        Ok(docs)
    }

    /// Get or compute the terms a multi-term leaf expands to
    pub fn expansion<F>(&self, cache_key: &str, compute: F) -> Arc<Vec<String>>
    where
        F: FnOnce(&SegmentReader, usize) -> Vec<String>,
    {
        if let Some(cached) = self.expansion_cache.read().get(cache_key) {
            return Arc::clone(cached);
        }

        let terms = Arc::new(compute(self.reader(), self.max_expansions));
        self.expansion_cache
            .write()
            .insert(cache_key.to_string(), Arc::clone(&terms));
        terms
    }

    /// Score `tf` occurrences of a term in `docno`
    pub fn term_score(&self, field: Field, term: &str, tf: u32, docno: DocNo) -> f32 {
        self.scorer
            .score(self.stats, field, term, tf, self.doc_length(docno))
    }
}
