//! Term dictionary using an FST
//!
//! Keys are a one-byte field code followed by the term, so each field owns a
//! contiguous key range and prefix scans stay within a field.

use std::io;

use fst::automaton::Str;
use fst::{Automaton, IntoStreamer, Map, MapBuilder, Streamer};

use super::types::PostingListMeta;
use crate::models::Field;

fn dictionary_key(field: Field, term: &str) -> String {
    let mut key = String::with_capacity(term.len() + 1);
    key.push(field.code() as char);
    key.push_str(term);
    key
}

/// Term dictionary backed by an FST
///
/// The FST maps keys to an index into the parallel metadata array.
pub struct TermDictionary {
    fst: Map<Vec<u8>>,
    metadata: Vec<PostingListMeta>,
}

impl TermDictionary {
    pub fn new(fst_data: Vec<u8>, metadata: Vec<PostingListMeta>) -> io::Result<Self> {
        let fst = Map::new(fst_data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if fst.len() != metadata.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "term dictionary has {} keys but {} metadata entries",
                    fst.len(),
                    metadata.len()
                ),
            ));
        }
        Ok(Self { fst, metadata })
    }

    pub fn get(&self, field: Field, term: &str) -> Option<&PostingListMeta> {
        self.fst
            .get(dictionary_key(field, term).as_bytes())
            .and_then(|idx| self.metadata.get(idx as usize))
    }

    pub fn contains(&self, field: Field, term: &str) -> bool {
        self.fst.contains_key(dictionary_key(field, term).as_bytes())
    }

    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    /// Terms of `field` starting with `prefix`, in lexicographic order
    pub fn prefix_search(&self, field: Field, prefix: &str) -> Vec<(String, &PostingListMeta)> {
        self.prefix_filter(field, prefix, usize::MAX, |_| true)
    }

    /// Terms of `field` starting with `prefix` that pass `keep`, at most `limit`
    pub fn prefix_filter<F>(
        &self,
        field: Field,
        prefix: &str,
        limit: usize,
        keep: F,
    ) -> Vec<(String, &PostingListMeta)>
    where
        F: Fn(&str) -> bool,
    {
        let key = dictionary_key(field, prefix);
        let automaton = Str::new(&key).starts_with();
        let mut stream = self.fst.search(automaton).into_stream();
        let mut results = Vec::new();
        while let Some((key, idx)) = stream.next() {
            if results.len() >= limit {
                break;
            }
            let Ok(term) = std::str::from_utf8(&key[1..]) else {
                continue;
            };
            if !keep(term) {
                continue;
            }
            if let Some(meta) = self.metadata.get(idx as usize) {
                results.push((term.to_string(), meta));
            }
        }
        results
    }

    /// All terms of one field
    pub fn field_terms(&self, field: Field) -> Vec<(String, &PostingListMeta)> {
        self.prefix_search(field, "")
    }

    /// Every (field, term) in key order
    pub fn iter_terms(&self) -> Vec<(Field, String, &PostingListMeta)> {
        let mut results = Vec::with_capacity(self.metadata.len());
        let mut stream = self.fst.stream();
        while let Some((key, idx)) = stream.next() {
            let Some(field) = key.first().copied().and_then(Field::from_code) else {
                continue;
            };
            if let (Ok(term), Some(meta)) = (std::str::from_utf8(&key[1..]), self.metadata.get(idx as usize)) {
                results.push((field, term.to_string(), meta));
            }
        }
        results
    }

    pub fn fst_bytes(&self) -> &[u8] {
        self.fst.as_fst().as_bytes()
    }

    pub fn metadata(&self) -> &[PostingListMeta] {
        &self.metadata
    }
}

/// Builder for term dictionaries
pub struct TermDictionaryBuilder {
    terms: Vec<(String, PostingListMeta)>,
}

impl TermDictionaryBuilder {
    pub fn new() -> Self {
        Self { terms: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            terms: Vec::with_capacity(capacity),
        }
    }

    pub fn add(&mut self, field: Field, term: &str, meta: PostingListMeta) {
        self.terms.push((dictionary_key(field, term), meta));
    }

    pub fn build(mut self) -> io::Result<TermDictionary> {
        // FST requires sorted, unique keys
        self.terms.sort_by(|a, b| a.0.cmp(&b.0));

        let mut fst_builder = MapBuilder::memory();
        let mut metadata = Vec::with_capacity(self.terms.len());

        for (idx, (key, meta)) in self.terms.into_iter().enumerate() {
            fst_builder
                .insert(key.as_bytes(), idx as u64)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            metadata.push(meta);
        }

        let fst_data = fst_builder
            .into_inner()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        TermDictionary::new(fst_data, metadata)
    }
}

impl Default for TermDictionaryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
