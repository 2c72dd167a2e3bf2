//! Segment writer for creating new immutable segments
//!
//! A segment is written once from the documents of one indexing run (or
//! from the live documents of several segments during compaction) and is
//! never modified afterwards.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crc32fast::Hasher;
use roaring::RoaringBitmap;

use super::postings::{PostingsReader, PostingsWriter};
use super::reader::{SegmentMeta, SegmentReader};
use super::statistics::SegmentStatistics;
use super::store::SegmentStore;
use super::term_dict::TermDictionaryBuilder;
use super::types::{DocNo, Posting, SegmentId};
use crate::document::BuiltDocument;
use crate::error::{Result, SourcedexError};
use crate::models::{Document, Field, SymbolEntry};

/// Encoded segment files, ready to be persisted
pub struct SegmentWriteResult {
    pub meta: SegmentMeta,
    pub postings_data: Vec<u8>,
    pub fst_data: Vec<u8>,
    pub term_meta_data: Vec<u8>,
    pub docs_data: Vec<u8>,
    pub symbols_data: Vec<u8>,
    pub stats_data: Vec<u8>,
}

impl SegmentWriteResult {
    /// CRC32 over every data file, in file order.
    ///
    /// The store recomputes this on load and refuses segments that differ.
    pub fn checksum(&self) -> u64 {
        checksum_parts(&[
            &self.postings_data,
            &self.fst_data,
            &self.term_meta_data,
            &self.docs_data,
            &self.symbols_data,
            &self.stats_data,
        ])
    }

    pub fn size_bytes(&self) -> u64 {
        (self.postings_data.len()
            + self.fst_data.len()
            + self.term_meta_data.len()
            + self.docs_data.len()
            + self.symbols_data.len()
            + self.stats_data.len()) as u64
    }
}

pub(crate) fn checksum_parts(parts: &[&[u8]]) -> u64 {
    let mut hasher = Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize() as u64
}

/// In-memory accumulation of documents and postings for one segment
#[derive(Default)]
struct SegmentAccumulator {
    docs: Vec<Document>,
    symbols: Vec<Vec<SymbolEntry>>,
    postings: BTreeMap<(Field, String), Vec<Posting>>,
    paths: HashSet<String>,
}

impl SegmentAccumulator {
    fn push_document(&mut self, doc: Document, symbols: Vec<SymbolEntry>) -> Result<DocNo> {
        if !self.paths.insert(doc.path.clone()) {
            return Err(SourcedexError::InvalidRequest(format!(
                "path {} added twice to one segment",
                doc.path
            )));
        }
        let docno = DocNo(self.docs.len() as u32);
        self.docs.push(doc);
        self.symbols.push(symbols);
        Ok(docno)
    }

    fn push_posting(&mut self, field: Field, term: String, posting: Posting) {
        self.postings.entry((field, term)).or_default().push(posting);
    }

    fn finish(self, id: SegmentId) -> Result<(SegmentWriteResult, SegmentReader)> {
        let mut postings_writer = PostingsWriter::new();
        let mut term_builder = TermDictionaryBuilder::with_capacity(self.postings.len());

        for ((field, term), list) in self.postings {
            postings_writer.start_posting_list();
            let doc_frequency = list.len() as u32;
            let total_term_frequency = list.iter().map(|p| p.term_frequency() as u64).sum();
            for posting in list {
                postings_writer.add_posting(posting)?;
            }
            let meta = postings_writer.finish_posting_list(doc_frequency, total_term_frequency);
            term_builder.add(field, &term, meta);
        }

        let postings_data = postings_writer.into_data();
        let terms = term_builder.build()?;
        let stats =
            SegmentStatistics::from_doc_lengths(self.docs.iter().map(|d| d.token_count).collect());

        let mut result = SegmentWriteResult {
            meta: SegmentMeta {
                id,
                doc_count: self.docs.len() as u32,
                size_bytes: 0,
                created_at: current_timestamp(),
                checksum: 0,
            },
            fst_data: terms.fst_bytes().to_vec(),
            term_meta_data: bincode::serialize(terms.metadata())?,
            docs_data: bincode::serialize(&self.docs)?,
            symbols_data: bincode::serialize(&self.symbols)?,
            stats_data: bincode::serialize(&stats)?,
            postings_data,
        };
        result.meta.size_bytes = result.size_bytes();
        result.meta.checksum = result.checksum();

        let reader = SegmentReader::from_parts(
            result.meta.clone(),
            terms,
            PostingsReader::new(result.postings_data.clone()),
            self.docs,
            self.symbols,
            stats,
        )?;
        Ok((result, reader))
    }
}

/// Collects the documents of one indexing run into a new segment.
///
/// Nothing reaches disk until [`SegmentWriter::commit`]; dropping the
/// writer discards the run.
pub struct SegmentWriter {
    id: SegmentId,
    store: Arc<SegmentStore>,
    acc: SegmentAccumulator,
}

impl SegmentWriter {
    pub(crate) fn new(id: SegmentId, store: Arc<SegmentStore>) -> Self {
        Self {
            id,
            store,
            acc: SegmentAccumulator::default(),
        }
    }

    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// Add a built document; a path may appear only once per segment
    pub fn add(&mut self, built: BuiltDocument) -> Result<DocNo> {
        let BuiltDocument {
            document,
            postings,
            symbols,
            ..
        } = built;
        let docno = self.acc.push_document(document, symbols)?;
        for ((field, term), positions) in postings {
            self.acc
                .push_posting(field, term, Posting::new(docno, positions));
        }
        Ok(docno)
    }

    pub fn len(&self) -> usize {
        self.acc.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.acc.docs.is_empty()
    }

    /// Encode and durably write the segment.
    ///
    /// Returns `None` without touching disk when no document was added.
    pub fn commit(self) -> Result<Option<Arc<SegmentReader>>> {
        if self.acc.docs.is_empty() {
            return Ok(None);
        }
        let (result, reader) = self.acc.finish(self.id)?;
        self.store.write_segment(&result)?;
        tracing::debug!(
            segment = %self.id,
            docs = result.meta.doc_count,
            bytes = result.meta.size_bytes,
            "committed segment"
        );
        Ok(Some(Arc::new(reader)))
    }
}

/// Output of merging several segments
pub struct MergeOutput {
    pub result: SegmentWriteResult,
    pub reader: SegmentReader,
    /// Per source segment, old docno to new docno for every surviving document
    pub remap: Vec<Vec<Option<DocNo>>>,
}

/// Merge the live documents of `sources` into a new segment.
///
/// Each source is paired with its tombstones. Sources must be ordered
/// oldest first; when two sources hold the same path only the newest copy
/// survives.
pub fn merge_segments(
    id: SegmentId,
    sources: &[(&SegmentReader, &RoaringBitmap)],
) -> Result<MergeOutput> {
    if sources.is_empty() {
        return Err(SourcedexError::InvalidRequest(
            "no segments to merge".to_string(),
        ));
    }

    let mut newest: HashMap<&str, usize> = HashMap::new();
    for (i, (segment, tombstones)) in sources.iter().enumerate() {
        for (docno, doc) in segment.documents() {
            if !tombstones.contains(docno.as_u32()) {
                newest.insert(doc.path.as_str(), i);
            }
        }
    }

    let mut acc = SegmentAccumulator::default();
    let mut remap = Vec::with_capacity(sources.len());
    for (i, (segment, tombstones)) in sources.iter().enumerate() {
        let mut map = vec![None; segment.doc_count() as usize];
        for (docno, doc) in segment.documents() {
            if tombstones.contains(docno.as_u32()) || newest.get(doc.path.as_str()) != Some(&i) {
                continue;
            }
            let new_docno = acc.push_document(doc.clone(), segment.symbols(docno).to_vec())?;
            map[docno.as_usize()] = Some(new_docno);
        }
        remap.push(map);
    }

    for (segment, map) in sources.iter().map(|(s, _)| s).zip(&remap) {
        for (field, term, meta) in segment.terms().iter_terms() {
            for posting in segment.read_postings_with(meta)? {
                if let Some(Some(new_docno)) = map.get(posting.docno.as_usize()) {
                    acc.push_posting(field, term.clone(), Posting::new(*new_docno, posting.positions));
                }
            }
        }
    }

    let (result, reader) = acc.finish(id)?;
    Ok(MergeOutput {
        result,
        reader,
        remap,
    })
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
