//! Project index: the published generation of segments for one project
//!
//! Readers pin a [`Generation`] with [`ProjectIndex::snapshot`] and keep
//! seeing it unchanged for as long as they hold it. Writers build segments
//! with [`ProjectIndex::begin_segment`] and make them visible with a single
//! [`ProjectIndex::publish`], which durably writes the manifest and then
//! swaps the generation pointer.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use roaring::RoaringBitmap;
use tracing::{debug, info, warn};

use super::lock::IndexLockGuard;
use super::manifest::{ManifestEntry, SegmentManifest};
use super::merge::{MergeCandidate, SegmentSummary};
use super::reader::SegmentReader;
use super::store::SegmentStore;
use super::types::{DocNo, SegmentId};
use super::writer::{merge_segments, SegmentWriter};
use crate::error::{Result, SourcedexError};
use crate::models::Document;

/// A segment as seen by one generation: the immutable reader plus the
/// documents deleted from it so far
#[derive(Clone)]
pub struct LiveSegment {
    pub reader: Arc<SegmentReader>,
    pub tombstones: RoaringBitmap,
}

impl LiveSegment {
    pub fn new(reader: Arc<SegmentReader>) -> Self {
        Self {
            reader,
            tombstones: RoaringBitmap::new(),
        }
    }

    pub fn id(&self) -> SegmentId {
        self.reader.id()
    }

    pub fn is_live(&self, docno: DocNo) -> bool {
        docno.as_u32() < self.reader.doc_count() && !self.tombstones.contains(docno.as_u32())
    }

    pub fn live_doc_count(&self) -> u32 {
        self.reader.doc_count() - self.tombstones.len() as u32
    }

    /// Live documents in docno order
    pub fn live_documents(&self) -> impl Iterator<Item = (DocNo, &Document)> + '_ {
        self.reader
            .documents()
            .filter(move |(docno, _)| !self.tombstones.contains(docno.as_u32()))
    }

    pub fn summary(&self) -> SegmentSummary {
        SegmentSummary {
            id: self.id(),
            size_bytes: self.reader.meta().size_bytes,
            doc_count: self.reader.doc_count(),
            deleted_count: self.tombstones.len() as u32,
        }
    }

    fn tombstone_path(&mut self, path: &str) -> bool {
        match self.reader.find_path(path) {
            Some(docno) => self.tombstones.insert(docno.as_u32()),
            None => false,
        }
    }
}

/// An immutable, published view of a project index
pub struct Generation {
    number: u64,
    segments: Vec<LiveSegment>,
}

impl Generation {
    pub fn empty() -> Self {
        Self {
            number: 0,
            segments: Vec::new(),
        }
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    /// Segments in ascending id order
    pub fn segments(&self) -> &[LiveSegment] {
        &self.segments
    }

    pub fn segment(&self, id: SegmentId) -> Option<&LiveSegment> {
        self.segments.iter().find(|s| s.id() == id)
    }

    pub fn live_doc_count(&self) -> u64 {
        self.segments.iter().map(|s| s.live_doc_count() as u64).sum()
    }

    pub fn total_doc_count(&self) -> u64 {
        self.segments.iter().map(|s| s.reader.doc_count() as u64).sum()
    }

    pub fn size_bytes(&self) -> u64 {
        self.segments.iter().map(|s| s.reader.meta().size_bytes).sum()
    }

    /// The live document for a path
    pub fn find_path(&self, path: &str) -> Option<(&LiveSegment, DocNo)> {
        self.segments.iter().rev().find_map(|segment| {
            segment
                .reader
                .find_path(path)
                .filter(|docno| segment.is_live(*docno))
                .map(|docno| (segment, docno))
        })
    }

    pub fn document(&self, path: &str) -> Option<&Document> {
        self.find_path(path)
            .and_then(|(segment, docno)| segment.reader.document(docno))
    }

    /// Every live document, oldest segment first
    pub fn live_documents(&self) -> impl Iterator<Item = &Document> + '_ {
        self.segments
            .iter()
            .flat_map(|s| s.live_documents().map(|(_, doc)| doc))
    }

    pub fn summaries(&self) -> Vec<SegmentSummary> {
        self.segments.iter().map(LiveSegment::summary).collect()
    }

    /// Structural checks: tombstones in range and one live copy per path
    pub fn verify(&self) -> std::result::Result<(), String> {
        let mut seen = HashSet::new();
        for segment in &self.segments {
            if let Some(max) = segment.tombstones.max() {
                if max >= segment.reader.doc_count() {
                    return Err(format!(
                        "segment {} tombstones docno {} beyond {} documents",
                        segment.id(),
                        max,
                        segment.reader.doc_count()
                    ));
                }
            }
            for (_, doc) in segment.live_documents() {
                if !seen.insert(doc.path.as_str()) {
                    return Err(format!("path {} is live more than once", doc.path));
                }
            }
        }
        Ok(())
    }

    fn to_manifest(&self, next_segment_id: SegmentId) -> SegmentManifest {
        SegmentManifest {
            version: SegmentManifest::VERSION,
            generation: self.number,
            next_segment_id,
            segments: self
                .segments
                .iter()
                .map(|s| ManifestEntry {
                    meta: s.reader.meta().clone(),
                    tombstones: s.tombstones.iter().collect(),
                })
                .collect(),
            updated_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }
}

/// Changes applied atomically by one publish
#[derive(Default)]
pub struct GenerationUpdate {
    /// New segments, oldest first. Any older live copy of a path they
    /// contain is tombstoned.
    pub add: Vec<Arc<SegmentReader>>,
    /// Paths removed from the project
    pub delete_paths: Vec<String>,
}

impl GenerationUpdate {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.delete_paths.is_empty()
    }
}

/// Summary of a project index for status endpoints
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct IndexStats {
    pub generation: u64,
    pub segment_count: usize,
    pub doc_count: u64,
    pub live_doc_count: u64,
    pub size_bytes: u64,
}

pub struct ProjectIndex {
    name: String,
    store: Arc<SegmentStore>,
    current: ArcSwap<Generation>,
    publish_lock: Mutex<()>,
    next_segment_id: AtomicU64,
    /// Segments dropped from the published generation but maybe still pinned
    retired: Mutex<Vec<Arc<SegmentReader>>>,
    verify_on_publish: bool,
}

impl ProjectIndex {
    /// Open or create the index stored in `dir`.
    ///
    /// Leftover temporary files and segment directories that no manifest
    /// references are removed. A segment failing its checksum makes the
    /// whole open fail with [`SourcedexError::CorruptSegment`].
    pub fn open(name: impl Into<String>, dir: impl AsRef<Path>) -> Result<Self> {
        let name = name.into();
        let store = Arc::new(SegmentStore::new(dir.as_ref())?);
        let _lock = IndexLockGuard::acquire(store.base_dir())?;

        let removed = store.remove_temp_files()?;
        let manifest = store.load_manifest()?.unwrap_or_default();

        let mut segments = Vec::with_capacity(manifest.segments.len());
        for entry in &manifest.segments {
            let reader = store.read_segment(entry.meta.id, entry.meta.checksum)?;
            let tombstones: RoaringBitmap = entry.tombstones.iter().copied().collect();
            segments.push(LiveSegment {
                reader: Arc::new(reader),
                tombstones,
            });
        }

        let referenced: HashSet<SegmentId> = manifest.segment_ids().collect();
        let mut next_id = manifest.next_segment_id.0;
        let mut orphans = 0;
        for id in store.list_segments()? {
            next_id = next_id.max(id.0 + 1);
            if !referenced.contains(&id) {
                store.remove_segment(id)?;
                orphans += 1;
            }
        }

        let generation = Generation {
            number: manifest.generation,
            segments,
        };
        info!(
            project = %name,
            generation = generation.number,
            segments = generation.segments.len(),
            live_docs = generation.live_doc_count(),
            removed_temp = removed,
            removed_orphans = orphans,
            "opened project index"
        );

        Ok(Self {
            name,
            store,
            current: ArcSwap::from_pointee(generation),
            publish_lock: Mutex::new(()),
            next_segment_id: AtomicU64::new(next_id),
            retired: Mutex::new(Vec::new()),
            verify_on_publish: false,
        })
    }

    /// Check generation invariants before every publish
    pub fn with_verification(mut self, enabled: bool) -> Self {
        self.verify_on_publish = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        self.store.base_dir()
    }

    /// Pin the current generation
    pub fn snapshot(&self) -> Arc<Generation> {
        self.current.load_full()
    }

    pub fn generation(&self) -> u64 {
        self.current.load().number
    }

    pub fn stats(&self) -> IndexStats {
        let generation = self.current.load();
        IndexStats {
            generation: generation.number,
            segment_count: generation.segments.len(),
            doc_count: generation.total_doc_count(),
            live_doc_count: generation.live_doc_count(),
            size_bytes: generation.size_bytes(),
        }
    }

    fn allocate_segment_id(&self) -> SegmentId {
        SegmentId(self.next_segment_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Start a new segment; nothing is visible until it is committed and published
    pub fn begin_segment(&self) -> SegmentWriter {
        SegmentWriter::new(self.allocate_segment_id(), Arc::clone(&self.store))
    }

    /// Atomically publish new segments and deletions as the next generation.
    ///
    /// Returns the new generation number. An empty update publishes nothing
    /// and returns the current number.
    pub fn publish(&self, update: GenerationUpdate) -> Result<u64> {
        if update.is_empty() {
            return Ok(self.generation());
        }
        let _guard = self.publish_lock.lock();
        let _file_lock = IndexLockGuard::acquire(self.store.base_dir())?;
        let current = self.current.load_full();

        let mut segments: Vec<LiveSegment> = current.segments.clone();
        let mut deleted = 0usize;
        for path in &update.delete_paths {
            for segment in segments.iter_mut() {
                if segment.tombstone_path(path) {
                    deleted += 1;
                }
            }
        }
        for reader in &update.add {
            if segments.iter().any(|s| s.id() == reader.id()) {
                return Err(SourcedexError::InvalidRequest(format!(
                    "segment {} is already published",
                    reader.id()
                )));
            }
            for (_, doc) in reader.documents() {
                for segment in segments.iter_mut() {
                    segment.tombstone_path(&doc.path);
                }
            }
            segments.push(LiveSegment::new(Arc::clone(reader)));
        }

        let number = self.install(&current, segments, Vec::new())?;
        debug!(
            project = %self.name,
            generation = number,
            added = update.add.len(),
            deleted,
            "published generation"
        );
        Ok(number)
    }

    /// Merge the segments of `candidate` into one.
    ///
    /// Returns the id of the merged segment, or `None` when the candidate
    /// no longer matches the published generation or every document in it
    /// was deleted (the sources are then simply dropped).
    pub fn compact(&self, candidate: &MergeCandidate) -> Result<Option<SegmentId>> {
        let merged = self.merge_and_install(candidate)?;
        self.collect_garbage();
        Ok(merged)
    }

    fn merge_and_install(&self, candidate: &MergeCandidate) -> Result<Option<SegmentId>> {
        let snapshot = self.snapshot();
        let mut sources = Vec::with_capacity(candidate.segment_ids.len());
        for id in &candidate.segment_ids {
            match snapshot.segment(*id) {
                Some(segment) => sources.push(segment),
                None => return Ok(None),
            }
        }
        if sources.is_empty() {
            return Ok(None);
        }

        let id = self.allocate_segment_id();
        let pairs: Vec<_> = sources
            .iter()
            .map(|s| (s.reader.as_ref(), &s.tombstones))
            .collect();
        let output = merge_segments(id, &pairs)?;
        let merged_empty = output.reader.doc_count() == 0;
        if !merged_empty {
            self.store.write_segment(&output.result)?;
        }

        let _guard = self.publish_lock.lock();
        let _file_lock = IndexLockGuard::acquire(self.store.base_dir())?;
        let current = self.current.load_full();

        let mut merged_tombstones = RoaringBitmap::new();
        for (i, source) in sources.iter().enumerate() {
            let now = match current.segment(source.id()) {
                Some(now) => now,
                None => {
                    if !merged_empty {
                        self.store.remove_segment(id)?;
                    }
                    return Ok(None);
                }
            };
            for docno in &now.tombstones - &source.tombstones {
                if let Some(Some(new_docno)) = output.remap[i].get(docno as usize) {
                    merged_tombstones.insert(new_docno.as_u32());
                }
            }
        }

        let retiring: HashSet<SegmentId> = candidate.segment_ids.iter().copied().collect();
        let (retired, mut segments): (Vec<LiveSegment>, Vec<LiveSegment>) = current
            .segments
            .iter()
            .cloned()
            .partition(|s| retiring.contains(&s.id()));
        if !merged_empty {
            segments.push(LiveSegment {
                reader: Arc::new(output.reader),
                tombstones: merged_tombstones,
            });
            segments.sort_by_key(LiveSegment::id);
        }

        let retired: Vec<Arc<SegmentReader>> = retired.into_iter().map(|s| s.reader).collect();
        let number = self.install(&current, segments, retired)?;
        info!(
            project = %self.name,
            generation = number,
            merged = candidate.segment_ids.len(),
            reason = ?candidate.reason,
            "compacted segments"
        );
        Ok((!merged_empty).then_some(id))
    }

    /// Write the manifest for `segments` and make it the current generation.
    /// Must be called with the publish lock held.
    fn install(
        &self,
        current: &Generation,
        segments: Vec<LiveSegment>,
        retired: Vec<Arc<SegmentReader>>,
    ) -> Result<u64> {
        let generation = Generation {
            number: current.number + 1,
            segments,
        };
        if self.verify_on_publish {
            generation.verify().map_err(SourcedexError::Internal)?;
        }
        let next_id = SegmentId(self.next_segment_id.load(Ordering::SeqCst));
        self.store.save_manifest(&generation.to_manifest(next_id))?;

        let number = generation.number;
        self.current.store(Arc::new(generation));
        self.retired.lock().extend(retired);
        self.collect_garbage();
        Ok(number)
    }

    /// Delete files of retired segments that no pinned generation still uses.
    /// Returns how many segments were removed.
    pub fn collect_garbage(&self) -> usize {
        let mut retired = self.retired.lock();
        let mut removed = 0;
        retired.retain(|reader| {
            if Arc::strong_count(reader) > 1 {
                return true;
            }
            match self.store.remove_segment(reader.id()) {
                Ok(()) => {
                    removed += 1;
                    false
                }
                Err(e) => {
                    warn!(project = %self.name, segment = %reader.id(), error = %e, "failed to remove retired segment");
                    true
                }
            }
        });
        removed
    }

    pub fn pending_garbage(&self) -> usize {
        self.retired.lock().len()
    }
}
