//! On-disk layout of a project index
//!
//! ```text
//! <index_dir>/
//!   manifest.json        published generation
//!   index.lock           held by the process owning the index
//!   seg_00000001/        one directory per committed segment
//!     meta.json
//!     postings.bin  terms.fst  terms.meta  docs.bin  symbols.bin  stats.bin
//! ```
//!
//! Segment directories are written under a `.tmp` name, synced, then
//! renamed into place, so a crash never leaves a half-written segment
//! under a real name. The manifest is replaced the same way.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::manifest::SegmentManifest;
use super::postings::PostingsReader;
use super::reader::{SegmentMeta, SegmentReader};
use super::statistics::SegmentStatistics;
use super::term_dict::TermDictionary;
use super::types::{PostingListMeta, SegmentId};
use super::writer::{checksum_parts, SegmentWriteResult};
use crate::error::{Result, SourcedexError};
use crate::models::{Document, SymbolEntry};

const MANIFEST_FILE: &str = "manifest.json";
const TMP_SUFFIX: &str = ".tmp";
const META_FILE: &str = "meta.json";
const POSTINGS_FILE: &str = "postings.bin";
const FST_FILE: &str = "terms.fst";
const TERM_META_FILE: &str = "terms.meta";
const DOCS_FILE: &str = "docs.bin";
const SYMBOLS_FILE: &str = "symbols.bin";
const STATS_FILE: &str = "stats.bin";

/// Persistent storage for segment files and the manifest
pub struct SegmentStore {
    base_dir: PathBuf,
}

impl SegmentStore {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> io::Result<Self> {
        fs::create_dir_all(&base_dir)?;
        Ok(Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn segment_dir(&self, id: SegmentId) -> PathBuf {
        self.base_dir.join(id.to_string())
    }

    pub fn write_segment(&self, result: &SegmentWriteResult) -> io::Result<()> {
        let id = result.meta.id;
        let final_dir = self.segment_dir(id);
        let tmp_dir = self.base_dir.join(format!("{}{}", id, TMP_SUFFIX));
        if tmp_dir.exists() {
            fs::remove_dir_all(&tmp_dir)?;
        }
        fs::create_dir_all(&tmp_dir)?;

        write_synced(&tmp_dir.join(POSTINGS_FILE), &result.postings_data)?;
        write_synced(&tmp_dir.join(FST_FILE), &result.fst_data)?;
        write_synced(&tmp_dir.join(TERM_META_FILE), &result.term_meta_data)?;
        write_synced(&tmp_dir.join(DOCS_FILE), &result.docs_data)?;
        write_synced(&tmp_dir.join(SYMBOLS_FILE), &result.symbols_data)?;
        write_synced(&tmp_dir.join(STATS_FILE), &result.stats_data)?;
        let meta = serde_json::to_vec_pretty(&result.meta)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        write_synced(&tmp_dir.join(META_FILE), &meta)?;
        sync_dir(&tmp_dir)?;

        fs::rename(&tmp_dir, &final_dir)?;
        sync_dir(&self.base_dir)
    }

    /// Load a segment, verifying its checksum against the manifest's record
    pub fn read_segment(&self, id: SegmentId, expected_checksum: u64) -> Result<SegmentReader> {
        let corrupt = |reason: String| SourcedexError::CorruptSegment {
            segment: id.0,
            reason,
        };
        let dir = self.segment_dir(id);
        let read = |name: &str| {
            fs::read(dir.join(name)).map_err(|e| corrupt(format!("cannot read {}: {}", name, e)))
        };

        let meta: SegmentMeta = serde_json::from_slice(&read(META_FILE)?)
            .map_err(|e| corrupt(format!("bad {}: {}", META_FILE, e)))?;
        let postings_data = read(POSTINGS_FILE)?;
        let fst_data = read(FST_FILE)?;
        let term_meta_data = read(TERM_META_FILE)?;
        let docs_data = read(DOCS_FILE)?;
        let symbols_data = read(SYMBOLS_FILE)?;
        let stats_data = read(STATS_FILE)?;

        let actual = checksum_parts(&[
            &postings_data,
            &fst_data,
            &term_meta_data,
            &docs_data,
            &symbols_data,
            &stats_data,
        ]);
        if meta.id != id || actual != meta.checksum || actual != expected_checksum {
            return Err(corrupt(format!(
                "checksum mismatch: manifest {:#x}, meta {:#x}, files {:#x}",
                expected_checksum, meta.checksum, actual
            )));
        }

        let term_metadata: Vec<PostingListMeta> = bincode::deserialize(&term_meta_data)
            .map_err(|e| corrupt(format!("bad {}: {}", TERM_META_FILE, e)))?;
        let docs: Vec<Document> = bincode::deserialize(&docs_data)
            .map_err(|e| corrupt(format!("bad {}: {}", DOCS_FILE, e)))?;
        let symbols: Vec<Vec<SymbolEntry>> = bincode::deserialize(&symbols_data)
            .map_err(|e| corrupt(format!("bad {}: {}", SYMBOLS_FILE, e)))?;
        let stats: SegmentStatistics = bincode::deserialize(&stats_data)
            .map_err(|e| corrupt(format!("bad {}: {}", STATS_FILE, e)))?;
        let terms = TermDictionary::new(fst_data, term_metadata)
            .map_err(|e| corrupt(format!("bad term dictionary: {}", e)))?;

        SegmentReader::from_parts(meta, terms, PostingsReader::new(postings_data), docs, symbols, stats)
            .map_err(|e| corrupt(e.to_string()))
    }

    pub fn remove_segment(&self, id: SegmentId) -> io::Result<()> {
        match fs::remove_dir_all(self.segment_dir(id)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// Segment directories present on disk, including unpublished ones
    pub fn list_segments(&self) -> io::Result<Vec<SegmentId>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|n| n.strip_prefix("seg_"))
                .and_then(|n| n.parse::<u64>().ok())
            {
                ids.push(SegmentId(id));
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Remove leftovers of interrupted segment or manifest writes
    pub fn remove_temp_files(&self) -> io::Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            let is_tmp = entry
                .file_name()
                .to_str()
                .map(|n| n.ends_with(TMP_SUFFIX))
                .unwrap_or(false);
            if !is_tmp {
                continue;
            }
            if entry.file_type()?.is_dir() {
                fs::remove_dir_all(entry.path())?;
            } else {
                fs::remove_file(entry.path())?;
            }
            removed += 1;
        }
        Ok(removed)
    }

    /// Atomically replace the manifest
    pub fn save_manifest(&self, manifest: &SegmentManifest) -> io::Result<()> {
        let bytes = manifest.to_json()?;
        let tmp = self.base_dir.join(format!("{}{}", MANIFEST_FILE, TMP_SUFFIX));
        write_synced(&tmp, &bytes)?;
        fs::rename(&tmp, self.base_dir.join(MANIFEST_FILE))?;
        sync_dir(&self.base_dir)
    }

    /// The published manifest, or `None` for a fresh index
    pub fn load_manifest(&self) -> io::Result<Option<SegmentManifest>> {
        let path = self.base_dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(path)?;
        SegmentManifest::from_json(&bytes).map(Some)
    }
}

fn write_synced(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(data)?;
    file.sync_all()
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::SegmentWriter;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn write_one(store: &Arc<SegmentStore>, id: u64) -> Arc<SegmentReader> {
        use crate::analysis::AnalyzerSet;
        use crate::config::AnalyzerConfig;
        use crate::document::DocumentBuilder;
        use crate::models::FileMeta;

        let builder = DocumentBuilder::new(Arc::new(AnalyzerSet::new(&AnalyzerConfig::default())));
        let text = "int main(void) { return 0; }\n";
        let meta = FileMeta {
            size: text.len() as u64,
            mtime_ms: 1,
        };
        let mut writer = SegmentWriter::new(SegmentId(id), Arc::clone(store));
        writer
            .add(builder.build("demo", "main.c", text.as_bytes(), meta, &[]))
            .unwrap();
        writer.commit().unwrap().unwrap()
    }

    #[test]
    fn test_write_and_read_segment() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SegmentStore::new(dir.path()).unwrap());
        let written = write_one(&store, 7);

        let read = store.read_segment(SegmentId(7), written.meta().checksum).unwrap();
        assert_eq!(read.meta(), written.meta());
        assert_eq!(read.find_path("main.c"), Some(crate::segment::DocNo(0)));
        assert_eq!(store.list_segments().unwrap(), vec![SegmentId(7)]);
    }

    #[test]
    fn test_corrupt_file_detected() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SegmentStore::new(dir.path()).unwrap());
        let written = write_one(&store, 1);

        let docs = store.segment_dir(SegmentId(1)).join(DOCS_FILE);
        let mut bytes = fs::read(&docs).unwrap();
        bytes[0] ^= 0xff;
        fs::write(&docs, bytes).unwrap();

        let err = store
            .read_segment(SegmentId(1), written.meta().checksum)
            .err()
            .unwrap();
        assert!(matches!(err, SourcedexError::CorruptSegment { segment: 1, .. }));
    }

    #[test]
    fn test_temp_files_removed() {
        let dir = TempDir::new().unwrap();
        let store = SegmentStore::new(dir.path()).unwrap();
        fs::create_dir_all(dir.path().join("seg_00000009.tmp")).unwrap();
        fs::write(dir.path().join("manifest.json.tmp"), b"{").unwrap();

        assert_eq!(store.remove_temp_files().unwrap(), 2);
        assert!(store.list_segments().unwrap().is_empty());
    }

    #[test]
    fn test_manifest_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = SegmentStore::new(dir.path()).unwrap();
        assert!(store.load_manifest().unwrap().is_none());

        let mut manifest = SegmentManifest::new();
        manifest.generation = 4;
        store.save_manifest(&manifest).unwrap();
        assert_eq!(store.load_manifest().unwrap().unwrap().generation, 4);
    }
}
