//! Segment manifest: the durable record of a published generation
//!
//! Publishing follows a fixed order:
//! 1. Write new segment files, fsync, rename the segment directory into place
//! 2. Write `manifest.json.tmp`, fsync
//! 3. Atomically rename it to `manifest.json`, fsync the directory
//! 4. Only then swap the in-memory generation seen by queries

use std::io;

use serde::{Deserialize, Serialize};

use super::reader::SegmentMeta;
use super::types::SegmentId;

/// Manifest entry for a segment
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub meta: SegmentMeta,
    /// Deleted docnos of this segment, ascending
    #[serde(default)]
    pub tombstones: Vec<u32>,
}

impl ManifestEntry {
    pub fn new(meta: SegmentMeta) -> Self {
        Self {
            meta,
            tombstones: Vec::new(),
        }
    }

    pub fn live_doc_count(&self) -> u32 {
        self.meta.doc_count.saturating_sub(self.tombstones.len() as u32)
    }
}

/// The segment manifest tracks all segments of a published generation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentManifest {
    /// Manifest format version
    pub version: u32,
    /// Generation number, incremented on each publish
    pub generation: u64,
    /// Next segment ID to allocate
    pub next_segment_id: SegmentId,
    /// Live segments, oldest first
    pub segments: Vec<ManifestEntry>,
    /// Unix seconds of the publish that wrote this manifest
    pub updated_at: u64,
}

impl SegmentManifest {
    pub const VERSION: u32 = 1;

    pub fn new() -> Self {
        Self {
            version: Self::VERSION,
            generation: 0,
            next_segment_id: SegmentId::new(1),
            segments: Vec::new(),
            updated_at: 0,
        }
    }

    pub fn total_doc_count(&self) -> u64 {
        self.segments.iter().map(|e| e.meta.doc_count as u64).sum()
    }

    pub fn live_doc_count(&self) -> u64 {
        self.segments.iter().map(|e| e.live_doc_count() as u64).sum()
    }

    pub fn total_size_bytes(&self) -> u64 {
        self.segments.iter().map(|e| e.meta.size_bytes).sum()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn get_segment(&self, segment_id: SegmentId) -> Option<&ManifestEntry> {
        self.segments.iter().find(|e| e.meta.id == segment_id)
    }

    pub fn segment_ids(&self) -> impl Iterator<Item = SegmentId> + '_ {
        self.segments.iter().map(|e| e.meta.id)
    }

    pub fn to_json(&self) -> io::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    pub fn from_json(data: &[u8]) -> io::Result<Self> {
        let manifest: SegmentManifest = serde_json::from_slice(data)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if manifest.version > Self::VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported manifest version {}", manifest.version),
            ));
        }
        Ok(manifest)
    }
}

impl Default for SegmentManifest {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u64, doc_count: u32, tombstones: Vec<u32>) -> ManifestEntry {
        ManifestEntry {
            meta: SegmentMeta {
                id: SegmentId(id),
                doc_count,
                size_bytes: 1024,
                created_at: 0,
                checksum: 42,
            },
            tombstones,
        }
    }

    #[test]
    fn test_manifest_counts() {
        let mut manifest = SegmentManifest::new();
        assert!(manifest.is_empty());

        manifest.segments.push(entry(1, 10, vec![2, 3]));
        manifest.segments.push(entry(2, 5, vec![]));

        assert_eq!(manifest.segment_count(), 2);
        assert_eq!(manifest.total_doc_count(), 15);
        assert_eq!(manifest.live_doc_count(), 13);
        assert_eq!(manifest.total_size_bytes(), 2048);
        assert!(manifest.get_segment(SegmentId(2)).is_some());
        assert!(manifest.get_segment(SegmentId(3)).is_none());
    }

    #[test]
    fn test_manifest_json() {
        let mut manifest = SegmentManifest::new();
        manifest.generation = 3;
        manifest.next_segment_id = SegmentId(4);
        manifest.segments.push(entry(3, 2, vec![1]));

        let json = manifest.to_json().unwrap();
        let restored = SegmentManifest::from_json(&json).unwrap();
        assert_eq!(restored, manifest);
    }

    #[test]
    fn test_future_version_rejected() {
        let mut manifest = SegmentManifest::new();
        manifest.version = SegmentManifest::VERSION + 1;
        let json = serde_json::to_vec(&manifest).unwrap();
        assert!(SegmentManifest::from_json(&json).is_err());
    }

    #[test]
    fn test_missing_tombstones_default_to_empty() {
        let json = r#"{"version":1,"generation":1,"next_segment_id":2,"updated_at":0,
            "segments":[{"meta":{"id":1,"doc_count":1,"size_bytes":1,"created_at":0,"checksum":0}}]}"#;
        let manifest = SegmentManifest::from_json(json.as_bytes()).unwrap();
        assert!(manifest.segments[0].tombstones.is_empty());
    }
}
