//! Segment-based inverted index
//!
//! Each project has its own index directory holding immutable segments and
//! a manifest naming the published generation.
//!
//! # Architecture
//!
//! - `SegmentWriter`: accumulates built documents and writes one segment
//! - `SegmentReader`: decoded term dictionary, postings, documents and symbols
//! - `SegmentStore`: on-disk layout, checksums and atomic renames
//! - `ProjectIndex`: the current `Generation`, publish and compaction
//! - `TieredMergePolicy`: chooses which segments to compact

mod index;
mod lock;
mod manifest;
mod merge;
mod postings;
mod reader;
mod statistics;
mod store;
mod term_dict;
mod types;
mod writer;

pub use index::*;
pub use lock::*;
pub use manifest::*;
pub use merge::*;
pub use postings::*;
pub use reader::*;
pub use statistics::*;
pub use store::*;
pub use term_dict::*;
pub use types::*;
pub use writer::*;
