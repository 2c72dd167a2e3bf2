//! Helpers for query unit tests

use std::sync::Arc;

use tempfile::TempDir;

use super::ast::QueryNode;
use super::planner::QueryPlanner;
use super::scoring::CorpusStats;
use crate::analysis::AnalyzerSet;
use crate::document::DocumentBuilder;
use crate::models::FileMeta;
use crate::segment::{Generation, GenerationUpdate, LiveSegment, ProjectIndex};

/// A single committed segment holding `files`, docnos in the given order
pub(crate) fn segment_with(files: &[(&str, &str)]) -> LiveSegment {
    let dir = tempfile::tempdir().unwrap();
    let index = ProjectIndex::open("test", dir.path()).unwrap();
    let builder = DocumentBuilder::new(Arc::new(AnalyzerSet::default()));

    let mut writer = index.begin_segment();
    for (path, text) in files {
        let built = builder.build("test", path, text.as_bytes(), FileMeta::default(), &[]);
        writer.add(built).unwrap();
    }
    let reader = writer.commit().unwrap().unwrap();
    LiveSegment::new(reader)
}

/// Corpus statistics of `segment` for the terms of `query`
pub(crate) fn stats_for(segment: &LiveSegment, query: &dyn QueryNode) -> CorpusStats {
    CorpusStats::from_segments([segment], &QueryPlanner::terms(query))
}

/// A published project index holding `files` in one segment
///
/// The directory must outlive the returned generation's use.
pub(crate) fn published(name: &str, files: &[(&str, &str)]) -> (TempDir, Arc<Generation>) {
    let dir = tempfile::tempdir().unwrap();
    let index = ProjectIndex::open(name, dir.path()).unwrap();
    let builder = DocumentBuilder::new(Arc::new(AnalyzerSet::default()));
    let mut writer = index.begin_segment();
    for (path, text) in files {
        writer
            .add(builder.build(name, path, text.as_bytes(), FileMeta::default(), &[]))
            .unwrap();
    }
    let reader = writer.commit().unwrap().unwrap();
    index
        .publish(GenerationUpdate {
            add: vec![reader],
            delete_paths: Vec::new(),
        })
        .unwrap();
    (dir, index.snapshot())
}
