//! Classification of walked files against the published generation.

use std::collections::HashSet;
use std::path::PathBuf;

use super::walker::WalkedFile;
use crate::analysis::AnalyzerSet;
use crate::models::{Document, FileMeta};
use crate::segment::Generation;

/// Why a file is handed to the document builder
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Change {
    Added,
    /// Size or mtime differ. The content hash decides whether the file
    /// really changed; `None` forces a rebuild (analyzer upgraded).
    Modified { previous_hash: Option<String> },
}

#[derive(Clone, Debug)]
pub struct FileJob {
    pub path: String,
    pub abs_path: PathBuf,
    pub meta: FileMeta,
    pub change: Change,
}

#[derive(Debug, Default)]
pub struct ChangePlan {
    /// Files to rebuild, in path order
    pub jobs: Vec<FileJob>,
    /// Indexed paths no longer present, in path order
    pub deleted: Vec<String>,
    pub unchanged: usize,
}

/// Compare `files` with the live documents of `generation`.
///
/// Paths in `unreadable` were seen by the walk but could not be inspected;
/// their indexed version is kept rather than deleted.
pub fn plan_changes(
    files: Vec<WalkedFile>,
    unreadable: &HashSet<String>,
    generation: &Generation,
    analyzers: &AnalyzerSet,
) -> ChangePlan {
    let mut plan = ChangePlan::default();
    let mut present: HashSet<String> = HashSet::with_capacity(files.len());

    for file in files {
        present.insert(file.path.clone());
        let change = match generation.document(&file.path) {
            None => Change::Added,
            Some(doc) if analyzer_outdated(doc, analyzers) => Change::Modified {
                previous_hash: None,
            },
            Some(doc) if doc.size == file.meta.size && doc.mtime_ms == file.meta.mtime_ms => {
                plan.unchanged += 1;
                continue;
            }
            Some(doc) => Change::Modified {
                previous_hash: Some(doc.content_hash.clone()),
            },
        };
        plan.jobs.push(FileJob {
            path: file.path,
            abs_path: file.abs_path,
            meta: file.meta,
            change,
        });
    }

    plan.deleted = generation
        .live_documents()
        .filter(|doc| !present.contains(&doc.path) && !unreadable.contains(&doc.path))
        .map(|doc| doc.path.clone())
        .collect();
    plan.deleted.sort();
    plan
}

fn analyzer_outdated(doc: &Document, analyzers: &AnalyzerSet) -> bool {
    let current = analyzers.for_family(doc.language.family());
    current.id() != doc.analyzer || current.version() != doc.analyzer_version
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentBuilder;
    use crate::segment::{GenerationUpdate, ProjectIndex};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn walked(path: &str, size: u64, mtime_ms: u64) -> WalkedFile {
        WalkedFile {
            path: path.to_string(),
            abs_path: PathBuf::from(path),
            meta: FileMeta { size, mtime_ms },
        }
    }

    #[test]
    fn test_plan_against_indexed_state() {
        let dir = TempDir::new().unwrap();
        let index = ProjectIndex::open("demo", dir.path()).unwrap();
        let analyzers = Arc::new(AnalyzerSet::default());
        let builder = DocumentBuilder::new(Arc::clone(&analyzers));

        let mut writer = index.begin_segment();
        for (path, text) in [("same.c", "int a;"), ("touched.c", "int b;"), ("gone.c", "int c;"), ("locked.c", "int d;")] {
            let meta = FileMeta {
                size: text.len() as u64,
                mtime_ms: 100,
            };
            writer
                .add(builder.build("demo", path, text.as_bytes(), meta, &[]))
                .unwrap();
        }
        let segment = writer.commit().unwrap().unwrap();
        index
            .publish(GenerationUpdate {
                add: vec![segment],
                ..Default::default()
            })
            .unwrap();

        let files = vec![
            walked("new.c", 3, 1),
            walked("same.c", 6, 100),
            walked("touched.c", 6, 200),
        ];
        let unreadable: HashSet<String> = ["locked.c".to_string()].into_iter().collect();
        let plan = plan_changes(files, &unreadable, &index.snapshot(), &analyzers);

        assert_eq!(plan.unchanged, 1);
        assert_eq!(plan.deleted, vec!["gone.c"]);
        assert_eq!(plan.jobs.len(), 2);
        assert_eq!(plan.jobs[0].change, Change::Added);
        assert!(matches!(
            &plan.jobs[1].change,
            Change::Modified { previous_hash: Some(_) }
        ));
    }
}
