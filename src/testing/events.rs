//! Event types for capturing indexing runs and searches
//!
//! Events record what a caller asked for and what it observed, so the
//! invariant checkers can verify a history after the fact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::document::content_hash;
use crate::segment::Generation;

/// Unique identifier for an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(pub u64);

impl OperationId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Content hash of every file, keyed by project-relative path
pub type PathHashes = BTreeMap<String, String>;

/// Type of operation in the system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OperationType {
    /// Index a project whose tree held `tree` when the run started
    IndexRun { project: String, tree: PathHashes },
    /// Search a project
    Search { project: String, query: String },
}

impl OperationType {
    pub fn project(&self) -> &str {
        match self {
            OperationType::IndexRun { project, .. } | OperationType::Search { project, .. } => project,
        }
    }
}

/// Result of an operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OperationResult {
    /// Live documents of the generation the run left published
    Indexed {
        generation_before: u64,
        generation: u64,
        documents: PathHashes,
    },
    /// Hit paths in rank order, with the documents of the searched generation
    Hits {
        generation: u64,
        paths: Vec<String>,
        documents: PathHashes,
        partial: bool,
    },
    /// Operation failed
    Error { message: String },
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp_nanos_opt().unwrap_or(0))
    }

    pub fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.0)
    }
}

/// A recorded event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub op_id: OperationId,
    pub op_type: OperationType,
    pub invoke_time: Timestamp,
    /// None while the operation is pending
    pub return_time: Option<Timestamp>,
    pub result: Option<OperationResult>,
}

impl Event {
    pub fn invoke(op_id: OperationId, op_type: OperationType) -> Self {
        Self {
            op_id,
            op_type,
            invoke_time: Timestamp::now(),
            return_time: None,
            result: None,
        }
    }

    pub fn complete(&mut self, result: OperationResult) {
        self.return_time = Some(Timestamp::now());
        self.result = Some(result);
    }

    pub fn is_complete(&self) -> bool {
        self.return_time.is_some() && self.result.is_some()
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Op({}) {:?} -> ", self.op_id.0, self.op_type)?;
        match &self.result {
            Some(result) => write!(f, "{:?}", result),
            None => write!(f, "<pending>"),
        }
    }
}

/// Path hashes of the live documents in `generation`
pub fn generation_documents(generation: &Generation) -> PathHashes {
    generation
        .live_documents()
        .map(|d| (d.path.clone(), d.content_hash.clone()))
        .collect()
}

/// Path hashes of the regular files under `root`, hidden entries excluded
pub fn tree_hashes(root: &Path) -> std::io::Result<PathHashes> {
    let mut hashes = PathHashes::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                let relative = path
                    .strip_prefix(root)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                hashes.insert(relative, content_hash(&std::fs::read(&path)?));
            }
        }
    }
    Ok(hashes)
}
