//! Indexing run states and the report returned to callers.

use std::fmt;

use serde::Serialize;

use crate::error::{Result, SourcedexError};
use crate::segment::SegmentId;

/// Lifecycle of one indexing run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Scanning,
    Dispatching,
    Committing,
    Publishing,
    Done,
    Aborted,
}

impl RunState {
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Scanning, Dispatching)
                | (Scanning, Aborted)
                | (Dispatching, Committing)
                | (Dispatching, Done)
                | (Dispatching, Aborted)
                | (Committing, Publishing)
                | (Committing, Aborted)
                | (Publishing, Done)
                | (Publishing, Aborted)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Aborted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Scanning => "scanning",
            RunState::Dispatching => "dispatching",
            RunState::Committing => "committing",
            RunState::Publishing => "publishing",
            RunState::Done => "done",
            RunState::Aborted => "aborted",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A problem with one file that did not stop the run
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileWarning {
    pub path: String,
    pub message: String,
}

/// Outcome of `IndexScheduler::index_project`
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexingReport {
    pub project: String,
    pub state: RunState,
    /// Every state the run passed through, starting with `Scanning`
    pub transitions: Vec<RunState>,
    pub files_scanned: usize,
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub warnings: Vec<FileWarning>,
    /// Segment written by this run, if any file changed
    pub segment: Option<SegmentId>,
    /// Generation published by this run
    pub generation: Option<u64>,
    pub duration_ms: u64,
}

impl IndexingReport {
    pub(crate) fn new(project: &str) -> Self {
        Self {
            project: project.to_string(),
            state: RunState::Scanning,
            transitions: vec![RunState::Scanning],
            files_scanned: 0,
            added: 0,
            modified: 0,
            deleted: 0,
            unchanged: 0,
            warnings: Vec::new(),
            segment: None,
            generation: None,
            duration_ms: 0,
        }
    }

    /// Move to `next`, refusing transitions the run lifecycle does not allow
    pub(crate) fn transition(&mut self, next: RunState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(SourcedexError::Internal(format!(
                "invalid indexing transition {} -> {}",
                self.state, next
            )));
        }
        tracing::debug!(project = %self.project, from = %self.state, to = %next, "indexing state");
        self.state = next;
        self.transitions.push(next);
        Ok(())
    }

    pub(crate) fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(FileWarning {
            path: path.into(),
            message: message.into(),
        });
    }

    pub fn changed(&self) -> usize {
        self.added + self.modified + self.deleted
    }
}
