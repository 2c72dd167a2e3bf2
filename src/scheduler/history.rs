//! Per-file history messages for the `hist` field.

use std::collections::HashMap;
use std::path::Path;
use std::process::Command;

use tracing::{debug, warn};

use crate::error::{Result, SourcedexError};

/// Supplies history messages (commit summaries) for files of a project
pub trait HistorySource: Send + Sync {
    /// Messages for a project-relative path, newest first
    fn messages(&self, path: &str) -> Vec<String>;
}

/// No history; the `hist` field stays empty
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHistory;

impl HistorySource for NoHistory {
    fn messages(&self, _path: &str) -> Vec<String> {
        Vec::new()
    }
}

/// History read once per run from `git log`
#[derive(Debug, Default)]
pub struct GitHistory {
    by_path: HashMap<String, Vec<String>>,
}

const RECORD_SEPARATOR: char = '\u{1e}';

impl GitHistory {
    /// Read the last `max_commits` commits of the repository at `root`
    pub fn load(root: &Path, max_commits: usize) -> Result<Self> {
        let output = Command::new("git")
            .arg("-C")
            .arg(root)
            .args(["log", "--name-only", "--no-renames"])
            .arg(format!("--format={}%s", RECORD_SEPARATOR))
            .arg(format!("-n{}", max_commits))
            .output()?;
        if !output.status.success() {
            return Err(SourcedexError::Internal(format!(
                "git log failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let history = Self::parse(&String::from_utf8_lossy(&output.stdout));
        debug!(root = %root.display(), files = history.by_path.len(), "loaded git history");
        Ok(history)
    }

    /// Load history if `root` is a git work tree, otherwise none
    pub fn load_or_empty(root: &Path, max_commits: usize) -> Self {
        if !root.join(".git").exists() {
            return Self::default();
        }
        Self::load(root, max_commits).unwrap_or_else(|e| {
            warn!(root = %root.display(), error = %e, "history unavailable");
            Self::default()
        })
    }

    /// Parse `git log --name-only` output with record-separated subjects
    pub fn parse(log: &str) -> Self {
        let mut by_path: HashMap<String, Vec<String>> = HashMap::new();
        for record in log.split(RECORD_SEPARATOR).filter(|r| !r.trim().is_empty()) {
            let mut lines = record.lines();
            let subject = lines.next().unwrap_or("").trim();
            if subject.is_empty() {
                continue;
            }
            for path in lines.map(str::trim).filter(|l| !l.is_empty()) {
                by_path
                    .entry(path.to_string())
                    .or_default()
                    .push(subject.to_string());
            }
        }
        Self { by_path }
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}

impl HistorySource for GitHistory {
    fn messages(&self, path: &str) -> Vec<String> {
        self.by_path.get(path).cloned().unwrap_or_default()
    }
}
