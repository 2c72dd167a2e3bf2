//! Indexing scheduler
//!
//! One run walks the project tree, classifies files against the published
//! generation, rebuilds changed files on a bounded worker pool, writes the
//! results into a single new segment and publishes it together with the
//! tombstones of deleted files.

mod compactor;
mod diff;
mod history;
mod pool;
mod report;
mod retry;
mod walker;

pub use compactor::{compact_fully, compact_once, spawn_compactor, CompactorHandle};
pub use diff::{plan_changes, Change, ChangePlan, FileJob};
pub use history::{GitHistory, HistorySource, NoHistory};
pub use pool::run_pool;
pub use report::{FileWarning, IndexingReport, RunState};
pub use retry::with_backoff;
pub use walker::{walk, WalkedFile};

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};

use crate::analysis::AnalyzerSet;
use crate::cancel::CancelToken;
use crate::config::{IndexSettings, SchedulerConfig};
use crate::document::{content_hash, BuiltDocument, DocumentBuilder};
use crate::error::{Result, SourcedexError};
use crate::metrics::SourcedexMetrics;
use crate::segment::{GenerationUpdate, ProjectIndex, SegmentWriter};

/// What a worker produced for one file
enum FileOutcome {
    Built { built: BuiltDocument, added: bool },
    /// Metadata changed but the content hash did not
    Unchanged,
    /// The file could not be read; its indexed version is kept
    Failed { path: String, message: String },
}

pub struct IndexScheduler {
    config: SchedulerConfig,
    builder: DocumentBuilder,
    metrics: Option<Arc<SourcedexMetrics>>,
}

impl IndexScheduler {
    pub fn new(settings: &IndexSettings) -> Self {
        Self::with_analyzers(
            settings.scheduler.clone(),
            Arc::new(AnalyzerSet::new(&settings.analyzer)),
        )
    }

    pub fn with_analyzers(config: SchedulerConfig, analyzers: Arc<AnalyzerSet>) -> Self {
        Self {
            config,
            builder: DocumentBuilder::new(analyzers),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<SourcedexMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Bring `index` up to date with the tree under `root`.
    ///
    /// History messages come from git when enabled and `root` is a work tree.
    pub fn index_project(
        &self,
        index: &ProjectIndex,
        root: &Path,
        cancel: &CancelToken,
    ) -> Result<IndexingReport> {
        if self.config.history_enabled {
            let history = GitHistory::load_or_empty(root, self.config.history_max_commits);
            self.index_project_with_history(index, root, &history, cancel)
        } else {
            self.index_project_with_history(index, root, &NoHistory, cancel)
        }
    }

    pub fn index_project_with_history(
        &self,
        index: &ProjectIndex,
        root: &Path,
        history: &dyn HistorySource,
        cancel: &CancelToken,
    ) -> Result<IndexingReport> {
        let started = Instant::now();
        let mut report = IndexingReport::new(index.name());
        let outcome = self.run(index, root, history, cancel, &mut report);
        report.duration_ms = started.elapsed().as_millis() as u64;

        if let Err(e) = &outcome {
            let failed_in = report.state;
            if !failed_in.is_terminal() {
                report.transition(RunState::Aborted)?;
            }
            error!(project = index.name(), state = %failed_in, error = %e, "indexing aborted");
        } else {
            info!(
                project = index.name(),
                scanned = report.files_scanned,
                added = report.added,
                modified = report.modified,
                deleted = report.deleted,
                warnings = report.warnings.len(),
                generation = ?report.generation,
                duration_ms = report.duration_ms,
                "indexing finished"
            );
        }
        if let Some(metrics) = &self.metrics {
            metrics.record_run(&report);
            metrics.set_index_stats(index.name(), &index.stats());
        }
        outcome.map(|()| report)
    }

    fn run(
        &self,
        index: &ProjectIndex,
        root: &Path,
        history: &dyn HistorySource,
        cancel: &CancelToken,
        report: &mut IndexingReport,
    ) -> Result<()> {
        if !root.is_dir() {
            return Err(SourcedexError::RootMissing(root.display().to_string()));
        }
        let generation = index.snapshot();
        let (files, walk_errors) = walk(root, Some(index.dir()), &self.config);
        let mut unreadable = HashSet::new();
        for (path, message) in walk_errors {
            warn!(project = index.name(), path = %path, error = %message, "walk error");
            if !path.is_empty() {
                unreadable.insert(path.clone());
            }
            report.warn(path, message);
        }
        report.files_scanned = files.len();
        let plan = plan_changes(files, &unreadable, &generation, self.builder.analyzers());
        report.unchanged = plan.unchanged;
        report.deleted = plan.deleted.len();
        drop(generation);

        report.transition(RunState::Dispatching)?;
        cancel.check()?;
        let project = index.name();
        let outcomes = run_pool(
            plan.jobs,
            self.config.worker_threads,
            self.config.queue_capacity(),
            cancel,
            |job| self.process(project, job, history),
        )?;

        let mut writer: Option<SegmentWriter> = None;
        for outcome in outcomes {
            match outcome {
                FileOutcome::Built { built, added } => {
                    if added {
                        report.added += 1;
                    } else {
                        report.modified += 1;
                    }
                    for message in &built.warnings {
                        report.warn(built.document.path.clone(), message.clone());
                    }
                    writer
                        .get_or_insert_with(|| index.begin_segment())
                        .add(built)?;
                }
                FileOutcome::Unchanged => report.unchanged += 1,
                FileOutcome::Failed { path, message } => report.warn(path, message),
            }
        }

        if writer.is_none() && plan.deleted.is_empty() {
            return report.transition(RunState::Done);
        }
        cancel.check()?;

        report.transition(RunState::Committing)?;
        let segment = match writer {
            Some(writer) => writer.commit()?,
            None => None,
        };
        report.segment = segment.as_ref().map(|s| s.id());

        report.transition(RunState::Publishing)?;
        let generation = index.publish(GenerationUpdate {
            add: segment.into_iter().collect(),
            delete_paths: plan.deleted,
        })?;
        report.generation = Some(generation);
        report.transition(RunState::Done)
    }

    fn process(&self, project: &str, job: FileJob, history: &dyn HistorySource) -> FileOutcome {
        let bytes = with_backoff(&self.config.retry, "read source file", || {
            fs::read(&job.abs_path).map_err(SourcedexError::from)
        });
        let bytes = match bytes {
            Ok(bytes) => bytes,
            Err(e) => {
                return FileOutcome::Failed {
                    path: job.path,
                    message: format!("cannot read file: {}", e),
                }
            }
        };
        let added = match &job.change {
            Change::Added => true,
            Change::Modified {
                previous_hash: Some(previous),
            } if *previous == content_hash(&bytes) => return FileOutcome::Unchanged,
            Change::Modified { .. } => false,
        };
        let messages = history.messages(&job.path);
        let built = self
            .builder
            .build(project, &job.path, &bytes, job.meta, &messages);
        FileOutcome::Built { built, added }
    }
}
