//! Background compaction.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, RecvTimeoutError, Sender};
use tracing::{debug, warn};

use crate::error::Result;
use crate::metrics::SourcedexMetrics;
use crate::segment::{MergePolicyConfig, ProjectIndex, SegmentId, TieredMergePolicy};

/// Run the most urgent merge the policy finds, if any
pub fn compact_once(index: &ProjectIndex, policy: &TieredMergePolicy) -> Result<Option<SegmentId>> {
    let summaries = index.snapshot().summaries();
    let Some(candidate) = policy.find_merges(&summaries).into_iter().next() else {
        index.collect_garbage();
        return Ok(None);
    };
    debug!(
        project = index.name(),
        segments = candidate.segment_ids.len(),
        reason = ?candidate.reason,
        "compaction candidate"
    );
    index.compact(&candidate)
}

/// Merge every segment of `index` into one
pub fn compact_fully(index: &ProjectIndex, policy: &TieredMergePolicy) -> Result<Option<SegmentId>> {
    match policy.forced_merge(&index.snapshot().summaries()) {
        Some(candidate) => index.compact(&candidate),
        None => Ok(None),
    }
}

/// Handle to the compactor thread; stops it when dropped
pub struct CompactorHandle {
    stop: Option<Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl CompactorHandle {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.take();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for CompactorHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Periodically compact `indexes` until the handle is stopped.
///
/// Failures are logged and retried on the next tick; they never reach
/// indexing or queries.
pub fn spawn_compactor(
    indexes: Vec<Arc<ProjectIndex>>,
    config: MergePolicyConfig,
    interval: Duration,
    metrics: Option<Arc<SourcedexMetrics>>,
) -> CompactorHandle {
    let (stop_tx, stop_rx) = channel::bounded::<()>(0);
    let join = thread::spawn(move || {
        let policy = TieredMergePolicy::new(config);
        loop {
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {}
                _ => break,
            }
            for index in &indexes {
                match compact_once(index, &policy) {
                    Ok(Some(_)) => {
                        if let Some(metrics) = &metrics {
                            metrics.record_compaction();
                            metrics.set_index_stats(index.name(), &index.stats());
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(project = index.name(), error = %e, "compaction failed, will retry");
                    }
                }
            }
        }
    });
    CompactorHandle {
        stop: Some(stop_tx),
        join: Some(join),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalyzerSet;
    use crate::document::DocumentBuilder;
    use crate::models::FileMeta;
    use crate::segment::GenerationUpdate;
    use tempfile::TempDir;

    fn add(index: &ProjectIndex, path: &str) {
        let builder = DocumentBuilder::new(Arc::new(AnalyzerSet::default()));
        let mut writer = index.begin_segment();
        writer
            .add(builder.build("demo", path, b"int x;", FileMeta::default(), &[]))
            .unwrap();
        let segment = writer.commit().unwrap().unwrap();
        index
            .publish(GenerationUpdate {
                add: vec![segment],
                ..Default::default()
            })
            .unwrap();
    }

    #[test]
    fn test_compact_once_merges_overflowing_tier() {
        let dir = TempDir::new().unwrap();
        let index = ProjectIndex::open("demo", dir.path()).unwrap();
        for i in 0..4 {
            add(&index, &format!("f{}.c", i));
        }
        let policy = TieredMergePolicy::new(MergePolicyConfig {
            segments_per_tier: 2,
            ..Default::default()
        });
        assert!(compact_once(&index, &policy).unwrap().is_some());
        assert!(index.snapshot().segments().len() < 4);
        assert_eq!(index.snapshot().live_doc_count(), 4);
    }

    #[test]
    fn test_compactor_thread_stops() {
        let dir = TempDir::new().unwrap();
        let index = Arc::new(ProjectIndex::open("demo", dir.path()).unwrap());
        add(&index, "a.c");
        add(&index, "b.c");
        let handle = spawn_compactor(
            vec![Arc::clone(&index)],
            MergePolicyConfig {
                segments_per_tier: 1,
                ..Default::default()
            },
            Duration::from_millis(5),
            None,
        );
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while index.snapshot().segments().len() > 1 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        handle.stop();
        assert_eq!(index.snapshot().segments().len(), 1);
    }
}
