//! Recorded history of indexing runs and searches
//!
//! An [`EventLog`] is shared by every thread of a test. Each caller records
//! the invocation before it starts work and the observed result once it
//! finishes, so the log holds a real interleaving that the invariant
//! checkers can replay. Operations that never return stay pending and are
//! ignored by the checkers.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::events::{Event, OperationId, OperationResult, OperationType};

/// Shared, cloneable log of operation events in invocation order
#[derive(Clone, Default)]
pub struct EventLog {
    history: Arc<Mutex<History>>,
}

#[derive(Default)]
struct History {
    /// Highest operation id handed out so far
    last_id: u64,
    events: Vec<Event>,
    /// Position in `events` of every operation still waiting for its result
    pending: HashMap<OperationId, usize>,
}

impl History {
    fn from_events(events: Vec<Event>) -> Self {
        let pending = events
            .iter()
            .enumerate()
            .filter(|(_, event)| !event.is_complete())
            .map(|(at, event)| (event.op_id, at))
            .collect();
        Self {
            last_id: events.iter().map(|e| e.op_id.0).max().unwrap_or(0),
            events,
            pending,
        }
    }

    fn select(&self, keep: impl Fn(&Event) -> bool) -> Vec<Event> {
        self.events.iter().filter(|e| keep(*e)).cloned().collect()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the start of `op_type` and return the id to complete it with
    pub fn record_invoke(&self, op_type: OperationType) -> OperationId {
        let mut history = self.history.lock();
        history.last_id += 1;
        let op_id = OperationId::new(history.last_id);
        let at = history.events.len();
        history.events.push(Event::invoke(op_id, op_type));
        history.pending.insert(op_id, at);
        op_id
    }

    /// Attach the observed `result` to a pending operation
    ///
    /// Unknown or already completed ids are ignored.
    pub fn record_return(&self, op_id: OperationId, result: OperationResult) {
        let mut history = self.history.lock();
        let Some(at) = history.pending.remove(&op_id) else {
            return;
        };
        if let Some(event) = history.events.get_mut(at) {
            event.complete(result);
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.history.lock().events.clone()
    }

    pub fn completed_events(&self) -> Vec<Event> {
        self.history.lock().select(Event::is_complete)
    }

    pub fn pending_events(&self) -> Vec<Event> {
        self.history.lock().select(|e| !e.is_complete())
    }

    /// Completed events of one project, in invocation order
    pub fn project_events(&self, project: &str) -> Vec<Event> {
        self.history
            .lock()
            .select(|e| e.is_complete() && e.op_type.project() == project)
    }

    /// Completed indexing runs of `project`
    pub fn index_runs(&self, project: &str) -> Vec<Event> {
        self.history.lock().select(|e| {
            e.is_complete()
                && matches!(&e.op_type, OperationType::IndexRun { project: p, .. } if p == project)
        })
    }

    /// Completed searches of `project`
    pub fn searches(&self, project: &str) -> Vec<Event> {
        self.history.lock().select(|e| {
            e.is_complete()
                && matches!(&e.op_type, OperationType::Search { project: p, .. } if p == project)
        })
    }

    /// Generations published by the successful indexing runs of `project`
    pub fn published_generations(&self, project: &str) -> Vec<u64> {
        self.index_runs(project)
            .iter()
            .filter_map(|e| match &e.result {
                Some(OperationResult::Indexed { generation, .. }) => Some(*generation),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.history.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.lock().events.is_empty()
    }

    /// Forget every event; ids keep counting up
    pub fn clear(&self) {
        let mut history = self.history.lock();
        history.events.clear();
        history.pending.clear();
    }

    /// Serialize the history, e.g. to attach a failing run to a bug report
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.history.lock().events)
    }

    /// Restore a saved history; pending operations can still be completed
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let events: Vec<Event> = serde_json::from_str(json)?;
        Ok(Self {
            history: Arc::new(Mutex::new(History::from_events(events))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::PathHashes;

    fn search(project: &str) -> OperationType {
        OperationType::Search {
            project: project.to_string(),
            query: "full:x".to_string(),
        }
    }

    fn index_run(project: &str) -> OperationType {
        OperationType::IndexRun {
            project: project.to_string(),
            tree: PathHashes::new(),
        }
    }

    fn failed() -> OperationResult {
        OperationResult::Error {
            message: "x".to_string(),
        }
    }

    fn indexed(generation: u64) -> OperationResult {
        OperationResult::Indexed {
            generation_before: generation - 1,
            generation,
            documents: PathHashes::new(),
        }
    }

    #[test]
    fn test_invoke_and_return() {
        let log = EventLog::new();
        let first = log.record_invoke(search("a"));
        let _second = log.record_invoke(search("b"));
        assert_eq!(log.pending_events().len(), 2);

        log.record_return(first, failed());
        assert_eq!(log.completed_events().len(), 1);
        assert_eq!(log.project_events("a").len(), 1);
        assert!(log.project_events("b").is_empty());
        assert_eq!(log.searches("a").len(), 1);
        assert!(log.searches("b").is_empty());

        // a second return for the same id is ignored
        log.record_return(first, indexed(1));
        assert_eq!(log.events()[0].result, Some(failed()));
    }

    #[test]
    fn test_published_generations_skip_failed_runs() {
        let log = EventLog::new();
        for result in [indexed(1), failed(), indexed(2)] {
            let op = log.record_invoke(index_run("demo"));
            log.record_return(op, result);
        }
        let other = log.record_invoke(index_run("other"));
        log.record_return(other, indexed(7));
        log.record_invoke(index_run("demo"));

        assert_eq!(log.index_runs("demo").len(), 3);
        assert_eq!(log.published_generations("demo"), vec![1, 2]);
        assert_eq!(log.published_generations("other"), vec![7]);
    }

    #[test]
    fn test_json_round_trip_keeps_pending() {
        let log = EventLog::new();
        let done = log.record_invoke(search("a"));
        log.record_return(done, failed());
        let open = log.record_invoke(search("a"));

        let restored = EventLog::from_json(&log.to_json().unwrap()).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.pending_events().len(), 1);
        let next = restored.record_invoke(search("a"));
        assert_eq!(next, OperationId::new(3));

        restored.record_return(open, failed());
        assert_eq!(restored.completed_events().len(), 2);
    }

    #[test]
    fn test_clear_keeps_ids_unique() {
        let log = EventLog::new();
        log.record_invoke(search("a"));
        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.record_invoke(search("a")), OperationId::new(2));
    }
}
