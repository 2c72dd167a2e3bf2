//! Invariant checking framework for correctness verification
//!
//! Invariants are checked against an [`EventLog`] of indexing runs and
//! searches recorded by a test.

use super::events::{Event, OperationResult, OperationType, PathHashes};
use super::history::EventLog;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// A violation of an invariant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub invariant: String,
    pub description: String,
    pub violating_events: Vec<u64>, // operation ids
    pub context: HashMap<String, String>,
}

impl Violation {
    fn new(invariant: &dyn Invariant, description: impl Into<String>, events: &[&Event]) -> Self {
        Self {
            invariant: invariant.name().to_string(),
            description: description.into(),
            violating_events: events.iter().map(|e| e.op_id.0).collect(),
            context: HashMap::new(),
        }
    }

    fn with_context(mut self, key: &str, value: impl fmt::Debug) -> Self {
        self.context.insert(key.to_string(), format!("{:?}", value));
        self
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "INVARIANT VIOLATION: {}", self.invariant)?;
        writeln!(f, "  Description: {}", self.description)?;
        writeln!(f, "  Violating operations: {:?}", self.violating_events)?;
        if !self.context.is_empty() {
            writeln!(f, "  Context:")?;
            let mut keys: Vec<_> = self.context.keys().collect();
            keys.sort();
            for key in keys {
                writeln!(f, "    {}: {}", key, self.context[key])?;
            }
        }
        Ok(())
    }
}

/// Trait for invariant checkers
pub trait Invariant: Send + Sync {
    fn name(&self) -> &str;

    /// Check the invariant against an event log
    fn check(&self, log: &EventLog) -> Result<(), Violation>;

    fn description(&self) -> &str {
        "No description provided"
    }
}

/// Check all invariants and return violations
pub fn check_all_invariants(log: &EventLog, invariants: &[Box<dyn Invariant>]) -> Vec<Violation> {
    invariants
        .iter()
        .filter_map(|invariant| invariant.check(log).err())
        .collect()
}

fn indexed(event: &Event) -> Option<(&PathHashes, u64, u64, &PathHashes)> {
    match (&event.op_type, &event.result) {
        (
            OperationType::IndexRun { tree, .. },
            Some(OperationResult::Indexed {
                generation_before,
                generation,
                documents,
            }),
        ) => Some((tree, *generation_before, *generation, documents)),
        _ => None,
    }
}

fn projects(log: &EventLog) -> BTreeSet<String> {
    log.completed_events()
        .iter()
        .map(|e| e.op_type.project().to_string())
        .collect()
}

/// After a successful run the published documents are exactly the files of
/// the tree, with matching content hashes
pub struct IndexMirrorsTree;

impl Invariant for IndexMirrorsTree {
    fn name(&self) -> &str {
        "IndexMirrorsTree"
    }

    fn description(&self) -> &str {
        "A completed indexing run publishes one live document per file, with the file's content hash"
    }

    fn check(&self, log: &EventLog) -> Result<(), Violation> {
        for event in log.completed_events() {
            let Some((tree, _, _, documents)) = indexed(&event) else {
                continue;
            };
            if tree != documents {
                let missing: Vec<_> = tree.keys().filter(|p| !documents.contains_key(*p)).collect();
                let extra: Vec<_> = documents.keys().filter(|p| !tree.contains_key(*p)).collect();
                let stale: Vec<_> = tree
                    .iter()
                    .filter(|(p, h)| documents.get(*p).is_some_and(|d| d != *h))
                    .map(|(p, _)| p)
                    .collect();
                return Err(Violation::new(self, "published documents differ from the tree", &[&event])
                    .with_context("missing", missing)
                    .with_context("extra", extra)
                    .with_context("stale", stale));
            }
        }
        Ok(())
    }
}

/// Generation numbers of a project never go backwards
pub struct GenerationsNeverRegress;

impl Invariant for GenerationsNeverRegress {
    fn name(&self) -> &str {
        "GenerationsNeverRegress"
    }

    fn description(&self) -> &str {
        "Each observed generation of a project is at least the previously observed one"
    }

    fn check(&self, log: &EventLog) -> Result<(), Violation> {
        for project in projects(log) {
            let mut last: Option<(u64, Event)> = None;
            for event in log.project_events(&project) {
                let observed = match &event.result {
                    Some(OperationResult::Indexed {
                        generation_before,
                        generation,
                        ..
                    }) => {
                        if generation < generation_before {
                            return Err(Violation::new(self, "run moved the generation backwards", &[&event])
                                .with_context("before", generation_before)
                                .with_context("after", generation));
                        }
                        *generation
                    }
                    Some(OperationResult::Hits { generation, .. }) => *generation,
                    _ => continue,
                };
                if let Some((previous, previous_event)) = &last {
                    if observed < *previous {
                        return Err(Violation::new(
                            self,
                            format!("{} observed generation {} after {}", project, observed, previous),
                            &[previous_event, &event],
                        ));
                    }
                }
                last = Some((observed, event));
            }
        }
        Ok(())
    }
}

/// Re-indexing an unchanged tree publishes nothing
pub struct IdempotentReindex;

impl Invariant for IdempotentReindex {
    fn name(&self) -> &str {
        "IdempotentReindex"
    }

    fn description(&self) -> &str {
        "A run over the same tree as the previous successful run leaves the generation unchanged"
    }

    fn check(&self, log: &EventLog) -> Result<(), Violation> {
        for project in projects(log) {
            let mut previous: Option<Event> = None;
            for event in log.project_events(&project) {
                let Some((tree, before, after, _)) = indexed(&event) else {
                    continue;
                };
                if let Some(prev) = &previous {
                    let unchanged = indexed(prev).is_some_and(|(prev_tree, ..)| prev_tree == tree);
                    if unchanged && before != after {
                        return Err(Violation::new(self, "unchanged tree produced a new generation", &[prev, &event])
                            .with_context("before", before)
                            .with_context("after", after));
                    }
                }
                previous = Some(event);
            }
        }
        Ok(())
    }
}

/// Hits come from the searched generation and that generation never changes
pub struct SearchWithinGeneration;

impl Invariant for SearchWithinGeneration {
    fn name(&self) -> &str {
        "SearchWithinGeneration"
    }

    fn description(&self) -> &str {
        "Every hit names a live document of the pinned generation, and a generation's documents are the same for every observer"
    }

    fn check(&self, log: &EventLog) -> Result<(), Violation> {
        let mut seen: HashMap<(String, u64), (PathHashes, Event)> = HashMap::new();
        for event in log.completed_events() {
            let (generation, documents) = match &event.result {
                Some(OperationResult::Indexed {
                    generation, documents, ..
                }) => (*generation, documents),
                Some(OperationResult::Hits {
                    generation,
                    paths,
                    documents,
                    ..
                }) => {
                    if let Some(stray) = paths.iter().find(|p| !documents.contains_key(*p)) {
                        return Err(Violation::new(self, "hit outside the searched generation", &[&event])
                            .with_context("path", stray)
                            .with_context("generation", generation));
                    }
                    (*generation, documents)
                }
                _ => continue,
            };
            let key = (event.op_type.project().to_string(), generation);
            if let Some((known, first)) = seen.get(&key) {
                if known != documents {
                    return Err(Violation::new(
                        self,
                        format!("generation {} of {} changed between observations", generation, key.0),
                        &[first, &event],
                    ));
                }
            } else {
                seen.insert(key, (documents.clone(), event.clone()));
            }
        }
        Ok(())
    }
}

/// The same query over the same generation ranks the same hits
pub struct DeterministicSearch;

impl Invariant for DeterministicSearch {
    fn name(&self) -> &str {
        "DeterministicSearch"
    }

    fn description(&self) -> &str {
        "Complete searches with equal query and generation return identical ranked paths"
    }

    fn check(&self, log: &EventLog) -> Result<(), Violation> {
        let mut seen: HashMap<(String, String, u64), (Vec<String>, Event)> = HashMap::new();
        for event in log.completed_events() {
            let (OperationType::Search { project, query }, Some(OperationResult::Hits { generation, paths, partial: false, .. })) =
                (&event.op_type, &event.result)
            else {
                continue;
            };
            let key = (project.clone(), query.clone(), *generation);
            match seen.get(&key) {
                Some((known, first)) if known != paths => {
                    return Err(Violation::new(self, format!("query {} ranked differently", query), &[first, &event])
                        .with_context("first", known)
                        .with_context("second", paths));
                }
                Some(_) => {}
                None => {
                    seen.insert(key, (paths.clone(), event.clone()));
                }
            }
        }
        Ok(())
    }
}

pub fn default_invariants() -> Vec<Box<dyn Invariant>> {
    vec![
        Box::new(IndexMirrorsTree),
        Box::new(GenerationsNeverRegress),
        Box::new(IdempotentReindex),
        Box::new(SearchWithinGeneration),
        Box::new(DeterministicSearch),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hashes(entries: &[(&str, &str)]) -> PathHashes {
        entries
            .iter()
            .map(|(p, h)| (p.to_string(), h.to_string()))
            .collect()
    }

    fn run(log: &EventLog, tree: PathHashes, before: u64, after: u64, documents: PathHashes) {
        let op = log.record_invoke(OperationType::IndexRun {
            project: "demo".to_string(),
            tree,
        });
        log.record_return(
            op,
            OperationResult::Indexed {
                generation_before: before,
                generation: after,
                documents,
            },
        );
    }

    fn search(log: &EventLog, generation: u64, paths: &[&str], documents: PathHashes) {
        let op = log.record_invoke(OperationType::Search {
            project: "demo".to_string(),
            query: "full:x".to_string(),
        });
        log.record_return(
            op,
            OperationResult::Hits {
                generation,
                paths: paths.iter().map(|p| p.to_string()).collect(),
                documents,
                partial: false,
            },
        );
    }

    #[test]
    fn test_consistent_history_passes() {
        let log = EventLog::new();
        let tree = hashes(&[("a.c", "1"), ("b.c", "2")]);
        run(&log, tree.clone(), 0, 1, tree.clone());
        search(&log, 1, &["a.c"], tree.clone());
        run(&log, tree.clone(), 1, 1, tree.clone());
        search(&log, 1, &["a.c"], tree);

        let violations = check_all_invariants(&log, &default_invariants());
        assert!(violations.is_empty(), "{:?}", violations);
    }

    #[test]
    fn test_index_mirrors_tree_detects_leftovers() {
        let log = EventLog::new();
        run(&log, hashes(&[("a.c", "1")]), 0, 1, hashes(&[("a.c", "1"), ("gone.c", "9")]));
        let violation = IndexMirrorsTree.check(&log).unwrap_err();
        assert!(violation.context["extra"].contains("gone.c"));
    }

    #[test]
    fn test_idempotence_violation() {
        let log = EventLog::new();
        let tree = hashes(&[("a.c", "1")]);
        run(&log, tree.clone(), 0, 1, tree.clone());
        run(&log, tree.clone(), 1, 2, tree);
        assert!(IdempotentReindex.check(&log).is_err());
    }

    #[test]
    fn test_search_outside_generation() {
        let log = EventLog::new();
        search(&log, 1, &["ghost.c"], hashes(&[("a.c", "1")]));
        assert!(SearchWithinGeneration.check(&log).is_err());
    }

    #[test]
    fn test_nondeterministic_ranking() {
        let log = EventLog::new();
        let docs = hashes(&[("a.c", "1"), ("b.c", "2")]);
        search(&log, 1, &["a.c", "b.c"], docs.clone());
        search(&log, 1, &["b.c", "a.c"], docs);
        assert!(DeterministicSearch.check(&log).is_err());
    }

    #[test]
    fn test_generation_regression() {
        let log = EventLog::new();
        let docs = hashes(&[("a.c", "1")]);
        search(&log, 3, &[], docs.clone());
        search(&log, 2, &[], docs);
        let violation = GenerationsNeverRegress.check(&log).unwrap_err();
        assert_eq!(violation.violating_events.len(), 2);
    }
}
