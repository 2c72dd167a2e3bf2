//! Query executor for running searches across project indexes
//!
//! A search builds one query tree, gathers corpus statistics for its terms
//! over every queried project, plans it once and then evaluates it segment
//! by segment against each project's pinned generation. Hits from all
//! projects are merged into one ranking and paginated.

use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ordered_float::OrderedFloat;
use tracing::{debug, info, warn};

use super::builder::QueryBuilder;
use super::context::QueryContext;
use super::planner::{QueryPlan, QueryPlanner};
use super::scoring::{CorpusStats, Scorer};
use super::snippet::line_snippets;
use crate::analysis::AnalyzerSet;
use crate::cancel::CancelToken;
use crate::config::{QueryConfig, Similarity};
use crate::error::SourcedexError;
use crate::metrics::SourcedexMetrics;
use crate::models::{ProjectFailure, SearchHit, SearchRequest, SearchResults};
use crate::segment::{DocNo, Generation, LiveSegment};
use crate::Result;

/// One project to search
#[derive(Clone)]
pub struct SearchTarget {
    pub project: String,
    /// Pinned generation, or why the project cannot be searched
    pub generation: std::result::Result<Arc<Generation>, String>,
    /// Source tree that matched lines are quoted from
    pub source_root: Option<PathBuf>,
}

impl SearchTarget {
    pub fn ready(project: impl Into<String>, generation: Arc<Generation>) -> Self {
        Self {
            project: project.into(),
            generation: Ok(generation),
            source_root: None,
        }
    }

    pub fn with_source_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.source_root = Some(root.into());
        self
    }

    pub fn unavailable(project: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            generation: Err(reason.into()),
            source_root: None,
        }
    }
}

/// A matching document before pagination
#[derive(Debug)]
struct Candidate {
    target: usize,
    segment: usize,
    docno: DocNo,
    score: f32,
    path: String,
}

/// Executes search requests against pinned project generations
pub struct QueryExecutor {
    analyzers: Arc<AnalyzerSet>,
    scorer: Scorer,
    config: QueryConfig,
    metrics: Option<Arc<SourcedexMetrics>>,
}

impl QueryExecutor {
    pub fn new(analyzers: Arc<AnalyzerSet>, similarity: Similarity, config: QueryConfig) -> Self {
        Self {
            analyzers,
            scorer: Scorer::new(similarity),
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<SourcedexMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub fn analyzers(&self) -> &AnalyzerSet {
        &self.analyzers
    }

    /// Plan `request` against the statistics of `targets`
    pub fn plan(&self, request: &SearchRequest, targets: &[SearchTarget]) -> Result<(QueryPlan, CorpusStats)> {
        let query = QueryBuilder::new(&self.analyzers).build(request)?;
        let terms = QueryPlanner::terms(query.as_ref());
        let stats = CorpusStats::collect(ready(targets).map(|(_, g)| g.as_ref()), &terms);
        let plan = QueryPlanner::plan(query, &stats);
        Ok((plan, stats))
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    /// Run `request` over `targets`
    ///
    /// Query errors fail the whole search. Errors reading one project list
    /// it in `failed_projects` and drop its hits. When `cancel` trips (or the
    /// configured timeout elapses) only segments evaluated completely
    /// contribute and the results are marked partial.
    pub fn search(
        &self,
        request: &SearchRequest,
        targets: &[SearchTarget],
        cancel: &CancelToken,
    ) -> Result<SearchResults> {
        let started = Instant::now();
        let cancel = cancel.child_with_timeout(Duration::from_millis(self.config.timeout_ms));

        let (plan, stats) = match self.plan(request, targets) {
            Ok(planned) => planned,
            Err(e) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_search_error();
                }
                return Err(e);
            }
        };
        debug!(
            cost = plan.estimated_cost,
            scoring = plan.uses_scoring,
            optimizations = ?plan.optimizations,
            "planned search"
        );

        let mut candidates = Vec::new();
        let mut failed_projects = Vec::new();
        let mut partial_result = false;

        'projects: for (index, target) in targets.iter().enumerate() {
            let generation = match &target.generation {
                Ok(generation) => generation,
                Err(reason) => {
                    failed_projects.push(ProjectFailure {
                        project: target.project.clone(),
                        reason: reason.clone(),
                    });
                    continue;
                }
            };

            let mut project_hits = Vec::new();
            for (segment_index, segment) in generation.segments().iter().enumerate() {
                let ctx = self.context(segment, &stats, &cancel);
                match evaluate_segment(&plan, &ctx) {
                    Ok(hits) => project_hits.extend(hits.into_iter().map(|(docno, score, path)| {
                        Candidate {
                            target: index,
                            segment: segment_index,
                            docno,
                            score,
                            path,
                        }
                    })),
                    Err(SourcedexError::Cancelled) => {
                        partial_result = true;
                        candidates.append(&mut project_hits);
                        break 'projects;
                    }
                    Err(e) => {
                        warn!(project = %target.project, segment = %segment.id(), error = %e, "project search failed");
                        failed_projects.push(ProjectFailure {
                            project: target.project.clone(),
                            reason: e.to_string(),
                        });
                        continue 'projects;
                    }
                }
            }
            candidates.append(&mut project_hits);
        }

        candidates.sort_by(|a, b| {
            (Reverse(OrderedFloat(a.score)), &a.path, &targets[a.target].project).cmp(&(
                Reverse(OrderedFloat(b.score)),
                &b.path,
                &targets[b.target].project,
            ))
        });

        let total_hits = candidates.len();
        let page_size = request
            .max_results
            .unwrap_or(self.config.default_page_size)
            .min(self.config.max_page_size);
        let hits = candidates
            .iter()
            .skip(request.start)
            .take(page_size)
            .filter_map(|c| self.hit(&plan, &stats, targets, c))
            .collect::<Vec<_>>();

        let elapsed = started.elapsed();
        if let Some(metrics) = &self.metrics {
            metrics.record_search("search", elapsed.as_secs_f64(), partial_result);
        }
        info!(
            projects = targets.len(),
            failed = failed_projects.len(),
            total_hits,
            returned = hits.len(),
            partial = partial_result,
            elapsed_ms = elapsed.as_millis() as u64,
            "search complete"
        );

        Ok(SearchResults {
            hits,
            total_hits,
            partial_result,
            failed_projects,
            time: elapsed.as_millis() as u64,
        })
    }

    fn context<'a>(
        &'a self,
        segment: &'a LiveSegment,
        stats: &'a CorpusStats,
        cancel: &'a CancelToken,
    ) -> QueryContext<'a> {
        QueryContext::new(segment, stats, &self.scorer, cancel)
            .with_max_expansions(self.config.max_expansions)
    }

    fn hit(
        &self,
        plan: &QueryPlan,
        stats: &CorpusStats,
        targets: &[SearchTarget],
        candidate: &Candidate,
    ) -> Option<SearchHit> {
        let target = &targets[candidate.target];
        let generation = target.generation.as_ref().ok()?;
        let segment = generation.segments().get(candidate.segment)?;
        // Lines for the returned page are computed even after a timeout
        let cancel = CancelToken::new();
        let ctx = self.context(segment, stats, &cancel);
        let document = ctx.document(candidate.docno)?;

        let mut lines = BTreeSet::new();
        if let Err(e) = plan.root.matched_lines(&ctx, candidate.docno, &mut lines) {
            warn!(project = %target.project, path = %candidate.path, error = %e, "matched lines unavailable");
        }

        let lines: Vec<u32> = lines.into_iter().collect();
        let snippets = match &target.source_root {
            Some(root) => line_snippets(
                root,
                document,
                &lines,
                self.config.snippet_lines,
                self.config.snippet_chars,
            ),
            None => Vec::new(),
        };

        Some(SearchHit {
            project: target.project.clone(),
            path: candidate.path.clone(),
            score: candidate.score,
            lines,
            language: document.language.id().to_string(),
            snippets,
        })
    }
}

fn ready(targets: &[SearchTarget]) -> impl Iterator<Item = (&str, &Arc<Generation>)> + '_ {
    targets
        .iter()
        .filter_map(|t| t.generation.as_ref().ok().map(|g| (t.project.as_str(), g)))
}

/// Matching live documents of one segment with their scores and paths
fn evaluate_segment(plan: &QueryPlan, ctx: &QueryContext<'_>) -> Result<Vec<(DocNo, f32, String)>> {
    let matches = plan.root.execute(ctx)?;
    let mut hits = Vec::with_capacity(matches.len() as usize);
    for (i, docno) in matches.iter().enumerate() {
        if i % 256 == 0 {
            ctx.check_cancelled()?;
        }
        let docno = DocNo(docno);
        if !ctx.segment().is_live(docno) {
            continue;
        }
        let Some(document) = ctx.document(docno) else {
            continue;
        };
        let score = if plan.uses_scoring {
            plan.root.score(ctx, docno)?
        } else {
            1.0
        };
        hits.push((docno, score, document.path.clone()));
    }
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Field, LineSnippet};
    use crate::query::testutil::published as project;

    fn executor() -> QueryExecutor {
        QueryExecutor::new(
            Arc::new(AnalyzerSet::default()),
            Similarity::default(),
            QueryConfig::default(),
        )
    }

    fn paths(results: &SearchResults) -> Vec<(String, String)> {
        results
            .hits
            .iter()
            .map(|h| (h.project.clone(), h.path.clone()))
            .collect()
    }

    #[test]
    fn test_defs_and_refs_scenario() {
        let (_dir, generation) = project(
            "demo",
            &[
                ("a.c", "int foo(void) { return 1; }\n"),
                ("b.c", "int bar(void) {\n  return foo();\n}\n"),
            ],
        );
        let targets = vec![SearchTarget::ready("demo", generation)];
        let executor = executor();

        let defs = executor
            .search(&SearchRequest::new().with_field(Field::Defs, "foo"), &targets, &CancelToken::new())
            .unwrap();
        assert_eq!(defs.total_hits, 1);
        assert_eq!(defs.hits[0].path, "a.c");
        assert_eq!(defs.hits[0].lines, vec![1]);
        assert_eq!(defs.hits[0].language, "c");

        let refs = executor
            .search(&SearchRequest::new().with_field(Field::Refs, "foo"), &targets, &CancelToken::new())
            .unwrap();
        assert_eq!(refs.total_hits, 1);
        assert_eq!(refs.hits[0].path, "b.c");
        assert_eq!(refs.hits[0].lines, vec![2]);
        assert!(!refs.partial_result);
    }

    #[test]
    fn test_ties_break_by_path_then_project() {
        let (_d1, beta) = project("beta", &[("a.txt", "hello\n")]);
        let (_d2, alpha) = project("alpha", &[("a.txt", "hello\n"), ("b.txt", "hello\n")]);
        let targets = vec![SearchTarget::ready("beta", beta), SearchTarget::ready("alpha", alpha)];

        let results = executor()
            .search(&SearchRequest::new().with_field(Field::Full, "hello"), &targets, &CancelToken::new())
            .unwrap();
        assert_eq!(
            paths(&results),
            vec![
                ("alpha".to_string(), "a.txt".to_string()),
                ("beta".to_string(), "a.txt".to_string()),
                ("alpha".to_string(), "b.txt".to_string()),
            ]
        );
    }

    #[test]
    fn test_pagination_and_page_cap() {
        let (_dir, generation) = project(
            "demo",
            &[("a.txt", "x\n"), ("b.txt", "x\n"), ("c.txt", "x\n")],
        );
        let targets = vec![SearchTarget::ready("demo", generation)];

        let page = executor()
            .search(
                &SearchRequest::new().with_field(Field::Full, "x").with_page(1, 1),
                &targets,
                &CancelToken::new(),
            )
            .unwrap();
        assert_eq!(page.total_hits, 3);
        assert_eq!(page.hits.len(), 1);
        assert_eq!(page.hits[0].path, "b.txt");

        let capped = QueryExecutor::new(
            Arc::new(AnalyzerSet::default()),
            Similarity::bm25(),
            QueryConfig {
                max_page_size: 2,
                ..QueryConfig::default()
            },
        )
        .search(
            &SearchRequest::new().with_field(Field::Full, "x").with_page(0, 100),
            &targets,
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(capped.hits.len(), 2);
    }

    #[test]
    fn test_unavailable_project_is_reported() {
        let (_dir, generation) = project("good", &[("a.txt", "needle\n")]);
        let targets = vec![
            SearchTarget::unavailable("broken", "segment 3 failed its checksum"),
            SearchTarget::ready("good", generation),
        ];

        let results = executor()
            .search(&SearchRequest::new().with_field(Field::Full, "needle"), &targets, &CancelToken::new())
            .unwrap();
        assert_eq!(results.hits.len(), 1);
        assert_eq!(results.failed_projects.len(), 1);
        assert_eq!(results.failed_projects[0].project, "broken");
    }

    #[test]
    fn test_cancelled_search_is_partial() {
        let (_dir, generation) = project("demo", &[("a.txt", "needle\n")]);
        let targets = vec![SearchTarget::ready("demo", generation)];
        let cancel = CancelToken::new();
        cancel.cancel();

        let results = executor()
            .search(&SearchRequest::new().with_field(Field::Full, "needle"), &targets, &cancel)
            .unwrap();
        assert!(results.partial_result);
        assert!(results.hits.is_empty());
    }

    #[test]
    fn test_query_errors_fail_the_search() {
        let (_dir, generation) = project("demo", &[("a.txt", "x\n")]);
        let targets = vec![SearchTarget::ready("demo", generation)];
        let err = executor()
            .search(&SearchRequest::new().with_field(Field::Full, "(x"), &targets, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, SourcedexError::QueryParse { .. }));
    }

    #[test]
    fn test_negation_only_query() {
        let (_dir, generation) = project("demo", &[("a.txt", "keep\n"), ("b.txt", "drop\n")]);
        let targets = vec![SearchTarget::ready("demo", generation)];
        let results = executor()
            .search(&SearchRequest::new().with_field(Field::Full, "-drop"), &targets, &CancelToken::new())
            .unwrap();
        assert_eq!(results.total_hits, 1);
        assert_eq!(results.hits[0].path, "a.txt");
    }

    #[test]
    fn test_dotted_words_found_in_plain_and_fallback_files() {
        let (_dir, generation) = project(
            "demo",
            &[
                ("notes.txt", "call config.load here\n"),
                ("broken.c", "int ok;\n/* never closed\nconfig.load();\n"),
            ],
        );
        let targets = vec![SearchTarget::ready("demo", generation)];
        let executor = executor();
        for text in ["config", "load", "config.load", "\"config load\""] {
            let results = executor
                .search(&SearchRequest::new().with_field(Field::Full, text), &targets, &CancelToken::new())
                .unwrap();
            let mut found: Vec<_> = results.hits.iter().map(|h| h.path.as_str()).collect();
            found.sort_unstable();
            assert_eq!(found, vec!["broken.c", "notes.txt"], "query {}", text);
        }

        let results = executor
            .search(&SearchRequest::new().with_field(Field::Full, "config.load"), &targets, &CancelToken::new())
            .unwrap();
        let notes = results.hits.iter().find(|h| h.path == "notes.txt").unwrap();
        assert_eq!(notes.lines, vec![1]);
    }

    #[test]
    fn test_returned_hits_quote_matched_lines() {
        let files = [
            ("a.c", "int foo(void) { return 1; }\n"),
            ("b.c", "int bar(void) {\n  return foo();\n}\n"),
        ];
        let (_dir, generation) = project("demo", &files);
        let source = tempfile::tempdir().unwrap();
        for (path, text) in files {
            std::fs::write(source.path().join(path), text).unwrap();
        }
        let request = SearchRequest::new().with_field(Field::Full, "foo");

        let quoted = vec![SearchTarget::ready("demo", Arc::clone(&generation)).with_source_root(source.path())];
        let results = executor().search(&request, &quoted, &CancelToken::new()).unwrap();
        let snippets = |path: &str| {
            results
                .hits
                .iter()
                .find(|h| h.path == path)
                .map(|h| h.snippets.clone())
                .unwrap()
        };
        assert_eq!(
            snippets("a.c"),
            vec![LineSnippet {
                line: 1,
                text: "int foo(void) { return 1; }".to_string(),
            }]
        );
        assert_eq!(
            snippets("b.c"),
            vec![LineSnippet {
                line: 2,
                text: "  return foo();".to_string(),
            }]
        );

        let bare = vec![SearchTarget::ready("demo", generation)];
        let results = executor().search(&request, &bare, &CancelToken::new()).unwrap();
        assert_eq!(results.total_hits, 2);
        assert!(results.hits.iter().all(|h| h.snippets.is_empty()));
    }
}
