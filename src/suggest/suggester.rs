//! Autocomplete over the term dictionaries of the queried projects
//!
//! The identifier under the caret is completed from each segment's FST
//! term dictionary. With no other query text, candidates are ranked by how
//! many documents contain them. When the request carries more query text,
//! a candidate is ranked by how relevant the documents containing it are to
//! the rest of the query.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::identifier::{locate, Located};
use super::popularity::PopularityCounts;
use crate::analysis::AnalyzerSet;
use crate::cancel::CancelToken;
use crate::config::{QueryConfig, Similarity, SuggesterConfig};
use crate::error::SourcedexError;
use crate::metrics::SourcedexMetrics;
use crate::models::{Field, SearchRequest};
use crate::query::builder::fold_case;
use crate::query::{
    CorpusStats, PrefixQuery, QueryBuilder, QueryContext, QueryPlan, QueryPlanner, Scorer,
    SearchTarget, WildcardQuery,
};
use crate::segment::{DocNo, Generation, LiveSegment};
use crate::Result;

/// Autocomplete request: the full query plus the field and caret being edited
#[derive(Clone, Debug, PartialEq)]
pub struct SuggestRequest {
    pub query: SearchRequest,
    pub field: Field,
    /// Byte offset in the field's text; the end of the text when absent
    pub caret: Option<usize>,
}

/// One completion with the projects it was found in
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub phrase: String,
    pub projects: Vec<String>,
    pub score: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestResponse {
    /// Text of the edited field
    pub query_text: String,
    /// Token of `query_text` the suggestions replace
    pub identifier: String,
    /// Milliseconds spent
    pub time: u64,
    pub partial_result: bool,
    pub suggestions: Vec<Suggestion>,
}

/// A candidate term found in one segment of one project
#[derive(Clone, Debug, PartialEq)]
pub struct Completion {
    pub project: String,
    pub term: String,
    pub weight: f64,
}

#[derive(Debug)]
enum Matcher {
    Prefix(PrefixQuery),
    Wildcard(WildcardQuery),
}

impl Matcher {
    fn new(field: Field, located: &Located) -> Result<Self> {
        let pattern = fold_case(field, &located.prefix);
        if located.is_pattern() {
            let query = WildcardQuery::new(field, pattern).map_err(|e| {
                SourcedexError::parse(field.name(), located.start, format!("invalid wildcard: {}", e))
            })?;
            Ok(Matcher::Wildcard(query))
        } else {
            Ok(Matcher::Prefix(PrefixQuery::new(field, pattern)))
        }
    }

    fn expand(&self, ctx: &QueryContext<'_>) -> Arc<Vec<String>> {
        match self {
            Matcher::Prefix(q) => q.expand(ctx),
            Matcher::Wildcard(q) => q.expand(ctx),
        }
    }
}

/// Lazily walks the segments of every target, yielding candidate terms
///
/// Each step completes one segment. The stream ends early once the cancel
/// token trips; [`Completions::is_partial`] then reports it.
pub struct Completions<'a> {
    targets: &'a [SearchTarget],
    field: Field,
    matcher: Matcher,
    rest: Option<&'a QueryPlan>,
    stats: &'a CorpusStats,
    scorer: &'a Scorer,
    cancel: &'a CancelToken,
    max_expansions: usize,
    target: usize,
    segment: usize,
    buffer: VecDeque<Completion>,
    partial: bool,
}

impl<'a> Completions<'a> {
    pub fn is_partial(&self) -> bool {
        self.partial
    }

    fn skip_target(&mut self) {
        self.target += 1;
        self.segment = 0;
    }

    fn complete_segment(
        &self,
        project: &str,
        generation: &Generation,
        segment: &LiveSegment,
    ) -> Result<Vec<Completion>> {
        let ctx = QueryContext::new(segment, self.stats, self.scorer, self.cancel)
            .with_max_expansions(self.max_expansions);
        ctx.check_cancelled()?;
        let terms = self.matcher.expand(&ctx);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let rest = match self.rest {
            Some(plan) => Some(plan.root.execute(&ctx)?),
            None => None,
        };
        let live_docs = generation.live_doc_count().max(1) as f64;

        let mut completions = Vec::new();
        for term in terms.iter() {
            ctx.check_cancelled()?;
            let docs = ctx.term_docs(self.field, term)?;
            let weight = match (self.rest, &rest) {
                (Some(plan), Some(rest)) => {
                    let shared = &docs & rest;
                    if plan.uses_scoring {
                        let mut total = 0.0;
                        for docno in shared.iter() {
                            total += f64::from(plan.root.score(&ctx, DocNo(docno))?);
                        }
                        total
                    } else {
                        shared.len() as f64
                    }
                }
                _ => docs.len() as f64 / live_docs * 1000.0,
            };
            if weight > 0.0 {
                completions.push(Completion {
                    project: project.to_string(),
                    term: term.clone(),
                    weight,
                });
            }
        }
        Ok(completions)
    }
}

impl<'a> Iterator for Completions<'a> {
    type Item = Completion;

    fn next(&mut self) -> Option<Completion> {
        let targets = self.targets;
        loop {
            if let Some(completion) = self.buffer.pop_front() {
                return Some(completion);
            }
            let target = targets.get(self.target)?;
            let Ok(generation) = &target.generation else {
                self.skip_target();
                continue;
            };
            let Some(segment) = generation.segments().get(self.segment) else {
                self.skip_target();
                continue;
            };
            if self.cancel.is_cancelled() {
                self.partial = true;
                return None;
            }
            self.segment += 1;

            match self.complete_segment(&target.project, generation, segment) {
                Ok(completions) => self.buffer = completions.into(),
                Err(SourcedexError::Cancelled) => {
                    self.partial = true;
                    return None;
                }
                Err(e) => {
                    warn!(project = %target.project, segment = %segment.id(), error = %e, "skipping project in autocomplete");
                    self.skip_target();
                }
            }
        }
    }
}

#[derive(Default)]
struct Aggregate {
    projects: BTreeSet<String>,
    score: f64,
    popularity: u64,
}

/// Produces ranked completions for the identifier under the caret
pub struct Suggester {
    analyzers: Arc<AnalyzerSet>,
    scorer: Scorer,
    config: SuggesterConfig,
    max_expansions: usize,
    popularity: PopularityCounts,
    metrics: Option<Arc<SourcedexMetrics>>,
}

impl Suggester {
    pub fn new(analyzers: Arc<AnalyzerSet>, config: SuggesterConfig) -> Self {
        Self {
            analyzers,
            scorer: Scorer::default(),
            config,
            max_expansions: QueryConfig::default().max_expansions,
            popularity: PopularityCounts::new(),
            metrics: None,
        }
    }

    /// Weigh completions against the rest of the query with `similarity`
    pub fn with_similarity(mut self, similarity: Similarity) -> Self {
        self.scorer = Scorer::new(similarity);
        self
    }

    /// Cap on candidate terms taken from one segment
    pub fn with_max_expansions(mut self, max_expansions: usize) -> Self {
        self.max_expansions = max_expansions;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<SourcedexMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &SuggesterConfig {
        &self.config
    }

    pub fn popularity(&self) -> &PopularityCounts {
        &self.popularity
    }

    /// Count the exact terms of a search toward completion popularity
    pub fn record_search(&self, projects: &[String], request: &SearchRequest) {
        let Ok(query) = QueryBuilder::new(&self.analyzers).build(request) else {
            return;
        };
        for (field, term) in QueryPlanner::terms(query.as_ref()) {
            for project in projects {
                self.popularity.increment(project, field, &term, 1);
            }
        }
    }

    /// Lazy stream of completions of `located` in `field`
    ///
    /// With `rest`, candidates are weighted by the relevance of the documents
    /// also matching it, or by their count when `rest` does not score.
    #[allow(clippy::too_many_arguments)]
    pub fn completions<'a>(
        &self,
        field: Field,
        located: &Located,
        targets: &'a [SearchTarget],
        rest: Option<&'a QueryPlan>,
        stats: &'a CorpusStats,
        scorer: &'a Scorer,
        cancel: &'a CancelToken,
    ) -> Result<Completions<'a>> {
        Ok(Completions {
            targets,
            field,
            matcher: Matcher::new(field, located)?,
            rest,
            stats,
            scorer,
            cancel,
            max_expansions: self.max_expansions,
            target: 0,
            segment: 0,
            buffer: VecDeque::new(),
            partial: false,
        })
    }

    fn validate(&self, request: &SuggestRequest, targets: &[SearchTarget]) -> Result<()> {
        if !self.config.enabled {
            return Err(SourcedexError::InvalidRequest(
                "autocomplete is disabled".to_string(),
            ));
        }
        if !self.config.is_field_allowed(request.field.name()) {
            return Err(SourcedexError::InvalidRequest(format!(
                "autocomplete is not allowed for field {}",
                request.field
            )));
        }
        if targets.len() > self.config.max_projects {
            return Err(SourcedexError::InvalidRequest(format!(
                "autocomplete spans at most {} projects, {} requested",
                self.config.max_projects,
                targets.len()
            )));
        }
        Ok(())
    }

    /// Plan of the query text other than the identifier, if there is any
    fn plan_rest(
        &self,
        request: &SuggestRequest,
        located: &Located,
        targets: &[SearchTarget],
    ) -> Result<Option<(QueryPlan, CorpusStats)>> {
        let mut rest = request.query.clone();
        rest.set_field(request.field, located.remainder.clone());
        if rest.is_empty() {
            return Ok(None);
        }
        if !self.config.allow_complex_queries {
            return Err(SourcedexError::InvalidRequest(
                "autocomplete of complex queries is disabled".to_string(),
            ));
        }

        let query = match QueryBuilder::new(&self.analyzers).build(&rest) {
            Ok(query) => query,
            Err(e) => {
                debug!(error = %e, "rest of query unusable, ranking by document frequency");
                return Ok(None);
            }
        };
        let terms = QueryPlanner::terms(query.as_ref());
        let stats = CorpusStats::collect(
            targets.iter().filter_map(|t| t.generation.as_ref().ok().map(|g| g.as_ref())),
            &terms,
        );
        let plan = QueryPlanner::plan(query, &stats);
        Ok(Some((plan, stats)))
    }

    /// Ranked completions for the identifier under the caret
    ///
    /// Stops after the configured time threshold (or when `cancel` trips)
    /// and returns what it has with `partial_result` set.
    pub fn suggest(
        &self,
        request: &SuggestRequest,
        targets: &[SearchTarget],
        cancel: &CancelToken,
    ) -> Result<SuggestResponse> {
        let started = Instant::now();
        self.validate(request, targets)?;

        let text = request.query.raw_field(request.field).unwrap_or("");
        let located = locate(text, request.caret.unwrap_or(text.len()))?;
        if located.prefix.chars().count() < self.config.min_chars {
            return Err(SourcedexError::InvalidRequest(format!(
                "autocomplete needs at least {} characters",
                self.config.min_chars
            )));
        }

        let cancel = cancel.child_with_timeout(Duration::from_millis(self.config.time_threshold_ms));
        let rest = self.plan_rest(request, &located, targets)?;
        let empty = CorpusStats::default();
        let (rest_plan, stats) = match &rest {
            Some((plan, stats)) => (Some(plan), stats),
            None => (None, &empty),
        };

        let mut completions = self.completions(
            request.field,
            &located,
            targets,
            rest_plan,
            stats,
            &self.scorer,
            &cancel,
        )?;
        let mut by_phrase: BTreeMap<String, Aggregate> = BTreeMap::new();
        for completion in completions.by_ref() {
            let Completion {
                project,
                term,
                weight,
            } = completion;
            let popularity = self.popularity.get(&project, request.field, &term);
            let entry = by_phrase.entry(term).or_default();
            entry.score += weight;
            if entry.projects.insert(project) {
                entry.popularity += popularity;
            }
        }
        let partial_result = completions.is_partial();

        let mut ranked: Vec<(String, Aggregate)> = by_phrase.into_iter().collect();
        ranked.sort_by(|(pa, a), (pb, b)| {
            b.popularity
                .cmp(&a.popularity)
                .then_with(|| b.score.total_cmp(&a.score))
                .then_with(|| pa.cmp(pb))
        });
        ranked.truncate(self.config.max_results);

        let suggestions: Vec<Suggestion> = ranked
            .into_iter()
            .map(|(phrase, agg)| Suggestion {
                phrase,
                projects: agg.projects.into_iter().collect(),
                score: agg.score,
            })
            .collect();

        let elapsed = started.elapsed();
        if let Some(metrics) = &self.metrics {
            metrics.record_search("suggest", elapsed.as_secs_f64(), partial_result);
        }
        info!(
            field = %request.field,
            prefix = %located.prefix,
            complex = rest_plan.is_some(),
            suggestions = suggestions.len(),
            partial = partial_result,
            elapsed_ms = elapsed.as_millis() as u64,
            "autocomplete complete"
        );

        Ok(SuggestResponse {
            query_text: text.to_string(),
            identifier: located.identifier,
            time: elapsed.as_millis() as u64,
            partial_result,
            suggestions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::testutil::published;

    fn suggester(config: SuggesterConfig) -> Suggester {
        Suggester::new(Arc::new(AnalyzerSet::default()), config)
    }

    fn request(field: Field, text: &str) -> SuggestRequest {
        SuggestRequest {
            query: SearchRequest::new().with_field(field, text),
            field,
            caret: None,
        }
    }

    fn phrases(response: &SuggestResponse) -> Vec<&str> {
        response.suggestions.iter().map(|s| s.phrase.as_str()).collect()
    }

    #[test]
    fn test_simple_completion_ranked_by_frequency() {
        let (_dir, generation) = published(
            "demo",
            &[
                ("a.txt", "matrix main\n"),
                ("b.txt", "main mail\n"),
                ("c.txt", "main\n"),
            ],
        );
        let targets = vec![SearchTarget::ready("demo", generation)];
        let response = suggester(SuggesterConfig::default())
            .suggest(&request(Field::Full, "ma"), &targets, &CancelToken::new())
            .unwrap();

        assert_eq!(phrases(&response), vec!["main", "mail", "matrix"]);
        assert_eq!(response.identifier, "ma");
        assert_eq!(response.query_text, "ma");
        assert!(!response.partial_result);
        assert_eq!(response.suggestions[0].projects, vec!["demo".to_string()]);
    }

    #[test]
    fn test_same_phrase_merges_projects() {
        let (_d1, java) = published("java", &[("Main.java", "main\n")]);
        let (_d2, kotlin) = published("kotlin", &[("main.kt", "main\n")]);
        let targets = vec![
            SearchTarget::ready("java", java),
            SearchTarget::ready("kotlin", kotlin),
        ];
        let response = suggester(SuggesterConfig::default())
            .suggest(&request(Field::Full, "mai"), &targets, &CancelToken::new())
            .unwrap();

        assert_eq!(response.suggestions.len(), 1);
        assert_eq!(
            response.suggestions[0].projects,
            vec!["java".to_string(), "kotlin".to_string()]
        );
    }

    #[test]
    fn test_complex_mode_keeps_terms_matching_rest() {
        let (_dir, generation) = published(
            "demo",
            &[
                ("sample.txt", "bug buffer\n"),
                ("other.txt", "bus bus bus\n"),
                ("third.txt", "bus\n"),
            ],
        );
        let targets = vec![SearchTarget::ready("demo", generation)];
        let request = SuggestRequest {
            query: SearchRequest::new()
                .with_field(Field::Full, "bu")
                .with_field(Field::Path, "sample"),
            field: Field::Full,
            caret: Some(2),
        };
        let response = suggester(SuggesterConfig::default())
            .suggest(&request, &targets, &CancelToken::new())
            .unwrap();
        assert_eq!(phrases(&response), vec!["buffer", "bug"]);
    }

    #[test]
    fn test_complex_mode_prefers_terms_in_relevant_documents() {
        let (_dir, generation) = published(
            "demo",
            &[
                ("heavy.txt", "sample sample sample sample budget\n"),
                ("light.txt", "sample bucket notes and other words\n"),
                ("none.txt", "bucket\n"),
            ],
        );
        let targets = vec![SearchTarget::ready("demo", generation)];
        let request = SuggestRequest {
            query: SearchRequest::new().with_field(Field::Full, "sample bu"),
            field: Field::Full,
            caret: Some(9),
        };
        for similarity in [Similarity::TfIdf, Similarity::bm25()] {
            let response = suggester(SuggesterConfig::default())
                .with_similarity(similarity)
                .suggest(&request, &targets, &CancelToken::new())
                .unwrap();
            assert_eq!(phrases(&response), vec!["budget", "bucket"]);
            assert_eq!(response.identifier, "bu");
            assert!(response.suggestions[0].score > response.suggestions[1].score);
        }
    }

    #[test]
    fn test_wildcard_identifier() {
        let (_dir, generation) = published("demo", &[("a.txt", "be by bye\n")]);
        let targets = vec![SearchTarget::ready("demo", generation)];
        let response = suggester(SuggesterConfig::default())
            .suggest(&request(Field::Full, "b?"), &targets, &CancelToken::new())
            .unwrap();
        assert_eq!(phrases(&response), vec!["be", "by"]);
    }

    #[test]
    fn test_defs_completion_is_case_sensitive() {
        let (_dir, generation) = published(
            "demo",
            &[("a.c", "int Inner(void) { return 0; }\nint inner_x(void) { return 1; }\n")],
        );
        let targets = vec![SearchTarget::ready("demo", generation)];
        let response = suggester(SuggesterConfig::default())
            .suggest(&request(Field::Defs, "Inn"), &targets, &CancelToken::new())
            .unwrap();
        assert_eq!(phrases(&response), vec!["Inner"]);
    }

    #[test]
    fn test_popular_terms_rank_first() {
        let (_dir, generation) = published(
            "demo",
            &[("a.txt", "teach\n"), ("b.txt", "teach text\n")],
        );
        let targets = vec![SearchTarget::ready("demo", generation)];
        let suggester = suggester(SuggesterConfig::default());
        suggester.record_search(
            &["demo".to_string()],
            &SearchRequest::new().with_field(Field::Full, "text"),
        );

        let response = suggester
            .suggest(&request(Field::Full, "te"), &targets, &CancelToken::new())
            .unwrap();
        assert_eq!(phrases(&response), vec!["text", "teach"]);
    }

    #[test]
    fn test_limits_and_configuration() {
        let (_dir, generation) = published("demo", &[("a.txt", "alpha alps alpine\n")]);
        let targets = vec![SearchTarget::ready("demo", generation)];

        let limited = suggester(SuggesterConfig {
            max_results: 2,
            ..SuggesterConfig::default()
        })
        .suggest(&request(Field::Full, "al"), &targets, &CancelToken::new())
        .unwrap();
        assert_eq!(limited.suggestions.len(), 2);

        let strict = suggester(SuggesterConfig {
            min_chars: 3,
            allowed_fields: vec!["full".to_string()],
            ..SuggesterConfig::default()
        });
        assert!(matches!(
            strict.suggest(&request(Field::Full, "al"), &targets, &CancelToken::new()),
            Err(SourcedexError::InvalidRequest(_))
        ));
        assert!(matches!(
            strict.suggest(&request(Field::Defs, "alpha"), &targets, &CancelToken::new()),
            Err(SourcedexError::InvalidRequest(_))
        ));

        let simple_only = suggester(SuggesterConfig {
            allow_complex_queries: false,
            ..SuggesterConfig::default()
        });
        assert!(simple_only
            .suggest(&request(Field::Full, "x al"), &targets, &CancelToken::new())
            .is_err());
    }

    #[test]
    fn test_timeout_returns_partial_result() {
        let (_dir, generation) = published("demo", &[("a.txt", "alpha\n")]);
        let targets = vec![SearchTarget::ready("demo", generation)];
        let cancel = CancelToken::new();
        cancel.cancel();

        let response = suggester(SuggesterConfig::default())
            .suggest(&request(Field::Full, "al"), &targets, &cancel)
            .unwrap();
        assert!(response.partial_result);
        assert!(response.suggestions.is_empty());
    }
}
