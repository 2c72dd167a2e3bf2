//! Boolean query - combines multiple clauses with AND, OR, NOT semantics

use std::any::Any;
use std::cmp::Ordering;
use std::collections::BTreeSet;

use roaring::RoaringBitmap;

use crate::models::Field;
use crate::query::ast::QueryNode;
use crate::query::context::QueryContext;
use crate::query::scoring::CorpusStats;
use crate::segment::DocNo;
use crate::Result;

/// Boolean query combining multiple clauses
///
/// The boolean query supports three types of clauses:
/// - `must`: All clauses must match (AND). Contributes to score.
/// - `should`: At least one clause should match (OR) when there is no
///   `must` clause; otherwise only contributes to score.
/// - `must_not`: No clause must match (NOT). Does not contribute to score.
///
/// A query with only `must_not` clauses matches every live document except
/// the excluded ones.
#[derive(Clone, Debug, Default)]
pub struct BoolQuery {
    pub must: Vec<Box<dyn QueryNode>>,
    pub should: Vec<Box<dyn QueryNode>>,
    pub must_not: Vec<Box<dyn QueryNode>>,
}

impl BoolQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a must clause
    pub fn must(mut self, query: impl QueryNode + 'static) -> Self {
        self.must.push(Box::new(query));
        self
    }

    /// Add a should clause
    pub fn should(mut self, query: impl QueryNode + 'static) -> Self {
        self.should.push(Box::new(query));
        self
    }

    /// Add a must_not clause
    pub fn must_not(mut self, query: impl QueryNode + 'static) -> Self {
        self.must_not.push(Box::new(query));
        self
    }

    /// Add a must clause (boxed)
    pub fn must_boxed(mut self, query: Box<dyn QueryNode>) -> Self {
        self.must.push(query);
        self
    }

    /// Add a should clause (boxed)
    pub fn should_boxed(mut self, query: Box<dyn QueryNode>) -> Self {
        self.should.push(query);
        self
    }

    /// Add a must_not clause (boxed)
    pub fn must_not_boxed(mut self, query: Box<dyn QueryNode>) -> Self {
        self.must_not.push(query);
        self
    }

    /// Check if this is an empty query
    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.should.is_empty() && self.must_not.is_empty()
    }

    /// Get total number of clauses
    pub fn clause_count(&self) -> usize {
        self.must.len() + self.should.len() + self.must_not.len()
    }

    /// Reorder must clauses by estimated cost (cheapest first)
    ///
    /// Should clauses keep their order; must_not clauses only run against
    /// what is left, so their order does not matter.
    pub fn optimize_clause_order(&mut self, stats: &CorpusStats) {
        self.must.sort_by(|a, b| {
            a.estimate_cost(stats)
                .partial_cmp(&b.estimate_cost(stats))
                .unwrap_or(Ordering::Equal)
        });
    }
}

impl QueryNode for BoolQuery {
    fn execute(&self, ctx: &QueryContext<'_>) -> Result<RoaringBitmap> {
        let mut result: Option<RoaringBitmap> = None;

        for query in &self.must {
            let matches = query.execute(ctx)?;
            let narrowed = match result {
                Some(r) => r & matches,
                None => matches,
            };
            if narrowed.is_empty() {
                return Ok(narrowed);
            }
            result = Some(narrowed);
        }

        if self.must.is_empty() && !self.should.is_empty() {
            let mut any = RoaringBitmap::new();
            for query in &self.should {
                any |= query.execute(ctx)?;
            }
            result = Some(any);
        }

        let mut result = match result {
            Some(r) => r,
            None => {
                ctx.check_cancelled()?;
                ctx.live_docs()
            }
        };

        for query in &self.must_not {
            if result.is_empty() {
                break;
            }
            result -= query.execute(ctx)?;
        }

        Ok(result)
    }

    fn estimate_cost(&self, stats: &CorpusStats) -> f64 {
        if !self.must.is_empty() {
            self.must
                .iter()
                .map(|q| q.estimate_cost(stats))
                .fold(f64::INFINITY, f64::min)
        } else if !self.should.is_empty() {
            self.should.iter().map(|q| q.estimate_cost(stats)).sum()
        } else {
            stats.doc_count() as f64
        }
    }

    fn query_type(&self) -> &'static str {
        "bool"
    }

    fn is_scoring(&self) -> bool {
        self.must.iter().any(|q| q.is_scoring()) || self.should.iter().any(|q| q.is_scoring())
    }

    /// Sum of the clause scores; zero when a scoring must clause misses
    fn score(&self, ctx: &QueryContext<'_>, docno: DocNo) -> Result<f32> {
        let mut total = 0.0f32;
        for query in &self.must {
            let score = query.score(ctx, docno)?;
            if score == 0.0 && query.is_scoring() {
                return Ok(0.0);
            }
            total += score;
        }
        for query in &self.should {
            total += query.score(ctx, docno)?;
        }
        Ok(total)
    }

    fn collect_terms(&self, terms: &mut Vec<(Field, String)>) {
        for query in self.must.iter().chain(&self.should) {
            query.collect_terms(terms);
        }
    }

    fn matched_lines(
        &self,
        ctx: &QueryContext<'_>,
        docno: DocNo,
        lines: &mut BTreeSet<u32>,
    ) -> Result<()> {
        for query in self.must.iter().chain(&self.should) {
            query.matched_lines(ctx, docno, lines)?;
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn QueryNode> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
