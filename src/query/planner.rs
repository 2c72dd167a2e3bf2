//! Query planner for optimizing query execution
//!
//! The query planner analyzes the query AST and produces an optimized
//! execution plan: boolean AND clauses are reordered so the most selective
//! leaf runs first and later intersections start from a small set.

use super::ast::QueryNode;
use super::nodes::BoolQuery;
use super::scoring::CorpusStats;
use crate::models::Field;

/// Query execution plan
#[derive(Debug)]
pub struct QueryPlan {
    /// Root query node (potentially optimized)
    pub root: Box<dyn QueryNode>,
    /// Estimated total cost
    pub estimated_cost: f64,
    /// Whether the query uses scoring
    pub uses_scoring: bool,
    /// Optimization hints applied
    pub optimizations: Vec<String>,
}

/// Query planner for optimizing query execution
pub struct QueryPlanner;

impl QueryPlanner {
    /// Exact terms a query needs statistics for, deduplicated
    pub fn terms(query: &dyn QueryNode) -> Vec<(Field, String)> {
        let mut terms = Vec::new();
        query.collect_terms(&mut terms);
        terms.sort();
        terms.dedup();
        terms
    }

    /// Create an optimized execution plan for a query
    pub fn plan(query: Box<dyn QueryNode>, stats: &CorpusStats) -> QueryPlan {
        let mut optimizations = Vec::new();
        let optimized = Self::optimize(query, stats, &mut optimizations);

        QueryPlan {
            estimated_cost: optimized.estimate_cost(stats),
            uses_scoring: optimized.is_scoring(),
            root: optimized,
            optimizations,
        }
    }

    fn optimize(
        query: Box<dyn QueryNode>,
        stats: &CorpusStats,
        optimizations: &mut Vec<String>,
    ) -> Box<dyn QueryNode> {
        let Some(bool_query) = query.as_any().downcast_ref::<BoolQuery>() else {
            return query;
        };

        let mut optimized = BoolQuery {
            must: Self::optimize_all(&bool_query.must, stats, optimizations),
            should: Self::optimize_all(&bool_query.should, stats, optimizations),
            must_not: Self::optimize_all(&bool_query.must_not, stats, optimizations),
        };

        let before: Vec<f64> = optimized.must.iter().map(|q| q.estimate_cost(stats)).collect();
        optimized.optimize_clause_order(stats);
        let after: Vec<f64> = optimized.must.iter().map(|q| q.estimate_cost(stats)).collect();
        if before != after {
            optimizations.push(format!("reordered {} must clauses by cost", after.len()));
        }

        Box::new(optimized)
    }

    fn optimize_all(
        clauses: &[Box<dyn QueryNode>],
        stats: &CorpusStats,
        optimizations: &mut Vec<String>,
    ) -> Vec<Box<dyn QueryNode>> {
        clauses
            .iter()
            .map(|q| Self::optimize(q.clone_box(), stats, optimizations))
            .collect()
    }
}
