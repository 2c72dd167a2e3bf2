//! Abstract Syntax Tree for query representation
//!
//! This module defines the core `QueryNode` trait that all query types implement,
//! providing a unified interface for query execution, optimization, and cost estimation.

use std::any::Any;
use std::collections::BTreeSet;
use std::fmt::Debug;

use roaring::RoaringBitmap;

use super::context::QueryContext;
use super::scoring::CorpusStats;
use crate::models::Field;
use crate::segment::DocNo;
use crate::Result;

/// Core trait for all query nodes in the AST
///
/// Query nodes form a tree structure that represents the logical structure
/// of a search query. Each node is executed once per segment against a
/// `QueryContext` to produce the set of matching live document numbers.
pub trait QueryNode: Send + Sync + Debug {
    /// Execute the query and return matching live document numbers
    ///
    /// Leaves check for cancellation before touching postings, so a
    /// cancelled search stops at the next leaf.
    fn execute(&self, ctx: &QueryContext<'_>) -> Result<RoaringBitmap>;

    /// Estimate the execution cost of this query
    ///
    /// Used by the planner to evaluate selective AND clauses first. The
    /// estimate is the number of documents the node is expected to touch.
    fn estimate_cost(&self, stats: &CorpusStats) -> f64;

    /// Get the query type name for debugging and logging
    fn query_type(&self) -> &'static str;

    /// Whether this query produces scores (vs just filtering)
    fn is_scoring(&self) -> bool {
        true
    }

    /// Score contribution for a document, zero when it does not match
    fn score(&self, _ctx: &QueryContext<'_>, _docno: DocNo) -> Result<f32> {
        Ok(0.0)
    }

    /// Exact terms whose corpus statistics are needed for scoring
    fn collect_terms(&self, _terms: &mut Vec<(Field, String)>) {}

    /// Add the 1-based lines where this query matched `docno`
    fn matched_lines(
        &self,
        _ctx: &QueryContext<'_>,
        _docno: DocNo,
        _lines: &mut BTreeSet<u32>,
    ) -> Result<()> {
        Ok(())
    }

    /// Clone this query node into a boxed trait object
    fn clone_box(&self) -> Box<dyn QueryNode>;

    /// Downcasting hook for the planner
    fn as_any(&self) -> &dyn Any;
}

impl Clone for Box<dyn QueryNode> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// A query that matches no documents
///
/// Produced when a field's text analyzes to no terms, such as a history
/// query made only of stop words.
#[derive(Clone, Debug, Default)]
pub struct MatchNoneQuery;

impl QueryNode for MatchNoneQuery {
    fn execute(&self, _ctx: &QueryContext<'_>) -> Result<RoaringBitmap> {
        Ok(RoaringBitmap::new())
    }

    fn estimate_cost(&self, _stats: &CorpusStats) -> f64 {
        0.0
    }

    fn query_type(&self) -> &'static str {
        "match_none"
    }

    fn is_scoring(&self) -> bool {
        false
    }

    fn clone_box(&self) -> Box<dyn QueryNode> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
