//! Term query - exact match on a field

use std::any::Any;
use std::collections::BTreeSet;

use roaring::RoaringBitmap;

use super::term_lines;
use crate::models::Field;
use crate::query::ast::QueryNode;
use crate::query::context::QueryContext;
use crate::query::scoring::CorpusStats;
use crate::segment::DocNo;
use crate::Result;

/// Query that matches documents containing an exact term in a field
///
/// This is the most basic query type - it looks up the term in the segment's
/// term dictionary and returns the live documents of its posting list. The
/// term must already be normalized for the field.
#[derive(Clone, Debug, PartialEq)]
pub struct TermQuery {
    pub field: Field,
    pub term: String,
}

impl TermQuery {
    pub fn new(field: Field, term: impl Into<String>) -> Self {
        Self {
            field,
            term: term.into(),
        }
    }
}

impl QueryNode for TermQuery {
    fn execute(&self, ctx: &QueryContext<'_>) -> Result<RoaringBitmap> {
        ctx.check_cancelled()?;
        ctx.term_docs(self.field, &self.term)
    }

    fn estimate_cost(&self, stats: &CorpusStats) -> f64 {
        stats.doc_frequency(self.field, &self.term) as f64
    }

    fn query_type(&self) -> &'static str {
        "term"
    }

    fn score(&self, ctx: &QueryContext<'_>, docno: DocNo) -> Result<f32> {
        Ok(match ctx.posting(self.field, &self.term, docno)? {
            Some(posting) => ctx.term_score(self.field, &self.term, posting.term_frequency(), docno),
            None => 0.0,
        })
    }

    fn collect_terms(&self, terms: &mut Vec<(Field, String)>) {
        terms.push((self.field, self.term.clone()));
    }

    fn matched_lines(
        &self,
        ctx: &QueryContext<'_>,
        docno: DocNo,
        lines: &mut BTreeSet<u32>,
    ) -> Result<()> {
        term_lines(ctx, self.field, &self.term, docno, lines)
    }

    fn clone_box(&self) -> Box<dyn QueryNode> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::error::SourcedexError;
    use crate::query::scoring::Scorer;
    use crate::query::testutil::{segment_with, stats_for};

    #[test]
    fn test_term_query_execute() {
        let segment = segment_with(&[
            ("a.c", "int foo(void) { return 1; }\n"),
            ("b.c", "int bar(void) {\n  return foo();\n}\n"),
        ]);
        let query = TermQuery::new(Field::Defs, "foo");
        let stats = stats_for(&segment, &query);
        let scorer = Scorer::default();
        let cancel = CancelToken::new();
        let ctx = QueryContext::new(&segment, &stats, &scorer, &cancel);

        let docs = query.execute(&ctx).unwrap();
        assert_eq!(docs.iter().collect::<Vec<_>>(), vec![0]);
        assert!(query.score(&ctx, DocNo(0)).unwrap() > 0.0);
        assert_eq!(query.score(&ctx, DocNo(1)).unwrap(), 0.0);
        assert_eq!(query.estimate_cost(&stats), 1.0);
    }

    #[test]
    fn test_term_lines_per_field() {
        let segment = segment_with(&[("b.c", "int bar(void) {\n  return foo();\n}\n")]);
        let stats = CorpusStats::default();
        let scorer = Scorer::default();
        let cancel = CancelToken::new();
        let ctx = QueryContext::new(&segment, &stats, &scorer, &cancel);

        let mut lines = BTreeSet::new();
        TermQuery::new(Field::Refs, "foo")
            .matched_lines(&ctx, DocNo(0), &mut lines)
            .unwrap();
        assert_eq!(lines.into_iter().collect::<Vec<_>>(), vec![2]);

        let mut lines = BTreeSet::new();
        TermQuery::new(Field::Full, "return")
            .matched_lines(&ctx, DocNo(0), &mut lines)
            .unwrap();
        assert_eq!(lines.into_iter().collect::<Vec<_>>(), vec![2]);

        let mut lines = BTreeSet::new();
        TermQuery::new(Field::Path, "b")
            .matched_lines(&ctx, DocNo(0), &mut lines)
            .unwrap();
        assert!(lines.is_empty());
    }

    #[test]
    fn test_term_query_observes_cancellation() {
        let segment = segment_with(&[("a.c", "foo\n")]);
        let stats = CorpusStats::default();
        let scorer = Scorer::default();
        let cancel = CancelToken::new();
        cancel.cancel();
        let ctx = QueryContext::new(&segment, &stats, &scorer, &cancel);

        let err = TermQuery::new(Field::Full, "foo").execute(&ctx).unwrap_err();
        assert!(matches!(err, SourcedexError::Cancelled));
    }
}
