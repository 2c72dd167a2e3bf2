//! All documents query - matches every live document

use std::any::Any;

use roaring::RoaringBitmap;

use crate::query::ast::QueryNode;
use crate::query::context::QueryContext;
use crate::query::scoring::CorpusStats;
use crate::segment::DocNo;
use crate::Result;

/// Query that matches all documents (excluding tombstones)
///
/// Stands in for the positive side of a query made only of exclusions, and
/// for a lone `*`.
#[derive(Clone, Debug, Default)]
pub struct AllDocsQuery;

impl AllDocsQuery {
    pub fn new() -> Self {
        Self
    }
}

impl QueryNode for AllDocsQuery {
    fn execute(&self, ctx: &QueryContext<'_>) -> Result<RoaringBitmap> {
        ctx.check_cancelled()?;
        Ok(ctx.live_docs())
    }

    fn estimate_cost(&self, stats: &CorpusStats) -> f64 {
        stats.doc_count() as f64
    }

    fn query_type(&self) -> &'static str {
        "all_docs"
    }

    fn is_scoring(&self) -> bool {
        false
    }

    fn score(&self, _ctx: &QueryContext<'_>, _docno: DocNo) -> Result<f32> {
        Ok(1.0)
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
    use crate::query::scoring::Scorer;
    use crate::query::testutil::segment_with;

    #[test]
    fn test_all_docs_excludes_tombstones() {
        let mut segment = segment_with(&[("a.c", "a\n"), ("b.c", "b\n"), ("c.c", "c\n")]);
        segment.tombstones.insert(1);
        let stats = CorpusStats::default();
        let scorer = Scorer::default();
        let cancel = CancelToken::new();
        let ctx = QueryContext::new(&segment, &stats, &scorer, &cancel);

        let docs = AllDocsQuery::new().execute(&ctx).unwrap();
        assert_eq!(docs.iter().collect::<Vec<_>>(), vec![0, 2]);
    }
}
