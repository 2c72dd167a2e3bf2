//! Prefix query - matches terms starting with a prefix

use std::any::Any;
use std::collections::BTreeSet;

use roaring::RoaringBitmap;

use super::{best_expanded_score, term_lines};
use crate::models::Field;
use crate::query::ast::QueryNode;
use crate::query::context::QueryContext;
use crate::query::scoring::CorpusStats;
use crate::segment::DocNo;
use crate::Result;

/// Query that matches documents containing any term with a given prefix
///
/// The prefix expands against each segment's FST term dictionary, capped at
/// the context's expansion limit. Matches score a constant.
#[derive(Clone, Debug, PartialEq)]
pub struct PrefixQuery {
    pub field: Field,
    pub prefix: String,
}

impl PrefixQuery {
    pub fn new(field: Field, prefix: impl Into<String>) -> Self {
        Self {
            field,
            prefix: prefix.into(),
        }
    }

    fn cache_key(&self) -> String {
        format!("prefix:{}:{}", self.field, self.prefix)
    }

    /// Terms of the current segment this prefix expands to
    pub fn expand(&self, ctx: &QueryContext<'_>) -> std::sync::Arc<Vec<String>> {
        ctx.expansion(&self.cache_key(), |reader, limit| {
            reader
                .terms()
                .prefix_filter(self.field, &self.prefix, limit, |_| true)
                .into_iter()
                .map(|(term, _)| term)
                .collect()
        })
    }
}

impl QueryNode for PrefixQuery {
    fn execute(&self, ctx: &QueryContext<'_>) -> Result<RoaringBitmap> {
        ctx.check_cancelled()?;
        let mut result = RoaringBitmap::new();
        for term in self.expand(ctx).iter() {
            ctx.check_cancelled()?;
            result |= ctx.term_docs(self.field, term)?;
        }
        Ok(result)
    }

    fn estimate_cost(&self, stats: &CorpusStats) -> f64 {
        stats.doc_count() as f64
    }

    fn query_type(&self) -> &'static str {
        "prefix"
    }

    fn score(&self, ctx: &QueryContext<'_>, docno: DocNo) -> Result<f32> {
        best_expanded_score(ctx, self.field, &self.expand(ctx), docno)
    }

    fn matched_lines(
        &self,
        ctx: &QueryContext<'_>,
        docno: DocNo,
        lines: &mut BTreeSet<u32>,
    ) -> Result<()> {
        for term in self.expand(ctx).iter() {
            term_lines(ctx, self.field, term, docno, lines)?;
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
