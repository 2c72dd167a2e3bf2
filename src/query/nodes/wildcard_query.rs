//! Wildcard query - matches terms using wildcards
//!
//! Supports:
//! - `*` - matches any sequence of characters
//! - `?` - matches any single character
//! - `\` - makes the next character literal

use std::any::Any;
use std::collections::BTreeSet;
use std::sync::Arc;

use regex::Regex;
use roaring::RoaringBitmap;

use super::{best_expanded_score, term_lines};
use crate::models::Field;
use crate::query::ast::QueryNode;
use crate::query::context::QueryContext;
use crate::query::scoring::CorpusStats;
use crate::segment::DocNo;
use crate::Result;

/// Query that matches terms using wildcard patterns
///
/// Only terms sharing the pattern's literal prefix are tested against the
/// compiled pattern, so a leading wildcard scans the whole field.
#[derive(Clone, Debug)]
pub struct WildcardQuery {
    pub field: Field,
    pub pattern: String,
    literal_prefix: String,
    regex: Regex,
}

impl WildcardQuery {
    pub fn new(field: Field, pattern: impl Into<String>) -> std::result::Result<Self, regex::Error> {
        let pattern = pattern.into();
        let (literal_prefix, regex) = compile(&pattern)?;
        Ok(Self {
            field,
            pattern,
            literal_prefix,
            regex,
        })
    }

    pub fn literal_prefix(&self) -> &str {
        &self.literal_prefix
    }

    pub fn matches(&self, term: &str) -> bool {
        self.regex.is_match(term)
    }

    fn cache_key(&self) -> String {
        format!("wildcard:{}:{}", self.field, self.pattern)
    }

    /// Terms of the current segment matching the pattern
    pub fn expand(&self, ctx: &QueryContext<'_>) -> Arc<Vec<String>> {
        ctx.expansion(&self.cache_key(), |reader, limit| {
            reader
                .terms()
                .prefix_filter(self.field, &self.literal_prefix, limit, |t| self.matches(t))
                .into_iter()
                .map(|(term, _)| term)
                .collect()
        })
    }
}

/// Literal prefix and anchored regex for a wildcard pattern
fn compile(pattern: &str) -> std::result::Result<(String, Regex), regex::Error> {
    let mut prefix = String::new();
    let mut in_prefix = true;
    let mut regex_pattern = String::from("^");
    let mut chars = pattern.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '*' => {
                in_prefix = false;
                regex_pattern.push_str(".*");
            }
            '?' => {
                in_prefix = false;
                regex_pattern.push('.');
            }
            _ => {
                let literal = if ch == '\\' {
                    match chars.next() {
                        Some(next) => next,
                        None => break,
                    }
                } else {
                    ch
                };
                if in_prefix {
                    prefix.push(literal);
                }
                regex_pattern.push_str(&regex::escape(literal.encode_utf8(&mut [0; 4])));
            }
        }
    }
    regex_pattern.push('$');

    Ok((prefix, Regex::new(&regex_pattern)?))
}

impl PartialEq for WildcardQuery {
    fn eq(&self, other: &Self) -> bool {
        self.field == other.field && self.pattern == other.pattern
    }
}

impl QueryNode for WildcardQuery {
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
        "wildcard"
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::query::scoring::Scorer;
    use crate::query::testutil::segment_with;

    #[test]
    fn test_pattern_compilation() {
        let query = WildcardQuery::new(Field::Full, "f?o*").unwrap();
        assert_eq!(query.literal_prefix(), "f");
        assert!(query.matches("foo"));
        assert!(query.matches("fxobar"));
        assert!(!query.matches("fo"));
        assert!(!query.matches("afoo"));

        let escaped = WildcardQuery::new(Field::Full, "a.b\\*c*").unwrap();
        assert_eq!(escaped.literal_prefix(), "a.b*c");
        assert!(escaped.matches("a.b*cd"));
        assert!(!escaped.matches("axb*cd"));
    }

    #[test]
    fn test_wildcard_execute() {
        let segment = segment_with(&[
            ("a.txt", "buffer\n"),
            ("b.txt", "buffet\n"),
            ("c.txt", "butter\n"),
        ]);
        let stats = CorpusStats::default();
        let scorer = Scorer::default();
        let cancel = CancelToken::new();
        let ctx = QueryContext::new(&segment, &stats, &scorer, &cancel);

        let query = WildcardQuery::new(Field::Full, "buff??").unwrap();
        assert_eq!(query.execute(&ctx).unwrap().iter().collect::<Vec<_>>(), vec![0, 1]);

        let leading = WildcardQuery::new(Field::Full, "*tter").unwrap();
        assert_eq!(leading.execute(&ctx).unwrap().iter().collect::<Vec<_>>(), vec![2]);
    }
}
