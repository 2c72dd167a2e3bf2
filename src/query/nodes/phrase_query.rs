//! Phrase query - matches terms at fixed relative positions
//!
//! A phrase query matches documents containing the exact sequence of terms.
//! Each term carries its offset within the phrase, so gaps left by filtered
//! words (stop words in history messages) are kept.

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

/// Query that matches an exact phrase of normalized terms
#[derive(Clone, Debug, PartialEq)]
pub struct PhraseQuery {
    pub field: Field,
    /// Terms with their offset from the start of the phrase, ascending
    pub terms: Vec<(String, u32)>,
}

impl PhraseQuery {
    pub fn new(field: Field, terms: Vec<(String, u32)>) -> Self {
        Self { field, terms }
    }

    /// Phrase of consecutive terms
    pub fn from_terms<I, S>(field: Field, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            field,
            terms: terms
                .into_iter()
                .enumerate()
                .map(|(i, t)| (t.into(), i as u32))
                .collect(),
        }
    }

    /// Positions of the first term at which the whole phrase occurs
    pub fn match_positions(&self, ctx: &QueryContext<'_>, docno: DocNo) -> Result<Vec<u32>> {
        let Some(((first_term, first_offset), rest)) = self.terms.split_first() else {
            return Ok(Vec::new());
        };
        let first_offset = *first_offset;
        let Some(first) = ctx.posting(self.field, first_term, docno)? else {
            return Ok(Vec::new());
        };

        let mut others = Vec::with_capacity(rest.len());
        for (term, offset) in rest {
            match ctx.posting(self.field, term, docno)? {
                Some(posting) => others.push((posting.positions, *offset)),
                None => return Ok(Vec::new()),
            }
        }

        Ok(first
            .positions
            .into_iter()
            .filter(|&position| {
                let Some(start) = position.checked_sub(first_offset) else {
                    return false;
                };
                others
                    .iter()
                    .all(|(positions, offset)| positions.binary_search(&(start + offset)).is_ok())
            })
            .collect())
    }
}

impl QueryNode for PhraseQuery {
    fn execute(&self, ctx: &QueryContext<'_>) -> Result<RoaringBitmap> {
        ctx.check_cancelled()?;

        let mut candidates: Option<RoaringBitmap> = None;
        for (term, _) in &self.terms {
            let docs = ctx.term_docs(self.field, term)?;
            let narrowed = match candidates {
                Some(c) => c & docs,
                None => docs,
            };
            if narrowed.is_empty() {
                return Ok(narrowed);
            }
            candidates = Some(narrowed);
        }

        let mut result = RoaringBitmap::new();
        for docno in candidates.unwrap_or_default().iter() {
            if !self.match_positions(ctx, DocNo(docno))?.is_empty() {
                result.insert(docno);
            }
        }
        Ok(result)
    }

    fn estimate_cost(&self, stats: &CorpusStats) -> f64 {
        self.terms
            .iter()
            .map(|(t, _)| stats.doc_frequency(self.field, t) as f64)
            .fold(f64::INFINITY, f64::min)
            .min(stats.doc_count() as f64)
    }

    fn query_type(&self) -> &'static str {
        "phrase"
    }

    fn score(&self, ctx: &QueryContext<'_>, docno: DocNo) -> Result<f32> {
        let frequency = self.match_positions(ctx, docno)?.len() as u32;
        Ok(self
            .terms
            .iter()
            .map(|(term, _)| ctx.term_score(self.field, term, frequency, docno))
            .sum())
    }

    fn collect_terms(&self, terms: &mut Vec<(Field, String)>) {
        terms.extend(self.terms.iter().map(|(t, _)| (self.field, t.clone())));
    }

    fn matched_lines(
        &self,
        ctx: &QueryContext<'_>,
        docno: DocNo,
        lines: &mut BTreeSet<u32>,
    ) -> Result<()> {
        match self.field {
            Field::Full => {
                if let Some(doc) = ctx.document(docno) {
                    let starts = self.match_positions(ctx, docno)?;
                    lines.extend(starts.into_iter().map(|p| doc.line_of_position(p)));
                }
                Ok(())
            }
            _ => match self.terms.first() {
                Some((term, _)) => term_lines(ctx, self.field, term, docno, lines),
                None => Ok(()),
            },
        }
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
    use crate::query::testutil::{segment_with, stats_for};

    fn run(query: &PhraseQuery, files: &[(&str, &str)]) -> Vec<u32> {
        let segment = segment_with(files);
        let stats = stats_for(&segment, query);
        let scorer = Scorer::default();
        let cancel = CancelToken::new();
        let ctx = QueryContext::new(&segment, &stats, &scorer, &cancel);
        query.execute(&ctx).unwrap().iter().collect()
    }

    #[test]
    fn test_adjacent_terms_only() {
        let query = PhraseQuery::from_terms(Field::Full, ["socket", "timeout"]);
        let docs = run(
            &query,
            &[
                ("a.txt", "the socket timeout fired\n"),
                ("b.txt", "timeout on the socket\n"),
                ("c.txt", "socket\ntimeout\n"),
            ],
        );
        assert_eq!(docs, vec![0, 2]);
    }

    #[test]
    fn test_gap_offsets() {
        let query = PhraseQuery::new(
            Field::Full,
            vec![("open".to_string(), 0), ("file".to_string(), 2)],
        );
        let docs = run(&query, &[("a.txt", "open the file\n"), ("b.txt", "open file\n")]);
        assert_eq!(docs, vec![0]);
    }

    #[test]
    fn test_phrase_lines_and_score() {
        let segment = segment_with(&[("a.txt", "one\nred fox\nred\nfox red fox\n")]);
        let query = PhraseQuery::from_terms(Field::Full, ["red", "fox"]);
        let stats = stats_for(&segment, &query);
        let scorer = Scorer::default();
        let cancel = CancelToken::new();
        let ctx = QueryContext::new(&segment, &stats, &scorer, &cancel);

        let mut lines = BTreeSet::new();
        query.matched_lines(&ctx, DocNo(0), &mut lines).unwrap();
        assert_eq!(lines.into_iter().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert!(query.score(&ctx, DocNo(0)).unwrap() > 0.0);
    }

    #[test]
    fn test_path_phrase() {
        let query = PhraseQuery::from_terms(Field::Path, ["a", "c"]);
        let docs = run(&query, &[("src/a.c", "x\n"), ("a/b/c.h", "y\n")]);
        assert_eq!(docs, vec![0]);
    }
}
