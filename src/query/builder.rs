//! Lowering of parsed field queries into executable query nodes
//!
//! Each field's text is parsed on its own, normalized the way the document
//! builder indexed that field, and the fields are combined with AND.
//! Exclusions of every field are flattened into the outer query.

use super::ast::{MatchNoneQuery, QueryNode};
use super::nodes::{AllDocsQuery, BoolQuery, PhraseQuery, PrefixQuery, TermQuery, WildcardQuery};
use super::query_string::{parse_query, ParsedQuery};
use crate::analysis::{words, AnalyzerSet};
use crate::document::path_terms;
use crate::error::SourcedexError;
use crate::models::{Field, SearchRequest};
use crate::Result;

/// Builds query trees from search requests
pub struct QueryBuilder<'a> {
    analyzers: &'a AnalyzerSet,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(analyzers: &'a AnalyzerSet) -> Self {
        Self { analyzers }
    }

    /// Query for every non-empty field of `request`
    pub fn build(&self, request: &SearchRequest) -> Result<Box<dyn QueryNode>> {
        let fields: Vec<(Field, &str)> = request.fields().collect();
        if fields.is_empty() {
            return Err(SourcedexError::InvalidRequest(
                "at least one of full, defs, refs, path, hist or type is required".to_string(),
            ));
        }
        self.build_fields(fields)
    }

    /// Query for the given field texts, combined with AND
    pub fn build_fields<'t, I>(&self, fields: I) -> Result<Box<dyn QueryNode>>
    where
        I: IntoIterator<Item = (Field, &'t str)>,
    {
        let mut combined = BoolQuery::new();
        for (field, text) in fields {
            let parsed = parse_query(field, text)?;
            match parsed {
                ParsedQuery::Bool {
                    must,
                    should,
                    must_not,
                } if should.is_empty() => {
                    for clause in &must {
                        combined.must.push(self.lower(clause)?);
                    }
                    for clause in &must_not {
                        combined.must_not.push(self.lower(clause)?);
                    }
                }
                other => combined.must.push(self.lower(&other)?),
            }
        }

        if combined.must.len() == 1 && combined.must_not.is_empty() {
            if let Some(only) = combined.must.pop() {
                return Ok(only);
            }
        }
        if combined.must.is_empty() {
            combined.must.push(Box::new(AllDocsQuery::new()));
        }
        Ok(Box::new(combined))
    }

    fn lower(&self, parsed: &ParsedQuery) -> Result<Box<dyn QueryNode>> {
        match parsed {
            ParsedQuery::Term { field, text, .. } => Ok(self.phrase_or_term(*field, self.normalize(*field, text))),
            ParsedQuery::Phrase { field, text, .. } => Ok(self.phrase_or_term(*field, self.normalize(*field, text))),
            ParsedQuery::Prefix { field, prefix, .. } => {
                let prefix = fold_case(*field, prefix);
                if prefix.is_empty() {
                    Ok(Box::new(AllDocsQuery::new()))
                } else {
                    Ok(Box::new(PrefixQuery::new(*field, prefix)))
                }
            }
            ParsedQuery::Wildcard {
                field,
                pattern,
                offset,
            } => {
                let query = WildcardQuery::new(*field, fold_case(*field, pattern)).map_err(|e| {
                    SourcedexError::parse(field.name(), *offset, format!("invalid wildcard: {}", e))
                })?;
                Ok(Box::new(query))
            }
            ParsedQuery::MatchAll => Ok(Box::new(AllDocsQuery::new())),
            ParsedQuery::Bool {
                must,
                should,
                must_not,
            } => {
                let mut query = BoolQuery::new();
                for clause in must {
                    query.must.push(self.lower(clause)?);
                }
                for clause in should {
                    query.should.push(self.lower(clause)?);
                }
                for clause in must_not {
                    query.must_not.push(self.lower(clause)?);
                }
                Ok(Box::new(query))
            }
        }
    }

    fn phrase_or_term(&self, field: Field, mut terms: Vec<(String, u32)>) -> Box<dyn QueryNode> {
        match terms.len() {
            0 => Box::new(MatchNoneQuery),
            1 => {
                let (term, _) = terms.remove(0);
                Box::new(TermQuery::new(field, term))
            }
            _ => Box::new(PhraseQuery::new(field, terms)),
        }
    }

    /// Terms of `text` as the document builder indexes them in `field`,
    /// with their offsets from the first term
    pub fn normalize(&self, field: Field, text: &str) -> Vec<(String, u32)> {
        let terms: Vec<(String, u32)> = match field {
            Field::Full => words(text)
                .enumerate()
                .map(|(i, (_, w))| (w.to_lowercase(), i as u32))
                .collect(),
            Field::Defs | Field::Refs => text
                .split_whitespace()
                .enumerate()
                .map(|(i, w)| (w.to_string(), i as u32))
                .collect(),
            Field::Path => path_terms(text)
                .into_iter()
                .enumerate()
                .map(|(i, t)| (t, i as u32))
                .collect(),
            Field::Hist => self.analyzers.prose().terms_with_positions(text),
            Field::Type => text
                .split_whitespace()
                .enumerate()
                .map(|(i, w)| (w.to_lowercase(), i as u32))
                .collect(),
        };

        let base = terms.first().map(|(_, p)| *p).unwrap_or(0);
        terms.into_iter().map(|(t, p)| (t, p - base)).collect()
    }
}

/// Case folding of prefix and wildcard patterns, matching how `field` is indexed
pub(crate) fn fold_case(field: Field, text: &str) -> String {
    if field.is_case_sensitive() {
        text.to_string()
    } else {
        text.to_lowercase()
    }
}
