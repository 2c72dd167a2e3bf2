use serde::{Deserialize, Serialize};

use super::document::Field;

/// Field-scoped search request
///
/// Every non-empty field is parsed with the query grammar; fields are
/// combined with AND.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchRequest {
    pub full: Option<String>,
    pub defs: Option<String>,
    pub refs: Option<String>,
    pub path: Option<String>,
    pub hist: Option<String>,
    #[serde(rename = "type")]
    pub type_: Option<String>,
    /// Projects to search; empty means every available project
    pub projects: Vec<String>,
    /// Offset of the first hit to return
    pub start: usize,
    /// Page size; the configured default when absent
    pub max_results: Option<usize>,
}

impl SearchRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Query text of `field`, `None` when absent or blank
    pub fn field(&self, field: Field) -> Option<&str> {
        self.raw_field(field).filter(|v| !v.trim().is_empty())
    }

    /// Query text of `field` exactly as given
    pub fn raw_field(&self, field: Field) -> Option<&str> {
        let value = match field {
            Field::Full => &self.full,
            Field::Defs => &self.defs,
            Field::Refs => &self.refs,
            Field::Path => &self.path,
            Field::Hist => &self.hist,
            Field::Type => &self.type_,
        };
        value.as_deref()
    }

    pub fn set_field(&mut self, field: Field, text: impl Into<String>) {
        let value = Some(text.into());
        match field {
            Field::Full => self.full = value,
            Field::Defs => self.defs = value,
            Field::Refs => self.refs = value,
            Field::Path => self.path = value,
            Field::Hist => self.hist = value,
            Field::Type => self.type_ = value,
        }
    }

    pub fn with_field(mut self, field: Field, text: impl Into<String>) -> Self {
        self.set_field(field, text);
        self
    }

    pub fn with_projects<I, S>(mut self, projects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projects = projects.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_page(mut self, start: usize, max_results: usize) -> Self {
        self.start = start;
        self.max_results = Some(max_results);
        self
    }

    /// Fields carrying query text, in a fixed order
    pub fn fields(&self) -> impl Iterator<Item = (Field, &str)> + '_ {
        Field::ALL
            .iter()
            .filter_map(move |&f| self.field(f).map(|text| (f, text)))
    }

    pub fn is_empty(&self) -> bool {
        self.fields().next().is_none()
    }
}

/// One matching file
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub project: String,
    pub path: String,
    pub score: f32,
    /// 1-based lines where the query matched, ascending
    pub lines: Vec<u32>,
    pub language: String,
    /// Text of the first matched lines, when the source file is readable
    /// and unchanged since indexing
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub snippets: Vec<LineSnippet>,
}

/// One matched line of a hit
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSnippet {
    pub line: u32,
    pub text: String,
}

/// A project whose index could not be searched
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFailure {
    pub project: String,
    pub reason: String,
}

/// Ranked, paginated hits across projects
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    /// Matches before pagination
    pub total_hits: usize,
    /// Set when cancellation cut evaluation short
    pub partial_result: bool,
    pub failed_projects: Vec<ProjectFailure>,
    /// Wall-clock execution time in milliseconds
    pub time: u64,
}
