use serde::{Deserialize, Serialize};

use crate::catalog::TaggedMessages;
use crate::config::SuggesterConfig;
use crate::error::SourcedexError;
use crate::models::{Field, SearchRequest};
use crate::suggest::SuggestRequest;

/// Decoded query string; keys may repeat
pub type QueryPairs = Vec<(String, String)>;

fn parse_number(key: &str, value: &str) -> Result<usize, SourcedexError> {
    value.trim().parse().map_err(|_| {
        SourcedexError::InvalidRequest(format!("{} must be a non-negative integer, got '{}'", key, value))
    })
}

/// Search request from `full`, `defs`, `refs`, `path`, `hist`, `type`,
/// repeated `projects`, `start` and `maxresults`
///
/// Unknown keys are ignored.
pub fn search_request(pairs: &QueryPairs) -> Result<SearchRequest, SourcedexError> {
    let mut request = SearchRequest::new();
    for (key, value) in pairs {
        match key.as_str() {
            "projects" | "project" => request.projects.extend(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string),
            ),
            "start" => request.start = parse_number(key, value)?,
            "maxresults" => request.max_results = Some(parse_number(key, value)?),
            other => {
                if let Ok(field) = other.parse::<Field>() {
                    request.set_field(field, value.clone());
                }
            }
        }
    }
    Ok(request)
}

/// Suggestion request: the search keys plus `field` and `caret`
pub fn suggest_request(pairs: &QueryPairs) -> Result<SuggestRequest, SourcedexError> {
    let query = search_request(pairs)?;
    let mut field = None;
    let mut caret = None;
    for (key, value) in pairs {
        match key.as_str() {
            "field" => field = Some(value.parse::<Field>()?),
            "caret" => caret = Some(parse_number(key, value)?),
            _ => {}
        }
    }
    let field = field.ok_or_else(|| SourcedexError::InvalidRequest("missing field".to_string()))?;
    Ok(SuggestRequest { query, field, caret })
}

/// Autocomplete settings the web client needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggesterConfigResponse {
    pub enabled: bool,
    pub allowed_fields: Vec<String>,
    pub min_chars: usize,
    pub show_scores: bool,
    pub show_projects: bool,
    pub show_time: bool,
}

impl From<&SuggesterConfig> for SuggesterConfigResponse {
    fn from(config: &SuggesterConfig) -> Self {
        Self {
            enabled: config.enabled,
            allowed_fields: config.allowed_fields.clone(),
            min_chars: config.min_chars,
            show_scores: config.show_scores,
            show_projects: config.show_projects,
            show_time: config.show_time,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectsQuery {
    #[serde(default)]
    pub grouped: bool,
}

/// Message lookup: repeated `tag`; none means every tag in use
pub fn message_tags(pairs: &QueryPairs) -> Vec<String> {
    pairs
        .iter()
        .filter(|(k, v)| k == "tag" && !v.trim().is_empty())
        .map(|(_, v)| v.trim().to_string())
        .collect()
}

/// Message removal: repeated `tag` and an optional exact `text`
pub fn message_text(pairs: &QueryPairs) -> Option<String> {
    pairs
        .iter()
        .find(|(k, _)| k == "text")
        .map(|(_, v)| v.clone())
}

pub type MessagesResponse = Vec<TaggedMessages>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesRemoved {
    pub removed: usize,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub projects: usize,
    pub unavailable: Vec<String>,
}

/// API Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            field: None,
            offset: None,
        }
    }
}
