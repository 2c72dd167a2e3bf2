use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error};

use crate::api::types::*;
use crate::cancel::CancelToken;
use crate::catalog::NewMessage;
use crate::error::SourcedexError;

use super::router::AppState;

/// Error wrapper for API handlers
pub enum ApiError {
    Sourcedex(SourcedexError),
    BadRequest(String),
}

impl From<SourcedexError> for ApiError {
    fn from(e: SourcedexError) -> Self {
        ApiError::Sourcedex(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Sourcedex(e) => {
                let (status, error_type) = match &e {
                    SourcedexError::QueryParse { .. } => (StatusCode::BAD_REQUEST, "query_parse_error"),
                    SourcedexError::UnknownField(_) => (StatusCode::BAD_REQUEST, "unknown_field"),
                    SourcedexError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
                    SourcedexError::UnknownProject(_) => (StatusCode::NOT_FOUND, "unknown_project"),
                    SourcedexError::ProjectUnavailable { .. } => {
                        (StatusCode::SERVICE_UNAVAILABLE, "project_unavailable")
                    }
                    SourcedexError::Cancelled => (StatusCode::SERVICE_UNAVAILABLE, "cancelled"),
                    SourcedexError::CorruptSegment { .. } => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "corrupt_segment")
                    }
                    SourcedexError::Serialization(_) => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "serialization_error")
                    }
                    SourcedexError::Json(_) => (StatusCode::BAD_REQUEST, "json_error"),
                    SourcedexError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
                    SourcedexError::RootMissing(_) => (StatusCode::INTERNAL_SERVER_ERROR, "root_missing"),
                    SourcedexError::IndexingAborted { .. } => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "indexing_aborted")
                    }
                    SourcedexError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
                    SourcedexError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
                };
                if status.is_server_error() {
                    error!(error = %e, "request failed");
                }
                let mut body = ErrorResponse::new(error_type, e.to_string());
                if let SourcedexError::QueryParse { field, offset, message } = e {
                    body.field = Some(field);
                    body.offset = Some(offset);
                    body.message = message;
                }
                (status, body)
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorResponse::new("bad_request", msg)),
        };
        (status, Json(body)).into_response()
    }
}

/// Run blocking index work off the async executor
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, SourcedexError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| SourcedexError::Internal(format!("worker task failed: {}", e)))?
        .map_err(ApiError::from)
}

/// Ranked hits across the requested projects
pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(pairs): Query<QueryPairs>,
) -> Result<impl IntoResponse, ApiError> {
    let request = search_request(&pairs)?;
    debug!(?request, "search request");
    let results = blocking(move || {
        let targets = state.catalog.targets(&request.projects)?;
        let results = state.executor.search(&request, &targets, &CancelToken::new())?;
        let searched: Vec<String> = targets
            .iter()
            .filter(|t| t.generation.is_ok())
            .map(|t| t.project.clone())
            .collect();
        state.suggester.record_search(&searched, &request);
        Ok(results)
    })
    .await?;
    Ok(Json(results))
}

/// Completions of the identifier under the caret
pub async fn suggest(
    State(state): State<Arc<AppState>>,
    Query(pairs): Query<QueryPairs>,
) -> Result<impl IntoResponse, ApiError> {
    let request = suggest_request(&pairs)?;
    let response = blocking(move || {
        let targets = state.catalog.targets(&request.query.projects)?;
        state.suggester.suggest(&request, &targets, &CancelToken::new())
    })
    .await?;
    Ok(Json(response))
}

pub async fn suggest_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(SuggesterConfigResponse::from(state.suggester.config()))
}

/// Flat or grouped project listing
pub async fn projects(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ProjectsQuery>,
) -> Response {
    if params.grouped {
        Json(state.catalog.grouped_listing()).into_response()
    } else {
        Json(state.catalog.listing()).into_response()
    }
}

/// Live messages for the requested tags, or for every tag in use
pub async fn get_messages(
    State(state): State<Arc<AppState>>,
    Query(pairs): Query<QueryPairs>,
) -> Result<impl IntoResponse, ApiError> {
    let mut tags = message_tags(&pairs);
    if tags.is_empty() {
        let in_use: BTreeSet<String> = state
            .catalog
            .messages()
            .all()
            .into_iter()
            .flat_map(|m| m.tags)
            .collect();
        tags = in_use.into_iter().collect();
    }
    let messages: MessagesResponse = state.catalog.messages().tagged(tags.iter().map(String::as_str));
    Ok(Json(messages))
}

pub async fn add_message(
    State(state): State<Arc<AppState>>,
    Json(message): Json<NewMessage>,
) -> Result<impl IntoResponse, ApiError> {
    let accepted = state.catalog.messages().add(message)?;
    Ok((StatusCode::CREATED, Json(accepted)))
}

/// Remove messages carrying any of the given tags
pub async fn delete_messages(
    State(state): State<Arc<AppState>>,
    Query(pairs): Query<QueryPairs>,
) -> Result<impl IntoResponse, ApiError> {
    let tags: BTreeSet<String> = message_tags(&pairs).into_iter().collect();
    if tags.is_empty() {
        return Err(ApiError::BadRequest("at least one tag is required".to_string()));
    }
    let text = message_text(&pairs);
    let removed = state.catalog.messages().remove(&tags, text.as_deref());
    Ok(Json(MessagesRemoved { removed }))
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let listing = state.catalog.listing();
    let unavailable: Vec<String> = listing
        .iter()
        .filter(|p| p.unavailable.is_some())
        .map(|p| p.name.clone())
        .collect();
    Json(HealthResponse {
        status: if unavailable.is_empty() { "healthy" } else { "degraded" }.to_string(),
        version: crate::VERSION.to_string(),
        projects: listing.len(),
        unavailable,
    })
}

/// Prometheus metrics endpoint
pub async fn metrics(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let text = state
        .metrics
        .encode_text()
        .map_err(|e| SourcedexError::Internal(format!("metrics encoding failed: {}", e)))?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        text,
    ))
}
