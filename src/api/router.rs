use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::analysis::AnalyzerSet;
use crate::catalog::Catalog;
use crate::config::IndexSettings;
use crate::metrics::SourcedexMetrics;
use crate::query::QueryExecutor;
use crate::suggest::Suggester;

use super::handlers::*;

/// Application state shared across all handlers
pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub executor: QueryExecutor,
    pub suggester: Suggester,
    pub metrics: Arc<SourcedexMetrics>,
}

impl AppState {
    /// Build the search services for `catalog` from `settings`
    pub fn new(catalog: Arc<Catalog>, settings: &IndexSettings, metrics: Arc<SourcedexMetrics>) -> Self {
        let analyzers = Arc::new(AnalyzerSet::new(&settings.analyzer));
        let executor = QueryExecutor::new(
            Arc::clone(&analyzers),
            settings.similarity.clone(),
            settings.query.clone(),
        )
        .with_metrics(Arc::clone(&metrics));
        let suggester = Suggester::new(analyzers, settings.suggester.clone())
            .with_similarity(settings.similarity.clone())
            .with_max_expansions(settings.query.max_expansions)
            .with_metrics(Arc::clone(&metrics));
        Self {
            catalog,
            executor,
            suggester,
            metrics,
        }
    }
}

/// Create the HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);

    Router::new()
        // Search
        .route("/api/v1/search", get(search))
        // Autocomplete
        .route("/api/v1/suggest", get(suggest))
        .route("/api/v1/suggest/config", get(suggest_config))
        // Catalog
        .route("/api/v1/projects", get(projects))
        .route(
            "/api/v1/messages",
            get(get_messages).post(add_message).delete(delete_messages),
        )
        // Health and metrics
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
