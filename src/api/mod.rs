//! HTTP JSON interface

mod handlers;
mod router;
pub mod types;

pub use handlers::ApiError;
pub use router::{create_router, AppState};

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use std::sync::Arc;
    use tower::ServiceExt;

    use crate::catalog::Catalog;
    use crate::config::{CatalogConfig, ProjectConfig};
    use crate::metrics::SourcedexMetrics;
    use crate::scheduler::{IndexScheduler, NoHistory};
    use crate::cancel::CancelToken;

    struct Fixture {
        _data: tempfile::TempDir,
        _src: tempfile::TempDir,
        router: Router,
    }

    fn fixture() -> Fixture {
        let data = tempfile::tempdir().unwrap();
        let src = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("a.c"), "int foo(void) { return 1; }\n").unwrap();
        std::fs::write(src.path().join("b.c"), "int bar(void) {\n  return foo();\n}\n").unwrap();

        let config = CatalogConfig {
            data_dir: data.path().to_path_buf(),
            projects: vec![ProjectConfig {
                name: "demo".to_string(),
                source_root: src.path().to_path_buf(),
                description: None,
            }],
            ..CatalogConfig::default()
        };
        let catalog = Arc::new(Catalog::open(&config).unwrap());
        let scheduler = IndexScheduler::new(&config.settings);
        scheduler
            .index_project_with_history(
                &catalog.index("demo").unwrap(),
                src.path(),
                &NoHistory,
                &CancelToken::new(),
            )
            .unwrap();

        let metrics = Arc::new(SourcedexMetrics::new().unwrap());
        let state = AppState::new(catalog, &config.settings, metrics);
        Fixture {
            _data: data,
            _src: src,
            router: create_router(state),
        }
    }

    async fn call(router: &Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, serde_json::Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if body.is_some() {
            request = request.header("content-type", "application/json");
        }
        let request = request
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_search_endpoint() {
        let fixture = fixture();
        let (status, json) = call(&fixture.router, "GET", "/api/v1/search?defs=foo&projects=demo", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["totalHits"], 1);
        assert_eq!(json["hits"][0]["path"], "a.c");
        assert_eq!(json["hits"][0]["lines"], serde_json::json!([1]));
        assert_eq!(json["partialResult"], false);
    }

    #[tokio::test]
    async fn test_search_errors() {
        let fixture = fixture();
        let (status, json) = call(&fixture.router, "GET", "/api/v1/search?full=%28foo", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "query_parse_error");
        assert_eq!(json["field"], "full");

        let (status, json) = call(&fixture.router, "GET", "/api/v1/search?full=foo&projects=nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "unknown_project");

        let (status, _) = call(&fixture.router, "GET", "/api/v1/search", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_suggest_endpoints() {
        let fixture = fixture();
        let (status, json) = call(&fixture.router, "GET", "/api/v1/suggest?field=defs&defs=fo", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["identifier"], "fo");
        assert_eq!(json["suggestions"][0]["phrase"], "foo");

        let (status, json) = call(&fixture.router, "GET", "/api/v1/suggest/config", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["enabled"], true);
        assert!(json["allowedFields"].as_array().unwrap().len() > 1);
    }

    #[tokio::test]
    async fn test_projects_and_messages() {
        let fixture = fixture();
        let (status, json) = call(
            &fixture.router,
            "POST",
            "/api/v1/messages",
            Some(r#"{"tags": ["demo"], "text": "reindexing tonight", "messageLevel": "warning"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["messageLevel"], "warning");

        let (_, json) = call(&fixture.router, "GET", "/api/v1/projects", None).await;
        assert_eq!(json[0]["name"], "demo");
        assert_eq!(json[0]["indexed"], true);
        assert_eq!(json[0]["messages"][0]["text"], "reindexing tonight");

        let (_, json) = call(&fixture.router, "GET", "/api/v1/messages?tag=demo", None).await;
        assert_eq!(json[0]["tag"], "demo");

        let (status, json) = call(&fixture.router, "DELETE", "/api/v1/messages?tag=demo", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["removed"], 1);

        let (status, _) = call(&fixture.router, "DELETE", "/api/v1/messages", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health_and_metrics() {
        let fixture = fixture();
        let (status, json) = call(&fixture.router, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");

        let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let response = fixture.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
