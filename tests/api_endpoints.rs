//! HTTP surface tests driven through the router with `oneshot`

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use context_curator::api::{build_router, AppState};
use context_curator::config::ServerConfig;
use context_curator::prelude::*;
use serde_json::{json, Value};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

const PRICING_PROMPT: &str = "how do I add a custom pricing handler in Configured Commerce";

fn router_with(engine: ContextAnalysisEngine, timeout: Duration) -> Router {
    build_router(AppState::new(engine, timeout), &ServerConfig::default())
}

fn router() -> Router {
    let engine = ContextAnalysisEngine::new(&Config::default()).unwrap();
    router_with(engine, Duration::from_secs(10))
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_analyze_context() {
    let (status, body) = send(
        router(),
        post_json("/api/v1/context/analyze", json!({ "prompt": PRICING_PROMPT })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["detectedProducts"], json!(["configured-commerce"]));
    assert!(body["curatedContext"]["summary"].as_str().unwrap().len() > 0);
    assert!(body["processingTime"].is_u64());
}

#[tokio::test]
async fn test_empty_prompt_is_rejected() {
    let (status, body) = send(
        router(),
        post_json("/api/v1/context/analyze", json!({ "prompt": "   " })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/context/analyze")
        .header("content-type", "application/json")
        .body(Body::from("{\"prompt\": "))
        .unwrap();
    let (status, body) = send(router(), request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let server = ServerConfig {
        max_body_bytes: 64,
        ..ServerConfig::default()
    };
    let engine = ContextAnalysisEngine::new(&Config::default()).unwrap();
    let app = build_router(AppState::new(engine, Duration::from_secs(10)), &server);

    let (status, body) = send(
        app,
        post_json("/api/v1/context/analyze", json!({ "prompt": "x".repeat(500) })),
    )
    .await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["status"], "error");
}

struct StalledProvider;

#[async_trait]
impl DocumentationProvider for StalledProvider {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn fetch_documentation(&self, _products: &[Product]) -> Result<Vec<DocumentationItem>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_request_timeout() {
    let engine = ContextAnalysisEngine::new(&Config::default())
        .unwrap()
        .with_documentation(Some(Arc::new(StalledProvider)));
    let app = router_with(engine, Duration::from_millis(100));

    let (status, body) = send(
        app,
        post_json("/api/v1/context/analyze", json!({ "prompt": PRICING_PROMPT })),
    )
    .await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["error"]["code"], "TIMEOUT");
    assert_eq!(body["error"]["details"]["timeoutMs"], 100);
}

#[tokio::test]
async fn test_rules_analyze_requires_input() {
    let (status, body) = send(router(), post_json("/api/v1/rules/analyze", json!({}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_rules_analyze_project() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join(".cursorrules"),
        "Use IContentLoader for reads\nuse icontentloader for reads\n",
    )
    .unwrap();

    let (status, body) = send(
        router(),
        post_json(
            "/api/v1/rules/analyze",
            json!({ "projectPath": dir.path().to_string_lossy() }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["foundFiles"], json!([".cursorrules"]));
    assert_eq!(body["conflicts"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_rule_proposal_dry_run_leaves_file() {
    let dir = TempDir::new().unwrap();
    let rules = dir.path().join(".cursorrules");
    fs::write(&rules, "Keep views thin\n").unwrap();

    let (status, body) = send(
        router(),
        post_json(
            "/api/v1/rules/proposal",
            json!({
                "projectPath": dir.path().to_string_lossy(),
                "products": ["configured-commerce"],
                "apply": true
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["products"], json!(["configured-commerce"]));
    assert_eq!(body["proposal"]["changed"], true);
    assert_eq!(body["outcome"]["dryRun"], true);
    assert_eq!(body["outcome"]["written"], false);
    assert_eq!(fs::read_to_string(&rules).unwrap(), "Keep views thin\n");
}

#[tokio::test]
async fn test_rule_proposal_requires_project() {
    let (status, _) = send(
        router(),
        post_json("/api/v1/rules/proposal", json!({ "projectPath": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health() {
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(router(), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["documentationEnabled"], false);
    assert!(body["detectionCache"]["totalEntries"].is_u64());
}

#[tokio::test]
async fn test_metrics_exposition() {
    let _ = send(
        router(),
        post_json("/api/v1/context/analyze", json!({ "prompt": PRICING_PROMPT })),
    )
    .await;

    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("context_analysis"));
}

#[tokio::test]
async fn test_unknown_route() {
    let request = Request::builder().uri("/api/v1/nope").body(Body::empty()).unwrap();
    let (status, body) = send(router(), request).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}
