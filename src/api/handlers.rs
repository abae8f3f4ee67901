//! HTTP handlers
//!
//! Every handler answers with its JSON body or the `ApiError` body; body
//! rejections and timeouts are mapped to the same error shape.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::models::{
    timeout_failure, ApiError, ApiFailure, ApiResult, HealthResponse, RuleAnalysisRequest,
    RuleProposalRequest, RuleProposalResponse,
};
use crate::context::{ContextAnalysisEngine, ContextAnalysisRequest, ContextAnalysisResponse};
use crate::error::{error_codes, ContextError, Result};
use crate::metrics::METRICS;
use crate::rules::RuleAnalysisResult;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ContextAnalysisEngine>,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(engine: ContextAnalysisEngine, request_timeout: Duration) -> Self {
        Self {
            engine: Arc::new(engine),
            request_timeout,
        }
    }

    /// Run `operation` under the request timeout. A timed-out operation is
    /// dropped, which abandons its in-flight work.
    async fn bounded<T>(&self, operation: impl Future<Output = Result<T>>) -> std::result::Result<T, ApiFailure> {
        match tokio::time::timeout(self.request_timeout, operation).await {
            Ok(result) => result.map_err(ApiFailure::from),
            Err(_) => {
                warn!(timeout = ?self.request_timeout, "Request timed out");
                Err(timeout_failure(self.request_timeout))
            }
        }
    }
}

fn rejection(err: JsonRejection) -> ApiFailure {
    (
        err.status(),
        Json(ApiError::new(error_codes::VALIDATION_ERROR, err.body_text())),
    )
}

/// Curate context for a prompt
///
/// POST /api/v1/context/analyze
pub async fn analyze_context(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ContextAnalysisRequest>, JsonRejection>,
) -> ApiResult<ContextAnalysisResponse> {
    let Json(request) = payload.map_err(rejection)?;
    let start = Instant::now();
    info!(
        prompt_chars = request.prompt.chars().count(),
        project = request.project_path().is_some(),
        "Context analysis request"
    );

    let result = state.bounded(state.engine.analyze(&request)).await;
    if matches!(&result, Err((status, _)) if *status == StatusCode::GATEWAY_TIMEOUT) {
        METRICS.record_analysis("timeout", start.elapsed().as_secs_f64());
    }
    result.map(Json)
}

/// Analyze editor rule files
///
/// POST /api/v1/rules/analyze
pub async fn analyze_rules(
    State(state): State<AppState>,
    payload: std::result::Result<Json<RuleAnalysisRequest>, JsonRejection>,
) -> ApiResult<RuleAnalysisResult> {
    let Json(request) = payload.map_err(rejection)?;
    let project = request
        .project_path
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from);
    let inline = request.ide_rules.unwrap_or_default();

    if project.is_none() && inline.is_empty() {
        return Err(ContextError::InvalidInput(
            "projectPath or ideRules is required".to_string(),
        )
        .into());
    }

    let rules = state.engine.rules();
    state
        .bounded(rules.analyze(project.as_deref(), &inline))
        .await
        .map(Json)
}

/// Preview, and optionally write, the merged rule file
///
/// POST /api/v1/rules/proposal
pub async fn rule_proposal(
    State(state): State<AppState>,
    payload: std::result::Result<Json<RuleProposalRequest>, JsonRejection>,
) -> ApiResult<RuleProposalResponse> {
    let Json(request) = payload.map_err(rejection)?;
    if request.project_path.trim().is_empty() {
        return Err(ContextError::InvalidInput("projectPath is required".to_string()).into());
    }

    let engine = Arc::clone(&state.engine);
    let operation = async move {
        let root = PathBuf::from(request.project_path.trim());
        let products = match request.products {
            Some(products) => products,
            None => engine.detector().detect_from_project(&root).await?.product_list(),
        };

        let inline = request.ide_rules.unwrap_or_default();
        let (analysis, proposal) = engine.rules().propose(&root, &inline, &products).await?;

        let outcome = if request.apply {
            let chosen = request.proposal.as_ref().unwrap_or(&proposal);
            Some(engine.rules().apply_proposal(&root, chosen, request.dry_run).await?)
        } else {
            None
        };

        Ok::<_, ContextError>(RuleProposalResponse {
            products,
            analysis,
            proposal,
            outcome,
        })
    };

    state.bounded(operation).await.map(Json)
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        documentation_enabled: state.engine.has_documentation(),
        detection_cache: state.engine.detector().cache_stats(),
    })
}

/// GET /metrics
pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        METRICS.export_prometheus(),
    )
}

pub async fn not_found() -> ApiFailure {
    (
        StatusCode::NOT_FOUND,
        Json(ApiError::new(error_codes::NOT_FOUND, "no such endpoint")),
    )
}
