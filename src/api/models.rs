//! HTTP request, response and error bodies

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::detection::CacheStats;
use crate::error::{error_codes, ContextError};
use crate::products::Product;
use crate::rules::{ApplyOutcome, RuleAnalysisResult, RuleProposal};

/// Error response body: `{"status":"error","error":{...}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub status: String,
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.error.details = Some(details);
        self
    }
}

pub type ApiFailure = (StatusCode, Json<ApiError>);
pub type ApiResult<T> = Result<Json<T>, ApiFailure>;

impl From<ContextError> for ApiFailure {
    fn from(err: ContextError) -> Self {
        let status = match &err {
            ContextError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ContextError::StaleProposal(_) => StatusCode::CONFLICT,
            ContextError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ContextError::AnalysisFailed(_)
            | ContextError::Configuration(_)
            | ContextError::Io(_)
            | ContextError::Serialization(_)
            | ContextError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ApiError::new(err.code(), err.to_string())))
    }
}

pub fn timeout_failure(timeout: Duration) -> ApiFailure {
    let millis = timeout.as_millis() as u64;
    let body = ApiError::new(
        error_codes::TIMEOUT,
        format!("request did not complete within {} ms", millis),
    )
    .with_details(serde_json::json!({ "timeoutMs": millis }));
    (StatusCode::GATEWAY_TIMEOUT, Json(body))
}

/// `POST /api/v1/rules/analyze`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleAnalysisRequest {
    #[serde(default)]
    pub project_path: Option<String>,
    #[serde(default)]
    pub ide_rules: Option<Vec<String>>,
}

/// `POST /api/v1/rules/proposal`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleProposalRequest {
    pub project_path: String,
    #[serde(default)]
    pub ide_rules: Option<Vec<String>>,
    /// Products to cover; detected from the project when absent
    #[serde(default)]
    pub products: Option<Vec<Product>>,
    /// Write the proposal (or `proposal`, when given) to the target file
    #[serde(default)]
    pub apply: bool,
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
    /// A previously previewed proposal to apply instead of a fresh one
    #[serde(default)]
    pub proposal: Option<RuleProposal>,
}

fn default_dry_run() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleProposalResponse {
    pub products: Vec<Product>,
    pub analysis: RuleAnalysisResult,
    pub proposal: RuleProposal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ApplyOutcome>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub documentation_enabled: bool,
    pub detection_cache: CacheStats,
}
