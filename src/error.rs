//! Error types for context curation
//!
//! Only the mandatory stages of the pipeline surface a `ContextError` to the
//! caller. Optional stages (evidence collectors, rule analysis, documentation
//! fetch) report a [`DegradedSignal`] instead, which is logged and counted
//! but never returned.

use std::fmt;
use thiserror::Error;
use tracing::warn;

use crate::metrics::METRICS;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, ContextError>;

/// Errors surfaced to callers
#[derive(Debug, Error)]
pub enum ContextError {
    /// Malformed or empty prompt, non-directory project path
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unexpected failure in the mandatory prompt analysis stage
    #[error("Analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The rule file changed between preview and write
    #[error("Rule proposal is stale: {0}")]
    StaleProposal(String),

    /// An external collaborator failed or was unavailable
    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ContextError {
    /// Stable error code used in API error bodies
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => error_codes::VALIDATION_ERROR,
            Self::AnalysisFailed(_) => error_codes::ANALYSIS_FAILED,
            Self::Configuration(_) => error_codes::CONFIGURATION_ERROR,
            Self::StaleProposal(_) => error_codes::CONFLICT,
            Self::Upstream(_) => error_codes::UPSTREAM_ERROR,
            Self::Io(_) | Self::Serialization(_) | Self::Internal(_) => error_codes::INTERNAL_ERROR,
        }
    }

    /// Whether the error was caused by the caller's input
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::StaleProposal(_))
    }
}

impl From<config::ConfigError> for ContextError {
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

/// Standard error codes
pub mod error_codes {
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const ANALYSIS_FAILED: &str = "ANALYSIS_FAILED";
    pub const CONFIGURATION_ERROR: &str = "CONFIGURATION_ERROR";
    pub const CONFLICT: &str = "CONFLICT";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const UPSTREAM_ERROR: &str = "UPSTREAM_ERROR";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// Optional pipeline stage that can degrade without failing a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    EvidenceCollector,
    ProductDetection,
    RuleAnalysis,
    DocumentationFetch,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EvidenceCollector => "evidence_collector",
            Self::ProductDetection => "product_detection",
            Self::RuleAnalysis => "rule_analysis",
            Self::DocumentationFetch => "documentation_fetch",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure in an optional stage; the stage's data defaults to empty
#[derive(Debug, Clone)]
pub struct DegradedSignal {
    pub stage: Stage,
    pub source: String,
    pub reason: String,
}

impl DegradedSignal {
    pub fn new(stage: Stage, source: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self {
            stage,
            source: source.into(),
            reason: reason.to_string(),
        }
    }

    /// Log and count the signal
    pub fn record(&self) {
        warn!(
            stage = %self.stage,
            source = %self.source,
            reason = %self.reason,
            "Degraded signal, continuing with fallback"
        );
        METRICS.record_degraded(self.stage.as_str());
    }
}
