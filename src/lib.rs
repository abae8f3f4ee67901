//! Context curation for Optimizely development assistants
//!
//! Given a prompt, an optional project directory and optional editor rules,
//! the crate decides whether the prompt concerns the Optimizely product
//! family, which products are involved and with what confidence, and
//! assembles one curated answer from those signals.
//!
//! - [`prompt`]: relevance, keywords, intent and product hints for a prompt
//! - [`detection`]: weighted evidence fusion over a project directory
//! - [`rules`]: editor rule analysis, conflicts and rule-file proposals
//! - [`context`]: the orchestrating engine and response curation
//! - [`api`]: axum HTTP surface

pub mod api;
pub mod config;
pub mod context;
pub mod detection;
pub mod error;
pub mod metrics;
pub mod products;
pub mod prompt;
pub mod rules;
pub mod telemetry;

pub use config::Config;
pub use error::{ContextError, Result};

/// Commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::context::{
        ContextAnalysisEngine, ContextAnalysisRequest, ContextAnalysisResponse, CuratedResponse,
        DocumentationItem, DocumentationProvider,
    };
    pub use crate::detection::{DetectionContext, ProductDetectionResult, ProductDetector};
    pub use crate::error::{ContextError, Result};
    pub use crate::products::Product;
    pub use crate::prompt::{Intent, PromptAnalysisResult, PromptAnalyzer};
    pub use crate::rules::{RuleAnalysisResult, RuleIntelligenceService, RuleProposal};
}
