//! Request, response and curated context models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::products::Product;
use crate::prompt::Intent;
use crate::rules::{RuleConflict, RuleEnhancement, RuleProposal};

/// Summary returned when the prompt fails the relevance gate
pub const NOT_RELEVANT_SUMMARY: &str =
    "This request does not appear to relate to Optimizely development, so no product-specific context was curated.";

/// Most code examples in one curated response
pub const MAX_CODE_EXAMPLES: usize = 5;
/// Most documentation links in one curated response
pub const MAX_DOCUMENTATION_LINKS: usize = 3;

/// Incoming analysis request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextAnalysisRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_path: Option<String>,
    /// Inline rule texts, analyzed alongside any rule files on disk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ide_rules: Option<Vec<String>>,
}

impl ContextAnalysisRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_project_path(mut self, path: impl Into<String>) -> Self {
        self.project_path = Some(path.into());
        self
    }

    pub fn with_ide_rules(mut self, rules: Vec<String>) -> Self {
        self.ide_rules = Some(rules);
        self
    }

    /// Project path, if given and not blank
    pub fn project_path(&self) -> Option<&str> {
        self.project_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }

    pub fn inline_rules(&self) -> &[String] {
        self.ide_rules.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeExample {
    /// Info string of the fence, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub code: String,
    pub title: String,
    pub source: String,
    pub relevance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentationLink {
    pub title: String,
    pub url: String,
    pub relevance: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

/// Rule intelligence carried into a curated response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedRules {
    /// Rule files analyzed, including inline rule sets
    pub rule_files: Vec<String>,
    pub domain_relevance: f64,
    pub enhancements: Vec<RuleEnhancement>,
    pub conflicts: Vec<RuleConflict>,
    pub proposal: RuleProposal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CuratedResponse {
    pub relevance: f64,
    pub product_context: Vec<Product>,
    pub summary: String,
    pub actionable_steps: Vec<String>,
    pub code_examples: Vec<CodeExample>,
    pub documentation: Vec<DocumentationLink>,
    pub best_practices: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_rules: Option<SuggestedRules>,
}

impl CuratedResponse {
    /// Fixed short-circuit response for prompts below the relevance gate
    pub fn not_relevant(relevance: f64) -> Self {
        Self {
            relevance,
            product_context: Vec::new(),
            summary: NOT_RELEVANT_SUMMARY.to_string(),
            actionable_steps: Vec::new(),
            code_examples: Vec::new(),
            documentation: Vec::new(),
            best_practices: Vec::new(),
            suggested_rules: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextAnalysisResponse {
    pub relevance: f64,
    pub intent: Intent,
    pub detected_products: Vec<Product>,
    pub curated_context: CuratedResponse,
    /// Milliseconds
    pub processing_time: u64,
    pub timestamp: DateTime<Utc>,
}
