//! Data models for prompt analysis

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::products::Product;

/// What the user is trying to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Intent {
    CodeHelp,
    Documentation,
    Troubleshooting,
    BestPractices,
    Configuration,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CodeHelp => "code-help",
            Self::Documentation => "documentation",
            Self::Troubleshooting => "troubleshooting",
            Self::BestPractices => "best-practices",
            Self::Configuration => "configuration",
            Self::Unknown => "unknown",
        }
    }
}

impl Default for Intent {
    fn default() -> Self {
        Self::Unknown
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Weak product signal derived from prompt text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductHint {
    pub product: Product,
    /// Matched terms relative to the strongest hint (0.0-1.0)
    pub strength: f64,
}

/// Result of analyzing one prompt; immutable once produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptAnalysisResult {
    /// Relevance to the product family (0.0-1.0)
    pub relevance: f64,
    /// Matched domain terms, ordered by first occurrence in the prompt
    pub keywords: IndexSet<String>,
    pub intent: Intent,
    /// Strongest hint first
    pub product_hints: Vec<ProductHint>,
    /// Confidence in the top product hint (0.0-1.0)
    pub confidence: f64,
}

impl PromptAnalysisResult {
    pub fn hinted_products(&self) -> Vec<Product> {
        self.product_hints.iter().map(|h| h.product).collect()
    }

    pub fn top_hint(&self) -> Option<Product> {
        self.product_hints.first().map(|h| h.product)
    }
}
