//! Data models for rule intelligence

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::products::Product;

/// How a rule file is structured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleFormat {
    Text,
    Json,
}

/// One parsed rule file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdeRule {
    /// Path relative to the project root, or `inline:<n>`
    pub path: String,
    pub format: RuleFormat,
    pub content: String,
    /// Extracted directives, in file order
    pub rules: Vec<String>,
    /// Source line of each directive (1-based; ordinal for JSON files)
    pub rule_lines: Vec<usize>,
    /// Domain terms found, in order of first occurrence
    pub product_terms: Vec<String>,
    /// Products whose terms appear in the file
    pub products: Vec<Product>,
    /// Directives mentioning a domain term / all directives
    pub relevance: f64,
    pub last_modified: Option<DateTime<Utc>>,
    pub size: u64,
}

/// A rule file that exists but could not be used
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictKind {
    Duplicate,
    Contradiction,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Duplicate => "duplicate",
            Self::Contradiction => "contradiction",
        }
    }
}

/// Where a directive lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleLocation {
    pub path: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleConflict {
    #[serde(rename = "type")]
    pub kind: ConflictKind,
    /// Directive texts involved, as written
    pub rules: Vec<String>,
    pub locations: Vec<RuleLocation>,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnhancementType {
    Add,
    Modify,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleEnhancement {
    #[serde(rename = "type")]
    pub enhancement_type: EnhancementType,
    pub priority: Priority,
    pub suggestion: String,
    pub rationale: String,
    pub implementation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<Product>,
}

/// Result of analyzing the rule files of one project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleAnalysisResult {
    pub found_files: Vec<String>,
    pub existing_rules: Vec<IdeRule>,
    pub skipped_files: Vec<SkippedFile>,
    /// Size-weighted average of per-file relevance
    pub domain_relevance: f64,
    /// Products any rule file already covers
    pub covered_products: Vec<Product>,
    pub suggested_enhancements: Vec<RuleEnhancement>,
    pub conflicts: Vec<RuleConflict>,
    /// Milliseconds spent analyzing
    pub analysis_time: u64,
    pub timestamp: DateTime<Utc>,
}

impl RuleAnalysisResult {
    /// Rule file at `path`, if it was found and parsed
    pub fn rule_file(&self, path: &str) -> Option<&IdeRule> {
        self.existing_rules.iter().find(|r| r.path == path)
    }

    pub fn covers(&self, product: Product) -> bool {
        self.covered_products.contains(&product)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffTag {
    Equal,
    Insert,
    Delete,
}

/// One line-level edit; `text` keeps its line terminator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffOp {
    pub tag: DiffTag,
    pub text: String,
}

/// Normalized merged rule file, previewable before writing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleProposal {
    /// Target path relative to the project root
    pub target_file: String,
    pub proposed_content: String,
    pub diff: Vec<DiffOp>,
    pub unified_diff: String,
    /// SHA-256 of the content the diff was computed against
    pub original_fingerprint: String,
    pub original_exists: bool,
    pub changed: bool,
}

/// Outcome of applying a proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyOutcome {
    pub path: String,
    pub dry_run: bool,
    pub written: bool,
    pub bytes: usize,
}
