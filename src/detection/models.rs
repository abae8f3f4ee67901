//! Data models for product detection

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::products::Product;

/// Kind of observation a piece of evidence represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceType {
    File,
    Directory,
    Dependency,
    Content,
}

/// Detection methods, in default registration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionMethod {
    FilePattern,
    Directory,
    Dependency,
    ConfigFile,
}

impl DetectionMethod {
    pub fn evidence_type(&self) -> EvidenceType {
        match self {
            Self::FilePattern => EvidenceType::File,
            Self::Directory => EvidenceType::Directory,
            Self::Dependency => EvidenceType::Dependency,
            Self::ConfigFile => EvidenceType::Content,
        }
    }

    pub fn from_evidence_type(evidence_type: EvidenceType) -> Self {
        match evidence_type {
            EvidenceType::File => Self::FilePattern,
            EvidenceType::Directory => Self::Directory,
            EvidenceType::Dependency => Self::Dependency,
            EvidenceType::Content => Self::ConfigFile,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FilePattern => "file-pattern",
            Self::Directory => "directory",
            Self::Dependency => "dependency",
            Self::ConfigFile => "config-file",
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observation produced by an evidence collector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionEvidence {
    #[serde(rename = "type")]
    pub evidence_type: EvidenceType,
    pub product: Product,
    /// Path relative to the project root
    pub path: String,
    pub pattern: String,
    pub confidence: f64,
    pub description: String,
}

impl DetectionEvidence {
    pub fn method(&self) -> DetectionMethod {
        DetectionMethod::from_evidence_type(self.evidence_type)
    }
}

/// Where a detection result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionContext {
    /// Project directory evidence
    Ide,
    /// Prompt hints only
    Prompt,
}

/// A ranked product with its individual confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedProduct {
    pub product: Product,
    pub confidence: f64,
    /// Below the detection threshold; reported, not dropped
    pub low_confidence: bool,
}

/// Ranked, confidence-scored product set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDetectionResult {
    /// Highest confidence first
    pub products: Vec<DetectedProduct>,
    /// Aggregate confidence (top product score)
    pub confidence: f64,
    pub context: DetectionContext,
    pub evidence: Vec<DetectionEvidence>,
    pub suggested_actions: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl ProductDetectionResult {
    /// Result with no products; callers fall back to prompt hints
    pub fn empty(context: DetectionContext) -> Self {
        Self {
            products: Vec::new(),
            confidence: 0.0,
            context,
            evidence: Vec::new(),
            suggested_actions: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn product_list(&self) -> Vec<Product> {
        self.products.iter().map(|p| p.product).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}
