//! Documentation provider boundary
//!
//! The engine only depends on [`DocumentationProvider`]. Whether a provider
//! is wired in at all is decided when the engine is built.

pub mod circuit_breaker;
pub mod http;
pub mod static_provider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::DocumentationConfig;
use crate::error::Result;
use crate::products::Product;

pub use circuit_breaker::{BreakerSettings, BreakerState, CircuitBreaker};
pub use http::HttpDocumentationProvider;
pub use static_provider::StaticDocumentationProvider;

/// One reference document returned by a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentationItem {
    /// Markdown body; fenced code blocks become code examples
    pub content: String,
    /// Source URL
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f64>,
}

impl DocumentationItem {
    /// Score used for ranking; missing or non-finite scores rank as 0
    pub fn relevance(&self) -> f64 {
        self.relevance_score
            .filter(|s| s.is_finite())
            .map_or(0.0, |s| s.clamp(0.0, 1.0))
    }

    /// Linkable entries carry both a source and a title
    pub fn is_linkable(&self) -> bool {
        !self.source.trim().is_empty() && !self.title.trim().is_empty()
    }
}

/// Fetches reference material for a set of products.
///
/// Failures are returned as errors; the engine turns them into a degraded
/// signal and an empty documentation list.
#[async_trait]
pub trait DocumentationProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_documentation(&self, products: &[Product]) -> Result<Vec<DocumentationItem>>;
}

/// Provider selected by configuration, or `None` when disabled
pub fn provider_from_config(
    config: &DocumentationConfig,
) -> Result<Option<Arc<dyn DocumentationProvider>>> {
    if !config.enabled {
        return Ok(None);
    }
    let provider = HttpDocumentationProvider::new(config)?;
    Ok(Some(Arc::new(provider)))
}
