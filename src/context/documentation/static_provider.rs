//! In-memory documentation provider

use async_trait::async_trait;

use super::{DocumentationItem, DocumentationProvider};
use crate::error::Result;
use crate::products::Product;

/// Serves a fixed set of items keyed by product, in insertion order
#[derive(Debug, Clone, Default)]
pub struct StaticDocumentationProvider {
    entries: Vec<(Product, DocumentationItem)>,
}

impl StaticDocumentationProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(mut self, product: Product, item: DocumentationItem) -> Self {
        self.entries.push((product, item));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl DocumentationProvider for StaticDocumentationProvider {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch_documentation(&self, products: &[Product]) -> Result<Vec<DocumentationItem>> {
        Ok(self
            .entries
            .iter()
            .filter(|(product, _)| products.contains(product))
            .map(|(_, item)| item.clone())
            .collect())
    }
}
