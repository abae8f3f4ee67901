//! HTTP documentation provider with retry and circuit breaker

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};

use super::circuit_breaker::{BreakerSettings, CircuitBreaker};
use super::{DocumentationItem, DocumentationProvider};
use crate::config::DocumentationConfig;
use crate::error::{ContextError, Result};
use crate::metrics::METRICS;
use crate::products::Product;

const SEARCH_OPERATION: &str = "search";
const MAX_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
enum FetchError {
    #[error("circuit breaker is open for {0}")]
    CircuitOpen(&'static str),

    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl FetchError {
    /// Client errors will not improve on retry
    fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::CircuitOpen(_) | Self::InvalidResponse(_) => false,
            Self::RequestFailed(_) | Self::Timeout(_) => true,
        }
    }
}

impl From<FetchError> for ContextError {
    fn from(err: FetchError) -> Self {
        ContextError::Upstream(format!("documentation service {}", err))
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    products: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<DocumentationItem>,
}

/// Calls `POST {endpoint}/v1/documentation/search`
pub struct HttpDocumentationProvider {
    http: Client,
    endpoint: String,
    api_key: Option<SecretString>,
    retry_attempts: usize,
    retry_backoff: Duration,
    breaker: CircuitBreaker,
}

impl HttpDocumentationProvider {
    pub fn new(config: &DocumentationConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ContextError::Configuration(format!("documentation client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            retry_attempts: config.retry_attempts,
            retry_backoff: config.retry_backoff(),
            breaker: CircuitBreaker::new(BreakerSettings {
                failure_threshold: config.circuit_breaker_failures,
                reset_timeout: config.breaker_reset_timeout(),
            }),
        })
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    fn calculate_backoff(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as u32;
        self.retry_backoff.saturating_mul(2u32.pow(exponent)).min(MAX_BACKOFF)
    }

    async fn search(&self, products: &[Product]) -> std::result::Result<Vec<DocumentationItem>, FetchError> {
        if self.breaker.is_open(SEARCH_OPERATION) {
            return Err(FetchError::CircuitOpen(SEARCH_OPERATION));
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.call_search_api(products).await {
                Ok(items) => {
                    self.breaker.mark_success(SEARCH_OPERATION);
                    return Ok(items);
                }
                Err(e) => {
                    self.breaker.mark_failure(SEARCH_OPERATION);
                    if !e.is_retryable() || attempt > self.retry_attempts {
                        error!("Documentation search failed after {} attempts: {}", attempt, e);
                        return Err(e);
                    }
                    if self.breaker.is_open(SEARCH_OPERATION) {
                        return Err(FetchError::CircuitOpen(SEARCH_OPERATION));
                    }

                    let backoff = self.calculate_backoff(attempt);
                    warn!(
                        "Documentation search attempt {} failed: {}, retrying in {:?}",
                        attempt, e, backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    async fn call_search_api(
        &self,
        products: &[Product],
    ) -> std::result::Result<Vec<DocumentationItem>, FetchError> {
        let url = format!("{}/v1/documentation/search", self.endpoint);
        let body = SearchRequest {
            products: products.iter().map(Product::id).collect(),
        };
        debug!("Calling documentation search: {} products", products.len());

        let mut req = self.http.post(&url).json(&body);
        if let Some(api_key) = &self.api_key {
            req = req.bearer_auth(api_key.expose_secret());
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(e.to_string())
            } else {
                FetchError::RequestFailed(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let search: SearchResponse = response
            .json()
            .await
            .map_err(|e| FetchError::InvalidResponse(e.to_string()))?;
        Ok(search.items)
    }
}

#[async_trait]
impl DocumentationProvider for HttpDocumentationProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch_documentation(&self, products: &[Product]) -> Result<Vec<DocumentationItem>> {
        if products.is_empty() {
            return Ok(Vec::new());
        }
        let result = self.search(products).await;
        METRICS.record_documentation(result.is_ok());
        Ok(result?)
    }
}
