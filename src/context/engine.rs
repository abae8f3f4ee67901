//! Context Analysis Engine
//!
//! Per request:
//!
//! ```text
//! prompt analysis ─▶ relevance gate ─┬─▶ not relevant (done)
//!                                    └─▶ detection ∥ rule analysis
//!                                         ─▶ documentation fetch ─▶ curate
//! ```
//!
//! Only prompt analysis can fail a request. Detection, rule analysis and the
//! documentation fetch each fall back to an empty value and record a
//! [`DegradedSignal`].

use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use super::curator::{curate, CurationInput};
use super::documentation::{provider_from_config, DocumentationItem, DocumentationProvider};
use super::models::{
    ContextAnalysisRequest, ContextAnalysisResponse, CuratedResponse, SuggestedRules,
};
use crate::config::Config;
use crate::detection::{ProductDetectionResult, ProductDetector};
use crate::error::{ContextError, DegradedSignal, Result, Stage};
use crate::metrics::METRICS;
use crate::products::Product;
use crate::prompt::{PromptAnalysisResult, PromptAnalyzer};
use crate::rules::{RuleAnalysisResult, RuleIntelligenceService};

/// Orchestrates prompt analysis, detection, rule analysis and curation
pub struct ContextAnalysisEngine {
    relevance_threshold: f64,
    documentation_timeout: Duration,
    analyzer: PromptAnalyzer,
    detector: Arc<ProductDetector>,
    rules: Arc<RuleIntelligenceService>,
    documentation: Option<Arc<dyn DocumentationProvider>>,
}

impl ContextAnalysisEngine {
    /// Engine with the components `config` describes
    pub fn new(config: &Config) -> Result<Self> {
        let documentation = provider_from_config(&config.documentation)?;
        Ok(Self::with_components(
            config,
            ProductDetector::new(config.detection.clone()),
            RuleIntelligenceService::new(config.rules.clone()),
            documentation,
        ))
    }

    pub fn with_components(
        config: &Config,
        detector: ProductDetector,
        rules: RuleIntelligenceService,
        documentation: Option<Arc<dyn DocumentationProvider>>,
    ) -> Self {
        Self {
            relevance_threshold: config.analysis.relevance_threshold,
            documentation_timeout: config.documentation.timeout(),
            analyzer: PromptAnalyzer::new(config.analysis.max_prompt_length),
            detector: Arc::new(detector),
            rules: Arc::new(rules),
            documentation,
        }
    }

    /// Replace the documentation provider
    pub fn with_documentation(mut self, provider: Option<Arc<dyn DocumentationProvider>>) -> Self {
        self.documentation = provider;
        self
    }

    pub fn detector(&self) -> &ProductDetector {
        &self.detector
    }

    pub fn rules(&self) -> &RuleIntelligenceService {
        &self.rules
    }

    pub fn analyzer(&self) -> &PromptAnalyzer {
        &self.analyzer
    }

    pub fn has_documentation(&self) -> bool {
        self.documentation.is_some()
    }

    /// Run the full pipeline for one request
    pub async fn analyze(&self, request: &ContextAnalysisRequest) -> Result<ContextAnalysisResponse> {
        let request_id = Uuid::new_v4();
        let span = info_span!("context_analysis", request_id = %request_id);
        let start = Instant::now();

        let result = self.run(request, start).instrument(span).await;

        let status = match &result {
            Ok(_) => "success",
            Err(e) if e.is_client_error() => "rejected",
            Err(_) => "error",
        };
        METRICS.record_analysis(status, start.elapsed().as_secs_f64());
        result
    }

    async fn run(
        &self,
        request: &ContextAnalysisRequest,
        start: Instant,
    ) -> Result<ContextAnalysisResponse> {
        let analysis = self.analyze_prompt(&request.prompt)?;

        if analysis.relevance < self.relevance_threshold {
            info!(
                relevance = analysis.relevance,
                threshold = self.relevance_threshold,
                "Prompt below relevance gate"
            );
            METRICS.record_gate_rejection();
            let curated = CuratedResponse::not_relevant(analysis.relevance);
            return Ok(respond(&analysis, curated, start));
        }

        let project = request.project_path().map(PathBuf::from);
        let (detection, rule_analysis) = tokio::join!(
            self.detect_products(project.as_deref(), &analysis),
            self.analyze_rules(project.as_deref(), request.inline_rules()),
        );

        let products = detection.product_list();
        let suggested = rule_analysis.map(|r| self.suggest_rules(r, &products));
        let documentation = self.fetch_documentation(&products).await;

        let curated = curate(CurationInput {
            analysis: &analysis,
            detection: &detection,
            rules: suggested,
            documentation: &documentation,
        });

        info!(
            relevance = analysis.relevance,
            intent = %analysis.intent,
            products = curated.product_context.len(),
            documentation = curated.documentation.len(),
            "Context analysis complete"
        );
        Ok(respond(&analysis, curated, start))
    }

    fn analyze_prompt(&self, prompt: &str) -> Result<PromptAnalysisResult> {
        self.analyzer.analyze(prompt).map_err(|e| match e {
            ContextError::InvalidInput(_) => e,
            other => {
                error!(error = %other, "Prompt analysis failed");
                ContextError::AnalysisFailed(other.to_string())
            }
        })
    }

    /// Project evidence when it finds anything, prompt hints otherwise
    async fn detect_products(
        &self,
        project: Option<&Path>,
        analysis: &PromptAnalysisResult,
    ) -> ProductDetectionResult {
        if let Some(path) = project {
            match self.detector.detect_from_project(path).await {
                Ok(result) if !result.is_empty() => return (*result).clone(),
                Ok(_) => debug!("No project evidence, falling back to prompt hints"),
                Err(e) => {
                    DegradedSignal::new(Stage::ProductDetection, path.display().to_string(), e)
                        .record()
                }
            }
        }
        self.detector.detect_from_prompt(analysis)
    }

    async fn analyze_rules(
        &self,
        project: Option<&Path>,
        inline_rules: &[String],
    ) -> Option<RuleAnalysisResult> {
        if project.is_none() && inline_rules.is_empty() {
            return None;
        }
        let outcome = AssertUnwindSafe(self.rules.analyze(project, inline_rules))
            .catch_unwind()
            .await;
        let reason = match outcome {
            Ok(Ok(result)) => return Some(result),
            Ok(Err(e)) => e.to_string(),
            Err(_) => "rule analysis panicked".to_string(),
        };
        let source = project.map_or_else(|| "inline".to_string(), |p| p.display().to_string());
        DegradedSignal::new(Stage::RuleAnalysis, source, reason).record();
        None
    }

    /// Coverage enhancements and the rule proposal, once products are known
    fn suggest_rules(&self, mut analysis: RuleAnalysisResult, products: &[Product]) -> SuggestedRules {
        let proposal = self.rules.propose_from_analysis(&analysis, products);
        let coverage = self.rules.coverage_enhancements(&analysis, products);
        analysis.suggested_enhancements.extend(coverage);

        SuggestedRules {
            rule_files: analysis.found_files,
            domain_relevance: analysis.domain_relevance,
            enhancements: analysis.suggested_enhancements,
            conflicts: analysis.conflicts,
            proposal,
        }
    }

    async fn fetch_documentation(&self, products: &[Product]) -> Vec<DocumentationItem> {
        let Some(provider) = &self.documentation else {
            return Vec::new();
        };
        if products.is_empty() {
            return Vec::new();
        }

        let fetch = AssertUnwindSafe(provider.fetch_documentation(products)).catch_unwind();
        let reason = match tokio::time::timeout(self.documentation_timeout, fetch).await {
            Ok(Ok(Ok(items))) => return items,
            Ok(Ok(Err(e))) => e.to_string(),
            Ok(Err(_)) => "provider panicked".to_string(),
            Err(_) => format!("timed out after {:?}", self.documentation_timeout),
        };
        DegradedSignal::new(Stage::DocumentationFetch, provider.name(), reason).record();
        Vec::new()
    }
}

fn respond(
    analysis: &PromptAnalysisResult,
    curated: CuratedResponse,
    start: Instant,
) -> ContextAnalysisResponse {
    ContextAnalysisResponse {
        relevance: analysis.relevance,
        intent: analysis.intent,
        detected_products: curated.product_context.clone(),
        curated_context: curated,
        processing_time: start.elapsed().as_millis() as u64,
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::documentation::StaticDocumentationProvider;
    use crate::context::models::NOT_RELEVANT_SUMMARY;
    use async_trait::async_trait;

    const PRICING_PROMPT: &str = "how do I add a custom pricing handler in Configured Commerce";

    struct SlowProvider;

    #[async_trait]
    impl DocumentationProvider for SlowProvider {
        fn name(&self) -> &str {
            "slow"
        }

        async fn fetch_documentation(&self, _products: &[Product]) -> Result<Vec<DocumentationItem>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Vec::new())
        }
    }

    struct PanickingProvider;

    #[async_trait]
    impl DocumentationProvider for PanickingProvider {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn fetch_documentation(&self, _products: &[Product]) -> Result<Vec<DocumentationItem>> {
            panic!("provider bug")
        }
    }

    fn engine(config: &Config) -> ContextAnalysisEngine {
        ContextAnalysisEngine::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_gate_short_circuits() {
        let engine = engine(&Config::default());
        let response = engine
            .analyze(&ContextAnalysisRequest::new("what's the weather today"))
            .await
            .unwrap();

        assert!(response.relevance < 0.3);
        assert!(response.detected_products.is_empty());
        assert_eq!(response.curated_context.summary, NOT_RELEVANT_SUMMARY);
        assert!(response.curated_context.best_practices.is_empty());
    }

    #[tokio::test]
    async fn test_prompt_only_request() {
        let engine = engine(&Config::default());
        let response = engine
            .analyze(&ContextAnalysisRequest::new(PRICING_PROMPT))
            .await
            .unwrap();

        assert_eq!(response.detected_products, vec![Product::ConfiguredCommerce]);
        assert_eq!(response.intent, crate::prompt::Intent::CodeHelp);
        assert!(response.curated_context.suggested_rules.is_none());
        assert!(!response.curated_context.actionable_steps.is_empty());
    }

    #[tokio::test]
    async fn test_empty_prompt_is_invalid() {
        let engine = engine(&Config::default());
        let err = engine.analyze(&ContextAnalysisRequest::new("  ")).await.unwrap_err();
        assert!(matches!(err, ContextError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_slow_documentation_times_out() {
        let mut config = Config::default();
        config.documentation.timeout_ms = 50;
        let engine = engine(&config).with_documentation(Some(Arc::new(SlowProvider)));

        let response = engine
            .analyze(&ContextAnalysisRequest::new(PRICING_PROMPT))
            .await
            .unwrap();
        assert!(response.curated_context.documentation.is_empty());
    }

    #[tokio::test]
    async fn test_panicking_documentation_degrades() {
        let engine = engine(&Config::default()).with_documentation(Some(Arc::new(PanickingProvider)));
        let response = engine
            .analyze(&ContextAnalysisRequest::new(PRICING_PROMPT))
            .await
            .unwrap();
        assert!(response.curated_context.documentation.is_empty());
        assert!(response.curated_context.code_examples.is_empty());
    }

    #[tokio::test]
    async fn test_documentation_flows_into_curation() {
        let provider = StaticDocumentationProvider::new().with_item(
            Product::ConfiguredCommerce,
            DocumentationItem {
                content: "```csharp\npublic class CustomPricingHandler : HandlerBase {}\n```".to_string(),
                source: "https://docs.developers.optimizely.com/configured-commerce/pricing".to_string(),
                title: "Pricing handlers".to_string(),
                last_updated: None,
                relevance_score: Some(0.9),
            },
        );
        let engine = engine(&Config::default()).with_documentation(Some(Arc::new(provider)));

        let response = engine
            .analyze(&ContextAnalysisRequest::new(PRICING_PROMPT))
            .await
            .unwrap();
        assert_eq!(response.curated_context.documentation.len(), 1);
        assert_eq!(response.curated_context.code_examples[0].language.as_deref(), Some("csharp"));
    }

    #[tokio::test]
    async fn test_inline_rules_are_analyzed() {
        let engine = engine(&Config::default());
        let request = ContextAnalysisRequest::new(PRICING_PROMPT)
            .with_ide_rules(vec!["Write tests\nwrite  tests".to_string()]);

        let response = engine.analyze(&request).await.unwrap();
        let rules = response.curated_context.suggested_rules.unwrap();
        assert_eq!(rules.rule_files, vec!["inline:0"]);
        assert_eq!(rules.conflicts.len(), 1);
        assert!(rules
            .enhancements
            .iter()
            .any(|e| e.product == Some(Product::ConfiguredCommerce)));
    }
}
