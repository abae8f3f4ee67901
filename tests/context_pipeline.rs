//! End-to-end tests for the context analysis pipeline

use async_trait::async_trait;
use context_curator::config::{DetectionConfig, RulesConfig};
use context_curator::context::NOT_RELEVANT_SUMMARY;
use context_curator::detection::{DetectionEvidence, DetectionMethod, EvidenceCollector, ProjectSnapshot};
use context_curator::prelude::*;
use context_curator::context::StaticDocumentationProvider;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

const PRICING_PROMPT: &str = "how do I add a custom pricing handler in Configured Commerce";

struct FailingProvider;

#[async_trait]
impl DocumentationProvider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn fetch_documentation(&self, _products: &[Product]) -> Result<Vec<DocumentationItem>> {
        Err(ContextError::Upstream("documentation service unavailable".to_string()))
    }
}

struct PanickingCollector;

#[async_trait]
impl EvidenceCollector for PanickingCollector {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::FilePattern
    }

    async fn collect(&self, _snapshot: &ProjectSnapshot) -> Result<Vec<DetectionEvidence>> {
        panic!("collector bug");
    }
}

fn engine() -> ContextAnalysisEngine {
    ContextAnalysisEngine::new(&Config::default()).unwrap()
}

fn doc(title: &str, score: f64, content: &str) -> DocumentationItem {
    DocumentationItem {
        content: content.to_string(),
        source: format!("https://docs.developers.optimizely.com/{}", title.to_lowercase().replace(' ', "-")),
        title: title.to_string(),
        last_updated: Some("2024-03-01".to_string()),
        relevance_score: Some(score),
    }
}

fn commerce_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("src/FrontEnd/modules/blueprints/acme")).unwrap();
    fs::write(
        dir.path().join("Extensions.csproj"),
        r#"<Project><ItemGroup><PackageReference Include="Insite.Core" Version="5.1.0" /></ItemGroup></Project>"#,
    )
    .unwrap();
    fs::write(
        dir.path().join(".cursorrules"),
        "# Team rules\n- Write unit tests for every handler\n- Keep controllers thin\n- write unit tests for every handler\n",
    )
    .unwrap();
    dir
}

#[tokio::test]
async fn test_code_help_prompt_without_project() {
    let response = engine()
        .analyze(&ContextAnalysisRequest::new(PRICING_PROMPT))
        .await
        .unwrap();

    assert!(response.relevance >= 0.3);
    assert_eq!(response.intent, Intent::CodeHelp);
    assert_eq!(response.detected_products.first(), Some(&Product::ConfiguredCommerce));
    assert!(response.curated_context.summary.contains("Configured Commerce"));
    assert!(response
        .curated_context
        .best_practices
        .iter()
        .any(|p| Product::ConfiguredCommerce.best_practices().contains(&p.as_str())));
}

#[tokio::test]
async fn test_unrelated_prompt_is_gated() {
    let response = engine()
        .analyze(&ContextAnalysisRequest::new("what's the weather today"))
        .await
        .unwrap();

    let curated = &response.curated_context;
    assert!(response.relevance < 0.3);
    assert!(response.detected_products.is_empty());
    assert!(curated.product_context.is_empty());
    assert!(curated.actionable_steps.is_empty());
    assert!(curated.code_examples.is_empty());
    assert!(curated.documentation.is_empty());
    assert!(curated.best_practices.is_empty());
    assert_eq!(curated.summary, NOT_RELEVANT_SUMMARY);
}

#[tokio::test]
async fn test_gate_holds_even_with_project() {
    let project = commerce_project();
    let request = ContextAnalysisRequest::new("what's the weather today")
        .with_project_path(project.path().to_string_lossy());

    let response = engine().analyze(&request).await.unwrap();
    assert!(response.detected_products.is_empty());
    assert!(response.curated_context.suggested_rules.is_none());
}

#[tokio::test]
async fn test_failing_documentation_still_succeeds() {
    let engine = engine().with_documentation(Some(Arc::new(FailingProvider)));
    let response = engine
        .analyze(&ContextAnalysisRequest::new(PRICING_PROMPT))
        .await
        .unwrap();

    assert!(response.curated_context.documentation.is_empty());
    assert!(!response.curated_context.actionable_steps.is_empty());
}

#[tokio::test]
async fn test_project_detection_and_rules() {
    let project = commerce_project();
    let request = ContextAnalysisRequest::new(PRICING_PROMPT)
        .with_project_path(project.path().to_string_lossy());

    let response = engine().analyze(&request).await.unwrap();
    assert_eq!(response.detected_products, vec![Product::ConfiguredCommerce]);
    assert!(response.curated_context.summary.contains("from project files"));

    let rules = response.curated_context.suggested_rules.unwrap();
    assert_eq!(rules.rule_files, vec![".cursorrules"]);
    assert_eq!(rules.conflicts.len(), 1);
    assert!(rules.proposal.changed);
    assert!(rules.proposal.proposed_content.contains("## Configured Commerce"));
}

#[tokio::test]
async fn test_invalid_project_path_degrades_to_prompt_hints() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("not-a-dir.txt");
    fs::write(&file, "x").unwrap();

    let request = ContextAnalysisRequest::new(PRICING_PROMPT).with_project_path(file.to_string_lossy());
    let response = engine().analyze(&request).await.unwrap();

    assert_eq!(response.detected_products, vec![Product::ConfiguredCommerce]);
    assert!(response.curated_context.suggested_rules.is_none());
}

#[tokio::test]
async fn test_documentation_is_capped_and_sorted() {
    let provider = StaticDocumentationProvider::new()
        .with_item(Product::ConfiguredCommerce, doc("Handlers", 0.4, "```csharp\npublic class PriceHandler {}\n```"))
        .with_item(Product::ConfiguredCommerce, doc("Pipelines", 0.9, ""))
        .with_item(Product::ConfiguredCommerce, doc("Blueprints", 0.4, ""))
        .with_item(Product::ConfiguredCommerce, doc("Settings", 0.1, ""))
        .with_item(Product::CmsPaas, doc("Blocks", 1.0, ""));
    let engine = engine().with_documentation(Some(Arc::new(provider)));

    let response = engine
        .analyze(&ContextAnalysisRequest::new(PRICING_PROMPT))
        .await
        .unwrap();
    let titles: Vec<&str> = response
        .curated_context
        .documentation
        .iter()
        .map(|d| d.title.as_str())
        .collect();
    assert_eq!(titles, vec!["Pipelines", "Handlers", "Blueprints"]);
    assert_eq!(response.curated_context.code_examples.len(), 1);
}

#[tokio::test]
async fn test_identical_requests_curate_identically() {
    let project = commerce_project();
    let engine = engine();
    let request = ContextAnalysisRequest::new(PRICING_PROMPT)
        .with_project_path(project.path().to_string_lossy());

    let first = engine.analyze(&request).await.unwrap();
    let second = engine.analyze(&request).await.unwrap();

    assert_eq!(first.relevance, second.relevance);
    assert_eq!(first.detected_products, second.detected_products);
    assert_eq!(first.curated_context, second.curated_context);
}

#[tokio::test]
async fn test_response_serializes_with_camel_case_fields() {
    let response = engine()
        .analyze(&ContextAnalysisRequest::new(PRICING_PROMPT))
        .await
        .unwrap();
    let value = serde_json::to_value(&response).unwrap();

    assert_eq!(value["detectedProducts"][0], "configured-commerce");
    assert!(value["curatedContext"]["actionableSteps"].is_array());
    assert!(value["processingTime"].is_u64());
    assert!(value["timestamp"].is_string());
}

#[tokio::test]
async fn test_panicking_collector_degrades_to_prompt_hints() {
    let project = commerce_project();
    let config = Config::default();
    let detector = ProductDetector::with_collectors(
        DetectionConfig::default(),
        vec![Box::new(PanickingCollector)],
    );
    let engine = ContextAnalysisEngine::with_components(
        &config,
        detector,
        RuleIntelligenceService::new(RulesConfig::default()),
        None,
    );

    let request = ContextAnalysisRequest::new(PRICING_PROMPT)
        .with_project_path(project.path().to_string_lossy());
    let response = engine.analyze(&request).await.unwrap();

    assert_eq!(response.detected_products, vec![Product::ConfiguredCommerce]);
    assert!(response.curated_context.suggested_rules.is_some());
}
