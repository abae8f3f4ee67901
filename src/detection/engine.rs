//! Product Detection Engine
//!
//! Project mode runs every enabled collector over one bounded snapshot of the
//! project and fuses their evidence with a weighted model:
//!
//! ```text
//! score(p) = Σ_m weight(m) · min(1, Σ confidence of p's evidence from m)
//!            ─────────────────────────────────────────────────────────
//!               Σ weight(m) over methods that matched any product
//! ```
//!
//! Prompt mode turns prompt-analyzer hints into a result directly.

use chrono::Utc;
use futures::FutureExt;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};

use super::cache::{CacheStats, DetectionCache};
use super::collectors::{default_collectors, EvidenceCollector, ProjectSnapshot};
use super::models::{
    DetectedProduct, DetectionContext, DetectionEvidence, DetectionMethod, ProductDetectionResult,
};
use crate::config::{DetectionConfig, MethodConfig};
use crate::error::{ContextError, DegradedSignal, Result, Stage};
use crate::products::Product;
use crate::prompt::PromptAnalysisResult;

struct RegisteredCollector {
    collector: Box<dyn EvidenceCollector>,
    settings: MethodConfig,
}

/// Collector registry and scoring; shared with cache refreshes
struct DetectorCore {
    config: DetectionConfig,
    collectors: Vec<RegisteredCollector>,
}

/// Ranks products for a project directory or a prompt
pub struct ProductDetector {
    core: Arc<DetectorCore>,
    cache: DetectionCache<PathBuf, Arc<ProductDetectionResult>>,
}

impl ProductDetector {
    /// Detector with the built-in collectors
    pub fn new(config: DetectionConfig) -> Self {
        Self::with_collectors(config, default_collectors())
    }

    /// Detector with an explicit collector list, in registration order.
    /// Disabled or zero-weight methods are not wired in.
    pub fn with_collectors(
        config: DetectionConfig,
        collectors: Vec<Box<dyn EvidenceCollector>>,
    ) -> Self {
        let collectors = collectors
            .into_iter()
            .filter_map(|collector| {
                let settings = method_settings(&config, collector.method());
                if settings.is_active() {
                    Some(RegisteredCollector { collector, settings })
                } else {
                    debug!("Detection method {} disabled", collector.method());
                    None
                }
            })
            .collect();

        let cache = DetectionCache::new(config.cache_ttl(), config.cache_max_entries);

        Self {
            core: Arc::new(DetectorCore { config, collectors }),
            cache,
        }
    }

    /// Detect products from a project directory, using the per-path cache
    pub async fn detect_from_project(&self, path: &Path) -> Result<Arc<ProductDetectionResult>> {
        let root = validate_project_path(path).await?;
        let core = self.core.clone();
        let key = root.clone();

        let result = self
            .cache
            .get_or_refresh(key, move || async move { Arc::new(core.analyze(root).await) })
            .await;
        Ok(result)
    }

    /// Detect products from a project directory, bypassing the cache
    pub async fn analyze_project(&self, path: &Path) -> Result<ProductDetectionResult> {
        let root = validate_project_path(path).await?;
        Ok(self.core.analyze(root).await)
    }

    /// Turn prompt hints into a detection result
    pub fn detect_from_prompt(&self, analysis: &PromptAnalysisResult) -> ProductDetectionResult {
        let threshold = self.core.config.confidence_threshold;

        let products: Vec<DetectedProduct> = analysis
            .product_hints
            .iter()
            .map(|hint| {
                let confidence = (analysis.confidence * hint.strength).clamp(0.0, 1.0);
                DetectedProduct {
                    product: hint.product,
                    confidence,
                    low_confidence: confidence < threshold,
                }
            })
            .collect();

        ProductDetectionResult {
            suggested_actions: suggested_actions(&products, DetectionContext::Prompt),
            confidence: if products.is_empty() { 0.0 } else { analysis.confidence },
            products,
            context: DetectionContext::Prompt,
            evidence: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Forget a cached project result
    pub fn invalidate(&self, path: &Path) {
        let key = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        self.cache.invalidate(&key);
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Methods wired in, in registration order
    pub fn active_methods(&self) -> Vec<DetectionMethod> {
        self.core.collectors.iter().map(|c| c.collector.method()).collect()
    }
}

fn settle_collector_outcome(
    outcome: std::thread::Result<Result<Vec<DetectionEvidence>>>,
) -> std::result::Result<Vec<DetectionEvidence>, String> {
    match outcome {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(_) => Err("collector panicked".to_string()),
    }
}

impl DetectorCore {
    #[instrument(skip_all, fields(root = %root.display()))]
    async fn analyze(&self, root: PathBuf) -> ProductDetectionResult {
        let start = Instant::now();
        let snapshot = self.snapshot(root).await;

        // Collectors are independent; one failing or panicking never aborts the others
        let outcomes = futures::future::join_all(self.collectors.iter().map(|registered| {
            AssertUnwindSafe(registered.collector.collect(&snapshot))
                .catch_unwind()
                .map(settle_collector_outcome)
        }))
        .await;

        let mut evidence = Vec::new();
        for (registered, outcome) in self.collectors.iter().zip(outcomes) {
            match outcome {
                Ok(found) => evidence.extend(
                    found
                        .into_iter()
                        .filter(|e| e.confidence >= self.config.min_evidence_confidence),
                ),
                Err(e) => DegradedSignal::new(
                    Stage::EvidenceCollector,
                    registered.collector.method().as_str(),
                    e,
                )
                .record(),
            }
        }

        let products = self.score(&evidence);
        let confidence = products.first().map(|p| p.confidence).unwrap_or(0.0);

        info!(
            files = snapshot.files.len(),
            evidence = evidence.len(),
            products = products.len(),
            confidence,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Project detection complete"
        );

        ProductDetectionResult {
            suggested_actions: suggested_actions(&products, DetectionContext::Ide),
            products,
            confidence,
            context: DetectionContext::Ide,
            evidence,
            timestamp: Utc::now(),
        }
    }

    /// Walk the project on the blocking pool; a failed walk yields an empty snapshot
    async fn snapshot(&self, root: PathBuf) -> ProjectSnapshot {
        let max_depth = self.config.max_depth;
        let max_files = self.config.max_files;
        let fallback = root.clone();

        match tokio::task::spawn_blocking(move || ProjectSnapshot::scan(&root, max_depth, max_files))
            .await
        {
            Ok(snapshot) => {
                if snapshot.truncated {
                    debug!("Project walk truncated at {} files", max_files);
                }
                snapshot
            }
            Err(e) => {
                DegradedSignal::new(Stage::ProductDetection, "project_walk", e).record();
                ProjectSnapshot {
                    root: fallback,
                    ..Default::default()
                }
            }
        }
    }

    /// Weighted, normalized score per product, ranked
    fn score(&self, evidence: &[DetectionEvidence]) -> Vec<DetectedProduct> {
        let weights: BTreeMap<DetectionMethod, f64> = self
            .collectors
            .iter()
            .map(|c| (c.collector.method(), c.settings.weight))
            .collect();
        // first registration position per method; lower wins score ties
        let mut position: BTreeMap<DetectionMethod, usize> = BTreeMap::new();
        for (index, registered) in self.collectors.iter().enumerate() {
            position.entry(registered.collector.method()).or_insert(index);
        }

        // (product, method) -> summed confidence
        let mut sums: BTreeMap<(Product, DetectionMethod), f64> = BTreeMap::new();
        for item in evidence {
            if weights.contains_key(&item.method()) {
                *sums.entry((item.product, item.method())).or_insert(0.0) += item.confidence;
            }
        }

        let matched_weight: f64 = weights
            .iter()
            .filter(|(method, _)| sums.keys().any(|(_, m)| m == *method))
            .map(|(_, weight)| weight)
            .sum();
        if matched_weight <= 0.0 {
            return Vec::new();
        }

        // product -> (weighted sum, earliest contributing registration)
        let mut totals: BTreeMap<Product, (f64, usize)> = BTreeMap::new();
        for ((product, method), sum) in &sums {
            let contribution = sum.min(1.0) * weights[method];
            let registered_at = position[method];
            let entry = totals.entry(*product).or_insert((0.0, registered_at));
            entry.0 += contribution;
            entry.1 = entry.1.min(registered_at);
        }

        let mut ranked: Vec<(Product, f64, usize)> = totals
            .into_iter()
            .map(|(product, (total, registered_at))| {
                (product, (total / matched_weight).clamp(0.0, 1.0), registered_at)
            })
            .filter(|(_, score, _)| *score > 0.0)
            .collect();

        ranked.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then(a.2.cmp(&b.2))
                .then(a.0.ordinal().cmp(&b.0.ordinal()))
        });

        ranked
            .into_iter()
            .map(|(product, confidence, _)| DetectedProduct {
                product,
                confidence,
                low_confidence: confidence < self.config.confidence_threshold,
            })
            .collect()
    }
}

fn method_settings(config: &DetectionConfig, method: DetectionMethod) -> MethodConfig {
    let methods = &config.methods;
    match method {
        DetectionMethod::FilePattern => methods.file_pattern,
        DetectionMethod::Directory => methods.directory,
        DetectionMethod::Dependency => methods.dependency,
        DetectionMethod::ConfigFile => methods.config_file,
    }
}

async fn validate_project_path(path: &Path) -> Result<PathBuf> {
    let root = tokio::fs::canonicalize(path).await.map_err(|e| {
        ContextError::InvalidInput(format!("project path {} is not accessible: {}", path.display(), e))
    })?;
    let metadata = tokio::fs::metadata(&root).await?;
    if !metadata.is_dir() {
        return Err(ContextError::InvalidInput(format!(
            "project path {} is not a directory",
            path.display()
        )));
    }
    Ok(root)
}

fn suggested_actions(products: &[DetectedProduct], context: DetectionContext) -> Vec<String> {
    if products.is_empty() {
        return vec![match context {
            DetectionContext::Ide => {
                "No product markers found in the project; relying on the prompt".to_string()
            }
            DetectionContext::Prompt => {
                "Name the Optimizely product you are working with for more specific guidance"
                    .to_string()
            }
        }];
    }

    products
        .iter()
        .map(|p| {
            if p.low_confidence {
                format!(
                    "Confirm the project uses {} (detected with {:.0}% confidence)",
                    p.product.display_name(),
                    p.confidence * 100.0
                )
            } else {
                format!("Apply {} guidance to this project", p.product.display_name())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::detection::models::EvidenceType;
    use crate::prompt::PromptAnalyzer;

    struct FixedCollector {
        method: DetectionMethod,
        evidence: Vec<(Product, f64)>,
    }

    #[async_trait]
    impl EvidenceCollector for FixedCollector {
        fn method(&self) -> DetectionMethod {
            self.method
        }

        async fn collect(&self, _snapshot: &ProjectSnapshot) -> Result<Vec<DetectionEvidence>> {
            Ok(self
                .evidence
                .iter()
                .map(|(product, confidence)| DetectionEvidence {
                    evidence_type: self.method.evidence_type(),
                    product: *product,
                    path: "fixture".to_string(),
                    pattern: "fixture".to_string(),
                    confidence: *confidence,
                    description: "fixture".to_string(),
                })
                .collect())
        }
    }

    fn detector_core(collectors: Vec<FixedCollector>) -> DetectorCore {
        let config = DetectionConfig::default();
        let collectors = collectors
            .into_iter()
            .map(|c| RegisteredCollector {
                settings: method_settings(&config, c.method),
                collector: Box::new(c) as Box<dyn EvidenceCollector>,
            })
            .collect();
        DetectorCore { config, collectors }
    }

    fn evidence(method: DetectionMethod, product: Product, confidence: f64) -> DetectionEvidence {
        DetectionEvidence {
            evidence_type: method.evidence_type(),
            product,
            path: String::new(),
            pattern: String::new(),
            confidence,
            description: String::new(),
        }
    }

    #[test]
    fn test_normalizes_by_matched_methods_only() {
        let core = detector_core(vec![
            FixedCollector { method: DetectionMethod::FilePattern, evidence: vec![] },
            FixedCollector { method: DetectionMethod::Dependency, evidence: vec![] },
        ]);
        let ranked = core.score(&[evidence(DetectionMethod::Dependency, Product::CmsPaas, 0.9)]);

        assert_eq!(ranked.len(), 1);
        assert!((ranked[0].confidence - 0.9).abs() < 1e-9);
        assert!(!ranked[0].low_confidence);
    }

    #[test]
    fn test_per_method_sum_is_capped() {
        let core = detector_core(vec![FixedCollector { method: DetectionMethod::Dependency, evidence: vec![] }]);
        let ranked = core.score(&[
            evidence(DetectionMethod::Dependency, Product::CommerceConnect, 0.9),
            evidence(DetectionMethod::Dependency, Product::CommerceConnect, 0.9),
        ]);
        assert_eq!(ranked[0].confidence, 1.0);
    }

    #[test]
    fn test_ties_break_by_method_registration() {
        let core = detector_core(vec![
            FixedCollector { method: DetectionMethod::FilePattern, evidence: vec![] },
            FixedCollector { method: DetectionMethod::ConfigFile, evidence: vec![] },
        ]);
        // file-pattern weight 0.25, config-file weight 0.20; equalize the products
        let ranked = core.score(&[
            evidence(DetectionMethod::ConfigFile, Product::ConfiguredCommerce, 0.5),
            evidence(DetectionMethod::FilePattern, Product::Experimentation, 0.4),
        ]);
        assert_eq!(ranked.len(), 2);
        assert!((ranked[0].confidence - ranked[1].confidence).abs() < 1e-12);
        assert_eq!(ranked[0].product, Product::Experimentation);
    }

    #[test]
    fn test_ties_follow_actual_registration_order() {
        let core = detector_core(vec![
            FixedCollector { method: DetectionMethod::ConfigFile, evidence: vec![] },
            FixedCollector { method: DetectionMethod::FilePattern, evidence: vec![] },
        ]);
        let ranked = core.score(&[
            evidence(DetectionMethod::ConfigFile, Product::ConfiguredCommerce, 0.5),
            evidence(DetectionMethod::FilePattern, Product::Experimentation, 0.4),
        ]);
        assert_eq!(ranked[0].product, Product::ConfiguredCommerce);
    }

    #[test]
    fn test_no_evidence_yields_no_products() {
        let core = detector_core(vec![FixedCollector { method: DetectionMethod::Directory, evidence: vec![] }]);
        assert!(core.score(&[]).is_empty());
    }

    #[tokio::test]
    async fn test_low_confidence_evidence_is_discarded() {
        let dir = tempfile::TempDir::new().unwrap();
        let core = detector_core(vec![FixedCollector {
            method: DetectionMethod::Directory,
            evidence: vec![(Product::CmsSaas, 0.1), (Product::CmsPaas, 0.8)],
        }]);

        let result = core.analyze(dir.path().to_path_buf()).await;
        assert_eq!(result.product_list(), vec![Product::CmsPaas]);
        assert_eq!(result.evidence.len(), 1);
        assert_eq!(result.evidence[0].evidence_type, EvidenceType::Directory);
        assert_eq!(result.context, DetectionContext::Ide);
    }

    #[test]
    fn test_detect_from_prompt() {
        let detector = ProductDetector::new(DetectionConfig::default());
        let analysis = PromptAnalyzer::new(10_000)
            .analyze("how do I add a custom pricing handler in Configured Commerce")
            .unwrap();

        let result = detector.detect_from_prompt(&analysis);
        assert_eq!(result.context, DetectionContext::Prompt);
        assert_eq!(result.product_list(), vec![Product::ConfiguredCommerce]);
        assert_eq!(result.confidence, analysis.confidence);
        assert!(result.products[0].low_confidence);
        assert!(result.suggested_actions[0].starts_with("Confirm"));
    }

    #[test]
    fn test_disabled_methods_are_not_wired() {
        let mut config = DetectionConfig::default();
        config.methods.directory.enabled = false;
        let detector = ProductDetector::new(config);
        assert_eq!(
            detector.active_methods(),
            vec![
                DetectionMethod::FilePattern,
                DetectionMethod::Dependency,
                DetectionMethod::ConfigFile
            ]
        );
    }

    #[tokio::test]
    async fn test_file_path_is_invalid_input() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("file.txt");
        std::fs::write(&file, "x").unwrap();

        let detector = ProductDetector::new(DetectionConfig::default());
        assert!(matches!(
            detector.detect_from_project(&file).await,
            Err(ContextError::InvalidInput(_))
        ));
    }
}
