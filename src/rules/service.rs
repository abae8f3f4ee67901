//! Rule Intelligence Service
//!
//! Reads editor and assistant rule files from a project, measures their
//! domain relevance, reports conflicts and suggests enhancements. Rule files
//! are re-read on every call; nothing is cached.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::conflicts::detect_conflicts;
use super::models::{
    ApplyOutcome, ConflictKind, EnhancementType, IdeRule, Priority, RuleAnalysisResult,
    RuleEnhancement, RuleFormat, RuleProposal, SkippedFile,
};
use super::parser::{
    extract_json_directives, extract_text_directives, scan_directives, Directive, RULE_LOCATIONS,
};
use super::proposal::{build_proposal, fingerprint};
use crate::config::RulesConfig;
use crate::error::{ContextError, Result};
use crate::metrics::METRICS;
use crate::products::{Lexicon, Product, LEXICON};

/// Analyzes and proposes editor rule files
pub struct RuleIntelligenceService {
    config: RulesConfig,
    lexicon: &'static Lexicon,
}

impl RuleIntelligenceService {
    pub fn new(config: RulesConfig) -> Self {
        Self {
            config,
            lexicon: &LEXICON,
        }
    }

    pub fn target_file(&self) -> &str {
        &self.config.target_file
    }

    /// Analyze the known rule files under `project_path`
    pub async fn analyze_ide_rules(&self, project_path: &Path) -> Result<RuleAnalysisResult> {
        self.analyze(Some(project_path), &[]).await
    }

    /// Analyze project rule files plus inline rule texts (`inline:<n>`).
    /// Fails only when `project_path` is given and is not a directory.
    #[instrument(skip(self, inline_rules), fields(inline = inline_rules.len()))]
    pub async fn analyze(
        &self,
        project_path: Option<&Path>,
        inline_rules: &[String],
    ) -> Result<RuleAnalysisResult> {
        let start = Instant::now();
        let mut existing = Vec::new();
        let mut skipped = Vec::new();

        if let Some(root) = project_path {
            ensure_directory(root).await?;
            for (relative, format) in RULE_LOCATIONS {
                match self.read_rule_file(root, relative, *format).await {
                    Ok(Some(rule)) => existing.push(rule),
                    Ok(None) => {}
                    Err(reason) => {
                        warn!(path = relative, reason = %reason, "Skipping rule file");
                        skipped.push(SkippedFile {
                            path: relative.to_string(),
                            reason,
                        });
                    }
                }
            }
        }

        for (index, content) in inline_rules.iter().enumerate() {
            let path = format!("inline:{}", index);
            existing.push(self.parse_rule(path, RuleFormat::Text, content.clone(), None));
        }

        let result = self.summarize(existing, skipped, start);
        info!(
            files = result.found_files.len(),
            relevance = result.domain_relevance,
            conflicts = result.conflicts.len(),
            "Rule analysis complete"
        );
        Ok(result)
    }

    /// Read and parse one known location. `Ok(None)` when it does not exist;
    /// `Err(reason)` when it exists but cannot be used.
    async fn read_rule_file(
        &self,
        root: &Path,
        relative: &str,
        format: RuleFormat,
    ) -> std::result::Result<Option<IdeRule>, String> {
        let path = root.join(relative);
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(format!("unreadable: {}", e)),
        };
        if !metadata.is_file() {
            return Err("not a regular file".to_string());
        }
        if metadata.len() > self.config.max_file_bytes {
            return Err(format!(
                "file is {} bytes, limit is {}",
                metadata.len(),
                self.config.max_file_bytes
            ));
        }

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| format!("unreadable: {}", e))?;
        let content = String::from_utf8(bytes).map_err(|_| "not valid UTF-8".to_string())?;
        let modified = metadata.modified().ok().map(DateTime::<Utc>::from);

        if format == RuleFormat::Json {
            // Surface parse errors as a skip reason before building the rule
            extract_json_directives(&content).map_err(|e| format!("invalid JSON: {}", e))?;
        }

        debug!(path = relative, bytes = content.len(), "Read rule file");
        Ok(Some(self.parse_rule(relative.to_string(), format, content, modified)))
    }

    fn parse_rule(
        &self,
        path: String,
        format: RuleFormat,
        content: String,
        last_modified: Option<DateTime<Utc>>,
    ) -> IdeRule {
        let directives: Vec<Directive> = match format {
            RuleFormat::Text => extract_text_directives(&content),
            RuleFormat::Json => extract_json_directives(&content).unwrap_or_default(),
        };
        let scan = scan_directives(self.lexicon, &directives);

        IdeRule {
            path,
            format,
            size: content.len() as u64,
            rules: directives.iter().map(|d| d.text.clone()).collect(),
            rule_lines: directives.iter().map(|d| d.line).collect(),
            product_terms: scan.terms,
            products: scan.products,
            relevance: scan.relevance,
            last_modified,
            content,
        }
    }

    fn summarize(
        &self,
        existing: Vec<IdeRule>,
        skipped: Vec<SkippedFile>,
        start: Instant,
    ) -> RuleAnalysisResult {
        let total_size: u64 = existing.iter().map(|r| r.size).sum();
        let domain_relevance = if total_size == 0 {
            0.0
        } else {
            existing
                .iter()
                .map(|r| r.relevance * r.size as f64)
                .sum::<f64>()
                / total_size as f64
        };

        let covered: BTreeSet<Product> = existing
            .iter()
            .flat_map(|r| r.products.iter().copied())
            .collect();

        let conflicts = detect_conflicts(&existing);
        for conflict in &conflicts {
            METRICS.record_rule_conflict(conflict.kind.as_str());
        }

        let mut result = RuleAnalysisResult {
            found_files: existing.iter().map(|r| r.path.clone()).collect(),
            existing_rules: existing,
            skipped_files: skipped,
            domain_relevance: domain_relevance.clamp(0.0, 1.0),
            covered_products: covered.into_iter().collect(),
            suggested_enhancements: Vec::new(),
            conflicts,
            analysis_time: 0,
            timestamp: Utc::now(),
        };
        result.suggested_enhancements = self.base_enhancements(&result);
        result.analysis_time = start.elapsed().as_millis() as u64;
        result
    }

    /// Enhancements that depend only on the rule files themselves
    fn base_enhancements(&self, analysis: &RuleAnalysisResult) -> Vec<RuleEnhancement> {
        let mut enhancements = Vec::new();
        let target = &self.config.target_file;

        if analysis.existing_rules.is_empty() {
            enhancements.push(RuleEnhancement {
                enhancement_type: EnhancementType::Add,
                priority: Priority::High,
                suggestion: format!("Create {} with Optimizely development guidance", target),
                rationale: "No editor rule files were found, so assistants have no project guidance"
                    .to_string(),
                implementation: format!("Preview and apply the proposed {} content", target),
                product: None,
            });
        } else if analysis.domain_relevance < self.config.domain_relevance_threshold {
            enhancements.push(RuleEnhancement {
                enhancement_type: EnhancementType::Add,
                priority: Priority::Medium,
                suggestion: "Add Optimizely-specific guidance to the existing rule files".to_string(),
                rationale: format!(
                    "Only {:.0}% of existing rules mention the Optimizely platform",
                    analysis.domain_relevance * 100.0
                ),
                implementation: format!("Merge the product sections of the proposed {}", target),
                product: None,
            });
        }

        for conflict in &analysis.conflicts {
            let first = conflict.rules.first().cloned().unwrap_or_default();
            let enhancement = match conflict.kind {
                ConflictKind::Duplicate => RuleEnhancement {
                    enhancement_type: EnhancementType::Remove,
                    priority: Priority::Low,
                    suggestion: format!("Remove duplicate rule \"{}\"", first),
                    rationale: conflict.description.clone(),
                    implementation: "Keep the first occurrence and delete the others".to_string(),
                    product: None,
                },
                ConflictKind::Contradiction => RuleEnhancement {
                    enhancement_type: EnhancementType::Modify,
                    priority: Priority::High,
                    suggestion: "Resolve contradictory rules".to_string(),
                    rationale: conflict.description.clone(),
                    implementation: format!("Keep one of: {}", conflict.rules.join(" | ")),
                    product: None,
                },
            };
            enhancements.push(enhancement);
        }

        enhancements
    }

    /// Products in `detected` that no rule file covers
    pub fn uncovered_products(&self, analysis: &RuleAnalysisResult, detected: &[Product]) -> Vec<Product> {
        let mut seen = BTreeSet::new();
        detected
            .iter()
            .copied()
            .filter(|p| !analysis.covers(*p) && seen.insert(*p))
            .collect()
    }

    /// One `add` enhancement per detected product lacking rule coverage
    pub fn coverage_enhancements(
        &self,
        analysis: &RuleAnalysisResult,
        detected: &[Product],
    ) -> Vec<RuleEnhancement> {
        self.uncovered_products(analysis, detected)
            .into_iter()
            .map(|product| RuleEnhancement {
                enhancement_type: EnhancementType::Add,
                priority: Priority::Medium,
                suggestion: format!("Add {} rules", product.display_name()),
                rationale: format!(
                    "{} was detected but no rule file mentions it",
                    product.display_name()
                ),
                implementation: product
                    .rule_templates()
                    .iter()
                    .map(|t| format!("- {}", t))
                    .collect::<Vec<_>>()
                    .join("\n"),
                product: Some(product),
            })
            .collect()
    }

    /// Proposal computed from an analysis; the current target content comes
    /// from the analysis when the target was among the files read
    pub fn propose_from_analysis(
        &self,
        analysis: &RuleAnalysisResult,
        detected: &[Product],
    ) -> RuleProposal {
        let target = &self.config.target_file;
        let current = analysis.rule_file(target).map(|r| r.content.as_str());
        let uncovered = self.uncovered_products(analysis, detected);
        build_proposal(target, current, &analysis.existing_rules, &uncovered)
    }

    /// Analyze a project and build the proposal for its target rule file
    pub async fn propose(
        &self,
        project_path: &Path,
        inline_rules: &[String],
        detected: &[Product],
    ) -> Result<(RuleAnalysisResult, RuleProposal)> {
        let analysis = self.analyze(Some(project_path), inline_rules).await?;
        let target_path = self.target_path(project_path)?;
        let current = read_optional(&target_path).await?;
        let uncovered = self.uncovered_products(&analysis, detected);
        let proposal = build_proposal(
            &self.config.target_file,
            current.as_deref(),
            &analysis.existing_rules,
            &uncovered,
        );
        Ok((analysis, proposal))
    }

    /// Write a proposal. Dry runs only verify; writes go through a temp
    /// file and rename, and only if the target still has the fingerprint
    /// the proposal was computed against.
    pub async fn apply_proposal(
        &self,
        project_path: &Path,
        proposal: &RuleProposal,
        dry_run: bool,
    ) -> Result<ApplyOutcome> {
        ensure_directory(project_path).await?;
        if proposal.target_file != self.config.target_file {
            return Err(ContextError::InvalidInput(format!(
                "proposal targets {}, expected {}",
                proposal.target_file, self.config.target_file
            )));
        }
        let target_path = self.target_path(project_path)?;

        let current = read_optional(&target_path).await?.unwrap_or_default();
        if fingerprint(&current) != proposal.original_fingerprint {
            return Err(ContextError::StaleProposal(format!(
                "{} changed since the proposal was computed",
                proposal.target_file
            )));
        }

        let outcome = ApplyOutcome {
            path: proposal.target_file.clone(),
            dry_run,
            written: !dry_run,
            bytes: proposal.proposed_content.len(),
        };
        if dry_run {
            return Ok(outcome);
        }

        if let Some(parent) = target_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file_name = target_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("rules");
        let temp_path = target_path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

        tokio::fs::write(&temp_path, proposal.proposed_content.as_bytes()).await?;
        if let Err(e) = tokio::fs::rename(&temp_path, &target_path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        info!(path = %target_path.display(), bytes = outcome.bytes, "Rule file written");
        Ok(outcome)
    }

    fn target_path(&self, root: &Path) -> Result<PathBuf> {
        let relative = Path::new(&self.config.target_file);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(ContextError::Configuration(format!(
                "rules.target_file must be a relative path inside the project: {}",
                self.config.target_file
            )));
        }
        Ok(root.join(relative))
    }
}

async fn ensure_directory(path: &Path) -> Result<()> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(ContextError::InvalidInput(format!(
            "project path {} is not a directory",
            path.display()
        ))),
        Err(e) => Err(ContextError::InvalidInput(format!(
            "project path {} is not accessible: {}",
            path.display(),
            e
        ))),
    }
}

async fn read_optional(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
