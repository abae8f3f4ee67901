//! Prompt relevance, intent and product hint analysis
//!
//! Pure and deterministic: the same prompt always yields the same result.
//!
//! Relevance is a weighted blend of three signals:
//! - family term present (40%)
//! - distinct product terms matched, saturating at two (35%)
//! - keyword density, saturating at a quarter of the words (25%)

use indexmap::IndexSet;

use super::models::{Intent, ProductHint, PromptAnalysisResult};
use crate::error::{ContextError, Result};
use crate::products::{normalize, Lexicon, Product, LEXICON};

const FAMILY_WEIGHT: f64 = 0.40;
const PRODUCT_WEIGHT: f64 = 0.35;
const DENSITY_WEIGHT: f64 = 0.25;
const PRODUCT_TERM_SATURATION: f64 = 2.0;
const DENSITY_SATURATION: f64 = 4.0;

/// Intent keyword groups; the first group with a match wins
const INTENT_GROUPS: &[(Intent, &[&str])] = &[
    (
        Intent::Troubleshooting,
        &[
            "error", "errors", "exception", "not working", "fails", "failing", "failed",
            "broken", "bug", "crash", "debug", "troubleshoot", "issue", "fix",
        ],
    ),
    (
        Intent::Configuration,
        &[
            "configure", "configuration", "config", "setup", "set up", "install",
            "settings", "appsettings", "environment variable", "deploy", "deployment",
        ],
    ),
    (
        Intent::BestPractices,
        &[
            "best practice", "best practices", "recommended", "recommendation", "should i",
            "guideline", "guidelines", "optimize", "performance",
        ],
    ),
    (
        Intent::CodeHelp,
        &[
            "how do i", "how to", "how can i", "implement", "create", "add", "write",
            "code", "example", "extend", "custom", "override", "build",
        ],
    ),
    (
        Intent::Documentation,
        &[
            "documentation", "docs", "what is", "what are", "explain", "reference", "guide",
        ],
    ),
];

/// Analyzer for free-text prompts
#[derive(Debug, Clone)]
pub struct PromptAnalyzer {
    lexicon: &'static Lexicon,
    max_prompt_length: usize,
}

impl PromptAnalyzer {
    pub fn new(max_prompt_length: usize) -> Self {
        Self {
            lexicon: &LEXICON,
            max_prompt_length,
        }
    }

    /// Analyze a prompt. Fails only for empty or oversized input.
    pub fn analyze(&self, prompt: &str) -> Result<PromptAnalysisResult> {
        if prompt.trim().is_empty() {
            return Err(ContextError::InvalidInput(
                "prompt must not be empty".to_string(),
            ));
        }
        let length = prompt.chars().count();
        if length > self.max_prompt_length {
            return Err(ContextError::InvalidInput(format!(
                "prompt is {} characters, maximum is {}",
                length, self.max_prompt_length
            )));
        }

        let scan = self.lexicon.scan(prompt);

        let keywords: IndexSet<String> =
            scan.matches.iter().map(|m| m.term.to_string()).collect();

        let family = if scan.has_family_term() { 1.0 } else { 0.0 };
        let product_terms =
            (scan.product_term_count() as f64 / PRODUCT_TERM_SATURATION).min(1.0);
        let density = if scan.word_count == 0 {
            0.0
        } else {
            (DENSITY_SATURATION * scan.covered_words() as f64 / scan.word_count as f64).min(1.0)
        };
        let relevance = clamp_unit(
            FAMILY_WEIGHT * family + PRODUCT_WEIGHT * product_terms + DENSITY_WEIGHT * density,
        );

        let product_hints = rank_hints(
            Product::ALL
                .iter()
                .map(|p| (*p, scan.product_matches(*p)))
                .filter(|(_, count)| *count > 0)
                .collect(),
        );

        let total: usize = scan.product_term_count();
        let confidence = match product_hints.first() {
            Some(_) if total > 0 => {
                let top = scan.product_matches(product_hints[0].product);
                clamp_unit(relevance * top as f64 / total as f64)
            }
            _ => 0.0,
        };

        Ok(PromptAnalysisResult {
            relevance,
            keywords,
            intent: classify_intent(prompt),
            product_hints,
            confidence,
        })
    }
}

/// Order hints by match count (declaration order on ties) and scale strengths
fn rank_hints(mut counts: Vec<(Product, usize)>) -> Vec<ProductHint> {
    counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.ordinal().cmp(&b.0.ordinal())));
    let max = counts.first().map(|(_, c)| *c).unwrap_or(0);

    counts
        .into_iter()
        .map(|(product, count)| ProductHint {
            product,
            strength: if max == 0 { 0.0 } else { count as f64 / max as f64 },
        })
        .collect()
}

/// First intent group with a whole-word match wins
pub fn classify_intent(prompt: &str) -> Intent {
    let padded = format!(" {} ", normalize(prompt));
    INTENT_GROUPS
        .iter()
        .find(|(_, keywords)| {
            keywords
                .iter()
                .any(|k| padded.contains(&format!(" {} ", normalize(k))))
        })
        .map(|(intent, _)| *intent)
        .unwrap_or(Intent::Unknown)
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
