//! Curation of the final response
//!
//! Everything here is a pure function of its inputs, so identical pipeline
//! state always curates to the identical response.

use once_cell::sync::Lazy;
use regex::Regex;

use super::documentation::DocumentationItem;
use super::models::{
    CodeExample, CuratedResponse, DocumentationLink, SuggestedRules, MAX_CODE_EXAMPLES,
    MAX_DOCUMENTATION_LINKS,
};
use crate::detection::{DetectionContext, ProductDetectionResult};
use crate::products::Product;
use crate::prompt::{Intent, PromptAnalysisResult};
use crate::rules::Priority;

/// Shortest code block, in characters, worth showing
const MIN_CODE_EXAMPLE_CHARS: usize = 10;
/// Rule enhancement hints appended to the actionable steps
const MAX_RULE_STEPS: usize = 3;

const GENERIC_PRACTICES: &[&str] = &[
    "Keep customizations in your own project code and out of platform packages",
    "Upgrade Optimizely packages together and read the breaking-change notes for each release",
    "Cover custom integration points with automated tests before upgrading",
];

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```([^\n`]*)\r?\n(.*?)```").expect("valid code fence regex")
});

/// Signals gathered by the pipeline for one request
pub struct CurationInput<'a> {
    pub analysis: &'a PromptAnalysisResult,
    pub detection: &'a ProductDetectionResult,
    pub rules: Option<SuggestedRules>,
    pub documentation: &'a [DocumentationItem],
}

pub fn curate(input: CurationInput<'_>) -> CuratedResponse {
    let products = input.detection.product_list();
    let rules = input.rules.as_ref();

    CuratedResponse {
        relevance: input.analysis.relevance,
        summary: summarize(input.analysis.intent, input.detection, rules),
        actionable_steps: actionable_steps(input.analysis.intent, &products, rules),
        code_examples: code_examples(input.documentation),
        documentation: documentation_links(input.documentation),
        best_practices: best_practices(&products, rules),
        product_context: products,
        suggested_rules: input.rules,
    }
}

fn join_names(products: &[Product]) -> String {
    let names: Vec<&str> = products.iter().map(Product::display_name).collect();
    match names.as_slice() {
        [] => "the Optimizely platform".to_string(),
        [only] => only.to_string(),
        [rest @ .., last] => format!("{} and {}", rest.join(", "), last),
    }
}

fn percent(value: f64) -> u32 {
    (value.clamp(0.0, 1.0) * 100.0).round() as u32
}

pub fn summarize(
    intent: Intent,
    detection: &ProductDetectionResult,
    rules: Option<&SuggestedRules>,
) -> String {
    let names = join_names(&detection.product_list());
    let mut summary = match intent {
        Intent::CodeHelp => format!("Implementation guidance for {}.", names),
        Intent::Documentation => format!("Reference material for {}.", names),
        Intent::Troubleshooting => format!("Troubleshooting guidance for {}.", names),
        Intent::BestPractices => format!("Recommended practices for {}.", names),
        Intent::Configuration => format!("Configuration guidance for {}.", names),
        Intent::Unknown => format!("Context for {}.", names),
    };

    if detection.is_empty() {
        summary.push_str(" No specific product could be identified, so the guidance is general.");
    } else {
        let source = match detection.context {
            DetectionContext::Ide => "from project files",
            DetectionContext::Prompt => "from the prompt",
        };
        summary.push_str(&format!(
            " Detected {} with {}% confidence.",
            source,
            percent(detection.confidence)
        ));
    }

    if let Some(rules) = rules {
        if rules.rule_files.is_empty() {
            summary.push_str(" No editor rule files were found.");
        } else {
            summary.push_str(&format!(
                " Your editor rules are {}% Optimizely-specific",
                percent(rules.domain_relevance)
            ));
            match rules.conflicts.len() {
                0 => summary.push('.'),
                1 => summary.push_str(" and contain 1 conflict."),
                n => summary.push_str(&format!(" and contain {} conflicts.", n)),
            }
        }
    }

    summary
}

pub fn actionable_steps(
    intent: Intent,
    products: &[Product],
    rules: Option<&SuggestedRules>,
) -> Vec<String> {
    let primary = products
        .first()
        .map_or("Optimizely", |p| p.display_name());

    let mut steps: Vec<String> = match intent {
        Intent::CodeHelp => vec![
            format!("Identify the {} extension point that fits the change", primary),
            "Implement the change in your own project code rather than patching platform packages".to_string(),
            "Add unit tests around the new behavior".to_string(),
            "Verify the change locally before deploying".to_string(),
        ],
        Intent::Troubleshooting => vec![
            "Reproduce the issue and capture the full error and stack trace".to_string(),
            format!("Check the application logs and {} diagnostics", primary),
            "Compare your configuration with the documented defaults".to_string(),
            "Isolate recent code or package changes that could have caused the problem".to_string(),
        ],
        Intent::Configuration => vec![
            format!("Locate the {} settings in appsettings.json or environment variables", primary),
            "Apply the change in a non-production environment first".to_string(),
            "Record the setting in your deployment configuration".to_string(),
        ],
        Intent::BestPractices => vec![
            "Compare your implementation with the best practices below".to_string(),
            "Prioritize changes that affect upgrade safety and performance".to_string(),
        ],
        Intent::Documentation => vec![
            "Start with the documentation links below".to_string(),
            "Use the code examples as a starting point".to_string(),
        ],
        Intent::Unknown => vec![
            format!("Clarify which {} feature you are working with", primary),
            "Review the documentation links below".to_string(),
        ],
    };

    if let Some(rules) = rules {
        steps.extend(
            rules
                .enhancements
                .iter()
                .filter(|e| e.priority <= Priority::Medium)
                .take(MAX_RULE_STEPS)
                .map(|e| format!("Update your editor rules: {}", e.suggestion)),
        );
    }

    steps
}

fn fence_language(info: &str) -> Option<String> {
    info.split_whitespace().next().map(str::to_string)
}

/// Fenced code blocks from documentation, best first, ties in input order
pub fn code_examples(items: &[DocumentationItem]) -> Vec<CodeExample> {
    let mut examples: Vec<CodeExample> = items
        .iter()
        .flat_map(|item| {
            CODE_FENCE.captures_iter(&item.content).filter_map(move |caps| {
                let code = caps.get(2)?.as_str().trim_end();
                if code.trim().chars().count() < MIN_CODE_EXAMPLE_CHARS {
                    return None;
                }
                Some(CodeExample {
                    language: caps.get(1).and_then(|m| fence_language(m.as_str())),
                    code: code.to_string(),
                    title: item.title.clone(),
                    source: item.source.clone(),
                    relevance: item.relevance(),
                })
            })
        })
        .collect();

    examples.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
    examples.truncate(MAX_CODE_EXAMPLES);
    examples
}

/// Linkable documentation entries, best first, ties in input order
pub fn documentation_links(items: &[DocumentationItem]) -> Vec<DocumentationLink> {
    let mut links: Vec<DocumentationLink> = items
        .iter()
        .filter(|item| item.is_linkable())
        .map(|item| DocumentationLink {
            title: item.title.clone(),
            url: item.source.clone(),
            relevance: item.relevance(),
            last_updated: item.last_updated.clone(),
        })
        .collect();

    links.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
    links.truncate(MAX_DOCUMENTATION_LINKS);
    links
}

/// Rule suggestions, then product guidance, then generic guidance
pub fn best_practices(products: &[Product], rules: Option<&SuggestedRules>) -> Vec<String> {
    let rule_suggestions = rules
        .into_iter()
        .flat_map(|r| r.enhancements.iter())
        .map(|e| e.suggestion.clone());
    let product_guidance = products
        .iter()
        .flat_map(|p| p.best_practices().iter())
        .map(|s| s.to_string());
    let generic = GENERIC_PRACTICES.iter().map(|s| s.to_string());

    rule_suggestions.chain(product_guidance).chain(generic).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::DetectedProduct;
    use crate::rules::{build_proposal, EnhancementType, RuleEnhancement};
    use indexmap::IndexSet;

    fn doc(title: &str, source: &str, score: Option<f64>, content: &str) -> DocumentationItem {
        DocumentationItem {
            content: content.to_string(),
            source: source.to_string(),
            title: title.to_string(),
            last_updated: None,
            relevance_score: score,
        }
    }

    fn analysis(intent: Intent) -> PromptAnalysisResult {
        PromptAnalysisResult {
            relevance: 0.6,
            keywords: IndexSet::new(),
            intent,
            product_hints: Vec::new(),
            confidence: 0.6,
        }
    }

    fn detection(products: &[(Product, f64)]) -> ProductDetectionResult {
        let mut result = ProductDetectionResult::empty(DetectionContext::Ide);
        result.products = products
            .iter()
            .map(|(product, confidence)| DetectedProduct {
                product: *product,
                confidence: *confidence,
                low_confidence: *confidence < 0.7,
            })
            .collect();
        result.confidence = products.first().map_or(0.0, |(_, c)| *c);
        result
    }

    fn enhancement(priority: Priority, suggestion: &str) -> RuleEnhancement {
        RuleEnhancement {
            enhancement_type: EnhancementType::Add,
            priority,
            suggestion: suggestion.to_string(),
            rationale: String::new(),
            implementation: String::new(),
            product: None,
        }
    }

    fn suggested(files: &[&str], enhancements: Vec<RuleEnhancement>) -> SuggestedRules {
        SuggestedRules {
            rule_files: files.iter().map(|f| f.to_string()).collect(),
            domain_relevance: 0.25,
            enhancements,
            conflicts: Vec::new(),
            proposal: build_proposal(".cursorrules", None, &[], &[]),
        }
    }

    #[test]
    fn test_code_examples_filter_sort_and_cap() {
        let items = vec![
            doc("a", "https://a", Some(0.2), "```csharp\nvar handler = new PricingHandler();\n```\n```\nshort\n```"),
            doc("b", "https://b", Some(0.9), "```js\nconst client = optimizely.createInstance();\n```"),
            doc("c", "", None, "```\nConsole.WriteLine(\"ok\");\n```"),
            doc("d", "https://d", Some(0.2), "```ts\nexport const a = 1;\n```\n```ts\nexport const b = 2;\n```\n```ts\nexport const c = 3;\n```"),
        ];
        let examples = code_examples(&items);

        assert_eq!(examples.len(), MAX_CODE_EXAMPLES);
        assert_eq!(examples[0].title, "b");
        assert_eq!(examples[0].language.as_deref(), Some("js"));
        // equal scores keep input order
        assert_eq!(examples[1].title, "a");
        assert_eq!(examples[2].code, "export const a = 1;");
        assert_eq!(examples[4].code, "export const c = 3;");
        assert!(examples.iter().all(|e| e.code != "short"));
    }

    #[test]
    fn test_documentation_requires_source_and_title() {
        let items = vec![
            doc("First", "https://docs/1", Some(0.5), ""),
            doc("", "https://docs/2", Some(0.99), ""),
            doc("Third", "https://docs/3", Some(0.7), ""),
            doc("Fourth", "https://docs/4", Some(0.5), ""),
            doc("Fifth", "https://docs/5", Some(0.1), ""),
        ];
        let links = documentation_links(&items);
        let titles: Vec<&str> = links.iter().map(|l| l.title.as_str()).collect();
        assert_eq!(titles, vec!["Third", "First", "Fourth"]);
    }

    #[test]
    fn test_best_practices_order() {
        let rules = suggested(&[".cursorrules"], vec![enhancement(Priority::Low, "Remove duplicate rule")]);
        let practices = best_practices(&[Product::DataPlatform], Some(&rules));

        assert_eq!(practices[0], "Remove duplicate rule");
        assert_eq!(practices[1], Product::DataPlatform.best_practices()[0]);
        assert_eq!(practices.last().map(String::as_str), GENERIC_PRACTICES.last().copied());
        assert_eq!(
            practices.len(),
            1 + Product::DataPlatform.best_practices().len() + GENERIC_PRACTICES.len()
        );
    }

    #[test]
    fn test_steps_include_rule_hints() {
        let rules = suggested(
            &[".cursorrules"],
            vec![
                enhancement(Priority::Low, "low"),
                enhancement(Priority::High, "Add Configured Commerce rules"),
            ],
        );
        let steps = actionable_steps(Intent::CodeHelp, &[Product::ConfiguredCommerce], Some(&rules));
        assert!(steps[0].contains("Configured Commerce"));
        assert_eq!(
            steps.last().map(String::as_str),
            Some("Update your editor rules: Add Configured Commerce rules")
        );
        assert!(!steps.iter().any(|s| s.ends_with(": low")));
    }

    #[test]
    fn test_summary_wording() {
        let detection = detection(&[(Product::CmsPaas, 0.8), (Product::ConfiguredCommerce, 0.4)]);
        let rules = suggested(&[".cursorrules"], Vec::new());
        let summary = summarize(Intent::Troubleshooting, &detection, Some(&rules));
        assert_eq!(
            summary,
            "Troubleshooting guidance for CMS (PaaS) and Configured Commerce. \
             Detected from project files with 80% confidence. \
             Your editor rules are 25% Optimizely-specific."
        );

        let empty = ProductDetectionResult::empty(DetectionContext::Prompt);
        let summary = summarize(Intent::Unknown, &empty, Some(&suggested(&[], Vec::new())));
        assert!(summary.starts_with("Context for the Optimizely platform."));
        assert!(summary.ends_with("No editor rule files were found."));
    }

    #[test]
    fn test_curate_is_deterministic() {
        let analysis = analysis(Intent::CodeHelp);
        let detection = detection(&[(Product::ConfiguredCommerce, 0.9)]);
        let docs = vec![doc("Handlers", "https://docs/h", Some(0.8), "```csharp\npublic class MyHandler {}\n```")];

        let first = curate(CurationInput {
            analysis: &analysis,
            detection: &detection,
            rules: None,
            documentation: &docs,
        });
        let second = curate(CurationInput {
            analysis: &analysis,
            detection: &detection,
            rules: None,
            documentation: &docs,
        });

        assert_eq!(first, second);
        assert_eq!(first.product_context, vec![Product::ConfiguredCommerce]);
        assert_eq!(first.code_examples.len(), 1);
        assert!(first.suggested_rules.is_none());
    }
}
