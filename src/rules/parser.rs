//! Rule file locations and directive extraction

use indexmap::IndexSet;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::models::RuleFormat;
use crate::products::{Lexicon, Product};

/// Known rule file locations, relative to the project root
pub const RULE_LOCATIONS: &[(&str, RuleFormat)] = &[
    (".cursorrules", RuleFormat::Text),
    (".windsurfrules", RuleFormat::Text),
    (".clinerules", RuleFormat::Text),
    (".github/copilot-instructions.md", RuleFormat::Text),
    ("CLAUDE.md", RuleFormat::Text),
    (".cursor/rules.json", RuleFormat::Json),
    (".vscode/settings.json", RuleFormat::Json),
];

/// Whether `path` is a known plain-text rule location
pub fn is_text_rule_location(path: &str) -> bool {
    RULE_LOCATIONS
        .iter()
        .any(|(location, format)| *location == path && *format == RuleFormat::Text)
}

const COMMENT_PREFIXES: &[&str] = &["#", "//", "<!--", "---"];

static LIST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[-*+]|\d+[.)])\s+").expect("valid regex"));

/// A directive and its 1-based source line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub line: usize,
    pub text: String,
}

/// Non-empty, non-comment lines with list markers stripped
pub fn extract_text_directives(content: &str) -> Vec<Directive> {
    content
        .lines()
        .enumerate()
        .filter_map(|(index, raw)| {
            let trimmed = raw.trim();
            if trimmed.is_empty() || COMMENT_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
                return None;
            }
            let text = LIST_MARKER.replace(trimmed, "").trim().to_string();
            if text.is_empty() {
                None
            } else {
                Some(Directive {
                    line: index + 1,
                    text,
                })
            }
        })
        .collect()
}

/// String values under directive-bearing keys, collected recursively
pub fn extract_json_directives(content: &str) -> Result<Vec<Directive>, serde_json::Error> {
    let value: Value = serde_json::from_str(content)?;
    let mut texts = Vec::new();
    walk_json(&value, &mut texts);

    Ok(texts
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .enumerate()
        .map(|(index, text)| Directive {
            line: index + 1,
            text,
        })
        .collect())
}

fn is_directive_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    matches!(key.as_str(), "rules" | "instructions" | "guidelines" | "text")
        || key.ends_with("instructions")
}

fn walk_json(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if is_directive_key(key) {
                    collect_strings(child, out);
                } else {
                    walk_json(child, out);
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| walk_json(item, out)),
        _ => {}
    }
}

fn collect_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(text) => out.extend(text.lines().map(String::from)),
        Value::Array(items) => items.iter().for_each(|item| collect_strings(item, out)),
        Value::Object(_) => walk_json(value, out),
        _ => {}
    }
}

/// Domain signal of a set of directives
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DomainScan {
    pub terms: Vec<String>,
    pub products: Vec<Product>,
    pub relevance: f64,
}

/// Fraction of directives mentioning a domain term, plus the terms found
pub fn scan_directives(lexicon: &Lexicon, directives: &[Directive]) -> DomainScan {
    if directives.is_empty() {
        return DomainScan::default();
    }

    let mut terms = IndexSet::new();
    let mut products = IndexSet::new();
    let mut domain_lines = 0usize;

    for directive in directives {
        let scan = lexicon.scan(&directive.text);
        if scan.is_empty() {
            continue;
        }
        domain_lines += 1;
        for found in scan.matches {
            terms.insert(found.term.to_string());
            if let Some(product) = found.product {
                products.insert(product);
            }
        }
    }

    let mut products: Vec<Product> = products.into_iter().collect();
    products.sort();

    DomainScan {
        terms: terms.into_iter().collect(),
        products,
        relevance: domain_lines as f64 / directives.len() as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::products::LEXICON;

    #[test]
    fn test_text_directives_skip_comments_and_markers() {
        let content = "# Project rules\n\n- Use Optimizely CMS page types\n// note\n<!-- hidden -->\n---\n2. Prefer async APIs\n  * keep it short  \n";
        let directives = extract_text_directives(content);
        let texts: Vec<&str> = directives.iter().map(|d| d.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["Use Optimizely CMS page types", "Prefer async APIs", "keep it short"]
        );
        assert_eq!(directives[0].line, 3);
        assert_eq!(directives[1].line, 7);
    }

    #[test]
    fn test_json_directives() {
        let content = r#"{
            "editor.tabSize": 4,
            "github.copilot.chat.codeGeneration.instructions": [
                { "text": "Use IContentLoader for reads" },
                { "file": "docs/style.md" }
            ],
            "nested": { "rules": ["Always use semicolons", 42] }
        }"#;
        let directives = extract_json_directives(content).unwrap();
        let texts: Vec<&str> = directives.iter().map(|d| d.text.as_str()).collect();
        assert_eq!(texts, vec!["Use IContentLoader for reads", "Always use semicolons"]);
        assert_eq!(directives[1].line, 2);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(extract_json_directives("{ not json").is_err());
    }

    #[test]
    fn test_scan_directives_relevance() {
        let directives = extract_text_directives(
            "Use Configured Commerce handlers\nWrite unit tests\nQuery the content graph\nKeep functions small\n",
        );
        let scan = scan_directives(&LEXICON, &directives);
        assert_eq!(scan.relevance, 0.5);
        assert_eq!(scan.terms, vec!["configured commerce", "content graph"]);
        assert_eq!(scan.products, vec![Product::ConfiguredCommerce, Product::CmsSaas]);
    }

    #[test]
    fn test_text_rule_locations() {
        assert!(is_text_rule_location(".cursorrules"));
        assert!(!is_text_rule_location(".vscode/settings.json"));
        assert!(!is_text_rule_location("README.md"));
    }
}
