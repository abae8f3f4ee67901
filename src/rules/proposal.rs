//! Normalized rule-file proposals and line diffs
//!
//! The proposal is computed without touching the filesystem, so it can be
//! previewed (dry run) before anything is written.

use indexmap::IndexSet;
use sha2::{Digest, Sha256};
use similar::{ChangeTag, TextDiff};

use super::models::{DiffOp, DiffTag, IdeRule, RuleProposal};
use crate::error::{ContextError, Result};
use crate::products::{fold_whitespace, Product};

const HEADER: &str = "# Optimizely development rules\n# Maintained with context-curator. Edit freely; comment lines are ignored.\n";

/// SHA-256 hex digest of rule file content
pub fn fingerprint(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Merged content: header, deduplicated existing directives, then guidance
/// for products no rule covers yet
pub fn merge_rules(existing: &[IdeRule], uncovered: &[Product]) -> String {
    let mut seen = IndexSet::new();
    let mut directives = Vec::new();
    for text in existing.iter().flat_map(|file| file.rules.iter()) {
        if seen.insert(fold_whitespace(text)) {
            directives.push(text.as_str());
        }
    }

    let mut content = String::from(HEADER);
    if !directives.is_empty() {
        content.push('\n');
        for directive in &directives {
            content.push_str("- ");
            content.push_str(directive);
            content.push('\n');
        }
    }

    for product in uncovered {
        let templates: Vec<&str> = product
            .rule_templates()
            .iter()
            .copied()
            .filter(|t| !seen.contains(&fold_whitespace(t)))
            .collect();
        if templates.is_empty() {
            continue;
        }
        content.push_str(&format!("\n## {}\n", product.display_name()));
        for template in templates {
            content.push_str("- ");
            content.push_str(template);
            content.push('\n');
        }
    }

    content
}

/// Line diff from `original` to `proposed`
pub fn diff_lines(original: &str, proposed: &str) -> Vec<DiffOp> {
    TextDiff::from_lines(original, proposed)
        .iter_all_changes()
        .map(|change| DiffOp {
            tag: match change.tag() {
                ChangeTag::Equal => DiffTag::Equal,
                ChangeTag::Insert => DiffTag::Insert,
                ChangeTag::Delete => DiffTag::Delete,
            },
            text: change.value().to_string(),
        })
        .collect()
}

/// Unified diff text for previews
pub fn unified_diff(original: &str, proposed: &str, target: &str) -> String {
    TextDiff::from_lines(original, proposed)
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{}", target), &format!("b/{}", target))
        .to_string()
}

/// Replay `ops` against `original`. Fails if the ops were not computed
/// from this exact content.
pub fn apply_diff(original: &str, ops: &[DiffOp]) -> Result<String> {
    let mut lines = original.split_inclusive('\n');
    let mut output = String::with_capacity(original.len());

    for (index, op) in ops.iter().enumerate() {
        match op.tag {
            DiffTag::Insert => output.push_str(&op.text),
            DiffTag::Equal | DiffTag::Delete => {
                let line = lines.next().ok_or_else(|| {
                    ContextError::InvalidInput(format!(
                        "diff operation {} runs past the end of the original",
                        index
                    ))
                })?;
                if line != op.text {
                    return Err(ContextError::InvalidInput(format!(
                        "diff operation {} does not match the original content",
                        index
                    )));
                }
                if op.tag == DiffTag::Equal {
                    output.push_str(line);
                }
            }
        }
    }

    if lines.next().is_some() {
        return Err(ContextError::InvalidInput(
            "diff does not cover the whole original".to_string(),
        ));
    }
    Ok(output)
}

/// Build a proposal for `target_file` whose current content is `original`
pub fn build_proposal(
    target_file: &str,
    original: Option<&str>,
    existing: &[IdeRule],
    uncovered: &[Product],
) -> RuleProposal {
    let current = original.unwrap_or_default();
    let proposed_content = merge_rules(existing, uncovered);

    RuleProposal {
        target_file: target_file.to_string(),
        diff: diff_lines(current, &proposed_content),
        unified_diff: unified_diff(current, &proposed_content, target_file),
        original_fingerprint: fingerprint(current),
        original_exists: original.is_some(),
        changed: current != proposed_content,
        proposed_content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::models::RuleFormat;

    fn rule_file(path: &str, rules: &[&str]) -> IdeRule {
        IdeRule {
            path: path.to_string(),
            format: RuleFormat::Text,
            content: String::new(),
            rules: rules.iter().map(|r| r.to_string()).collect(),
            rule_lines: (1..=rules.len()).collect(),
            product_terms: Vec::new(),
            products: Vec::new(),
            relevance: 0.0,
            last_modified: None,
            size: 0,
        }
    }

    #[test]
    fn test_merge_deduplicates_and_adds_guidance() {
        let existing = vec![
            rule_file(".cursorrules", &["Write tests", "write  TESTS"]),
            rule_file("CLAUDE.md", &["Keep controllers thin"]),
        ];
        let content = merge_rules(&existing, &[Product::Experimentation]);

        assert!(content.starts_with(HEADER));
        assert!(content.contains("\n- Write tests\n- Keep controllers thin\n"));
        assert!(!content.contains("write  TESTS"));
        assert!(content.contains("\n## Feature Experimentation\n"));
        assert!(content.ends_with('\n'));
    }

    #[test]
    fn test_diff_round_trip() {
        let original = "# old\n- Write tests\nno trailing newline";
        let proposed = merge_rules(&[rule_file(".cursorrules", &["Write tests"])], &[Product::CmsPaas]);
        let ops = diff_lines(original, &proposed);
        assert_eq!(apply_diff(original, &ops).unwrap(), proposed);
    }

    #[test]
    fn test_diff_from_empty_file() {
        let proposed = merge_rules(&[], &[Product::ConfiguredCommerce]);
        let ops = diff_lines("", &proposed);
        assert!(ops.iter().all(|op| op.tag == DiffTag::Insert));
        assert_eq!(apply_diff("", &ops).unwrap(), proposed);
    }

    #[test]
    fn test_apply_diff_rejects_other_original() {
        let ops = diff_lines("a\nb\n", "a\nc\n");
        assert!(apply_diff("a\nx\n", &ops).is_err());
        assert!(apply_diff("a\nb\nextra\n", &ops).is_err());
    }

    #[test]
    fn test_build_proposal() {
        let proposal = build_proposal(".cursorrules", None, &[], &[Product::CmsSaas]);
        assert!(!proposal.original_exists);
        assert!(proposal.changed);
        assert_eq!(proposal.original_fingerprint, fingerprint(""));
        assert!(proposal.unified_diff.contains("+++ b/.cursorrules"));
    }
}
