//! Duplicate and contradiction detection across rule files
//!
//! Duplicates compare case-folded, whitespace-collapsed text. Contradictions
//! come from a fixed table of mutually exclusive directive patterns; there is
//! no general semantic comparison.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use super::models::{ConflictKind, IdeRule, RuleConflict, RuleLocation};
use crate::products::fold_whitespace;

struct ContradictionPair {
    topic: &'static str,
    first: Regex,
    second: Regex,
}

const CONTRADICTION_TABLE: &[(&str, &str, &str)] = &[
    (
        "indentation",
        r"(?i)\b(?:use|indent with|prefer) tabs\b",
        r"(?i)\b(?:use|indent with|prefer) (?:\d+ )?spaces\b",
    ),
    ("quote style", r"(?i)\bsingle quotes\b", r"(?i)\bdouble quotes\b"),
    (
        "semicolons",
        r"(?i)\balways (?:use )?semicolons\b",
        r"(?i)\b(?:never use semicolons|no semicolons|omit semicolons)\b",
    ),
    (
        "var usage",
        r"(?i)^(?:always )?(?:prefer|use) var\b",
        r"(?i)\b(?:avoid|never use|do not use|don't use) var\b",
    ),
    ("JSON serializer", r"(?i)\bnewtonsoft\b", r"(?i)\bsystem\.text\.json\b"),
    (
        "data access style",
        r"(?i)\b(?:use synchronous|prefer synchronous|sync(?:hronous)? data access)\b",
        r"(?i)\b(?:async(?:hronous)? only|only async|always (?:use )?async)\b",
    ),
];

static CONTRADICTIONS: Lazy<Vec<ContradictionPair>> = Lazy::new(|| {
    CONTRADICTION_TABLE
        .iter()
        .filter_map(|(topic, first, second)| {
            Some(ContradictionPair {
                topic: *topic,
                first: Regex::new(first).ok()?,
                second: Regex::new(second).ok()?,
            })
        })
        .collect()
});

fn locations(rules: &[IdeRule]) -> impl Iterator<Item = (&str, RuleLocation)> {
    rules.iter().flat_map(|file| {
        file.rules
            .iter()
            .zip(file.rule_lines.iter())
            .map(move |(text, line)| {
                (
                    text.as_str(),
                    RuleLocation {
                        path: file.path.clone(),
                        line: *line,
                    },
                )
            })
    })
}

/// One conflict per group of directives with identical normalized text
pub fn find_duplicates(rules: &[IdeRule]) -> Vec<RuleConflict> {
    let mut groups: IndexMap<String, (Vec<String>, Vec<RuleLocation>)> = IndexMap::new();
    for (text, location) in locations(rules) {
        let entry = groups.entry(fold_whitespace(text)).or_default();
        entry.0.push(text.to_string());
        entry.1.push(location);
    }

    groups
        .into_iter()
        .filter(|(_, (_, locations))| locations.len() > 1)
        .map(|(normalized, (texts, locations))| {
            let paths = locations
                .iter()
                .map(|l| format!("{}:{}", l.path, l.line))
                .collect::<Vec<_>>()
                .join(", ");
            RuleConflict {
                kind: ConflictKind::Duplicate,
                rules: texts,
                description: format!("\"{}\" appears {} times ({})", normalized, locations.len(), paths),
                locations,
            }
        })
        .collect()
}

/// One conflict per table entry whose two sides occur in different directives.
///
/// A directive matching both sides of an entry (e.g. "prefer double quotes
/// over single quotes") states one preference and takes part in neither.
pub fn find_contradictions(rules: &[IdeRule]) -> Vec<RuleConflict> {
    let all: Vec<(&str, RuleLocation)> = locations(rules).collect();
    let mut conflicts = Vec::new();

    for pair in CONTRADICTIONS.iter() {
        let mut first = Vec::new();
        let mut second = Vec::new();
        for directive in &all {
            match (pair.first.is_match(directive.0), pair.second.is_match(directive.0)) {
                (true, false) => first.push(directive),
                (false, true) => second.push(directive),
                _ => {}
            }
        }
        if first.is_empty() || second.is_empty() {
            continue;
        }

        let involved: Vec<&(&str, RuleLocation)> = first.into_iter().chain(second).collect();
        conflicts.push(RuleConflict {
            kind: ConflictKind::Contradiction,
            rules: involved.iter().map(|(text, _)| text.to_string()).collect(),
            locations: involved.iter().map(|(_, location)| location.clone()).collect(),
            description: format!("Rules disagree on {}", pair.topic),
        });
    }

    conflicts
}

/// Duplicates first, then contradictions
pub fn detect_conflicts(rules: &[IdeRule]) -> Vec<RuleConflict> {
    let mut conflicts = find_duplicates(rules);
    conflicts.extend(find_contradictions(rules));
    conflicts
}
