//! Domain lexicon shared by prompt analysis and rule intelligence
//!
//! Terms are matched as whole-word sequences on normalized text: lowercase,
//! every non-alphanumeric character replaced by a space, whitespace collapsed.

use once_cell::sync::Lazy;
use std::collections::BTreeSet;

use super::catalog::Product;

/// Terms that mark the product family as a whole
const FAMILY_TERMS: &[&str] = &["optimizely", "episerver", "dxp"];

/// Product keyword table, in product declaration order
const PRODUCT_TERMS: &[(Product, &[&str])] = &[
    (
        Product::ConfiguredCommerce,
        &[
            "configured commerce",
            "insitecommerce",
            "insite",
            "spire",
            "handler chain",
            "pricing handler",
            "pricing service",
            "b2b commerce",
        ],
    ),
    (
        Product::CommerceConnect,
        &[
            "commerce connect",
            "customized commerce",
            "episerver commerce",
            "mediachase",
            "order group",
            "iorderrepository",
            "promotion engine",
            "catalog content",
        ],
    ),
    (
        Product::CmsPaas,
        &[
            "cms 12",
            "cms 11",
            "episerver cms",
            "optimizely cms",
            "page type",
            "block type",
            "content area",
            "icontentloader",
            "icontentrepository",
            "scheduled job",
            "initialization module",
        ],
    ),
    (
        Product::CmsSaas,
        &[
            "saas cms",
            "cms saas",
            "optimizely graph",
            "content graph",
            "visual builder",
            "headless cms",
        ],
    ),
    (
        Product::Experimentation,
        &[
            "feature experimentation",
            "web experimentation",
            "feature flag",
            "feature flags",
            "a/b test",
            "experiment",
            "variation",
            "rollout",
            "decide api",
        ],
    ),
    (
        Product::DataPlatform,
        &[
            "data platform",
            "odp",
            "real-time segments",
            "customer data platform",
            "audience sync",
        ],
    ),
];

/// Shared lexicon instance
pub static LEXICON: Lazy<Lexicon> = Lazy::new(Lexicon::new);

/// Normalize text for term matching
pub fn normalize(text: &str) -> String {
    let mapped: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase and collapse whitespace, keeping punctuation
pub fn fold_whitespace(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone)]
struct Term {
    raw: &'static str,
    words: Vec<String>,
    product: Option<Product>,
}

/// One lexicon term found in a text
#[derive(Debug, Clone, PartialEq)]
pub struct TermMatch {
    pub term: &'static str,
    /// `None` for family-wide terms
    pub product: Option<Product>,
    /// Index of the first word of the first occurrence
    pub position: usize,
    /// Word indices covered by every occurrence
    pub covered: Vec<usize>,
}

/// Result of scanning one text against the lexicon
#[derive(Debug, Clone, Default)]
pub struct LexiconScan {
    pub word_count: usize,
    /// Matches ordered by first occurrence, ties by lexicon order
    pub matches: Vec<TermMatch>,
}

impl LexiconScan {
    pub fn has_family_term(&self) -> bool {
        self.matches.iter().any(|m| m.product.is_none())
    }

    /// Distinct words of the text covered by any matched term
    pub fn covered_words(&self) -> usize {
        self.matches
            .iter()
            .flat_map(|m| m.covered.iter().copied())
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Number of distinct product terms matched for `product`
    pub fn product_matches(&self, product: Product) -> usize {
        self.matches
            .iter()
            .filter(|m| m.product == Some(product))
            .count()
    }

    pub fn product_term_count(&self) -> usize {
        self.matches.iter().filter(|m| m.product.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

/// Data-driven table of domain terms
#[derive(Debug)]
pub struct Lexicon {
    terms: Vec<Term>,
}

impl Lexicon {
    fn new() -> Self {
        let family = FAMILY_TERMS.iter().map(|raw| Term {
            raw: *raw,
            words: split_words(raw),
            product: None,
        });
        let products = PRODUCT_TERMS.iter().flat_map(|(product, terms)| {
            terms.iter().map(move |raw| Term {
                raw: *raw,
                words: split_words(raw),
                product: Some(*product),
            })
        });

        Self {
            terms: family.chain(products).collect(),
        }
    }

    /// Scan text for every lexicon term
    pub fn scan(&self, text: &str) -> LexiconScan {
        let normalized = normalize(text);
        let words: Vec<&str> = if normalized.is_empty() {
            Vec::new()
        } else {
            normalized.split(' ').collect()
        };

        let mut matches = Vec::new();
        for term in &self.terms {
            let width = term.words.len();
            if width == 0 || width > words.len() {
                continue;
            }

            let mut first = None;
            let mut covered = Vec::new();
            for start in 0..=(words.len() - width) {
                let window = &words[start..start + width];
                if window.iter().zip(&term.words).all(|(w, t)| *w == t.as_str()) {
                    first.get_or_insert(start);
                    covered.extend(start..start + width);
                }
            }

            if let Some(position) = first {
                matches.push(TermMatch {
                    term: term.raw,
                    product: term.product,
                    position,
                    covered,
                });
            }
        }

        // Stable: equal positions keep lexicon order
        matches.sort_by_key(|m| m.position);

        LexiconScan {
            word_count: words.len(),
            matches,
        }
    }

    /// Terms registered for a product
    pub fn terms_for(&self, product: Product) -> impl Iterator<Item = &'static str> + '_ {
        self.terms
            .iter()
            .filter(move |t| t.product == Some(product))
            .map(|t| t.raw)
    }
}

fn split_words(term: &str) -> Vec<String> {
    normalize(term).split(' ').filter(|w| !w.is_empty()).map(String::from).collect()
}
