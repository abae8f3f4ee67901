//! Product family catalog and the shared domain lexicon

pub mod catalog;
pub mod lexicon;

pub use catalog::Product;
pub use lexicon::{fold_whitespace, normalize, Lexicon, LexiconScan, TermMatch, LEXICON};
