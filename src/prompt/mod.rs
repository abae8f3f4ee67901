//! Prompt analysis: domain relevance, intent and product hints

pub mod analyzer;
pub mod models;

pub use analyzer::{classify_intent, PromptAnalyzer};
pub use models::{Intent, ProductHint, PromptAnalysisResult};
