//! Context analysis: orchestration, curation and the documentation boundary

pub mod curator;
pub mod documentation;
pub mod engine;
pub mod models;

pub use curator::{curate, CurationInput};
pub use documentation::{
    provider_from_config, DocumentationItem, DocumentationProvider, HttpDocumentationProvider,
    StaticDocumentationProvider,
};
pub use engine::ContextAnalysisEngine;
pub use models::{
    CodeExample, ContextAnalysisRequest, ContextAnalysisResponse, CuratedResponse,
    DocumentationLink, SuggestedRules, NOT_RELEVANT_SUMMARY,
};
