//! HTTP surface for context curation and rule intelligence

pub mod handlers;
pub mod models;
pub mod routes;

pub use handlers::AppState;
pub use models::{ApiError, ErrorDetail, RuleAnalysisRequest, RuleProposalRequest, RuleProposalResponse};
pub use routes::build_router;
