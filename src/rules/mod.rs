//! Rule intelligence: editor rule discovery, conflicts, enhancements and proposals

pub mod conflicts;
pub mod models;
pub mod parser;
pub mod proposal;
pub mod service;

pub use conflicts::{detect_conflicts, find_contradictions, find_duplicates};
pub use models::{
    ApplyOutcome, ConflictKind, DiffOp, DiffTag, EnhancementType, IdeRule, Priority,
    RuleAnalysisResult, RuleConflict, RuleEnhancement, RuleFormat, RuleLocation, RuleProposal,
    SkippedFile,
};
pub use parser::{is_text_rule_location, RULE_LOCATIONS};
pub use proposal::{apply_diff, build_proposal, diff_lines, fingerprint, merge_rules};
pub use service::RuleIntelligenceService;
