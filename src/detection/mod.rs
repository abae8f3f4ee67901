//! Product detection from project evidence or prompt hints

pub mod cache;
pub mod collectors;
pub mod engine;
pub mod models;

pub use cache::{CacheStats, DetectionCache, EntryState};
pub use collectors::{
    default_collectors, ConfigFileCollector, DependencyCollector, DirectoryCollector,
    EvidenceCollector, FilePatternCollector, ProjectSnapshot,
};
pub use engine::ProductDetector;
pub use models::{
    DetectedProduct, DetectionContext, DetectionEvidence, DetectionMethod, EvidenceType,
    ProductDetectionResult,
};
