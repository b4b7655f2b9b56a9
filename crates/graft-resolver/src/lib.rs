//! Dependency reasoning for graft
//!
//! This crate provides the version compatibility engine, the peer dependency
//! analyzer built on the registry metadata resolver, and the dependency
//! merger that combines template declarations.

pub mod merge;
pub mod peer;
pub mod semver;

// Re-export main types
pub use merge::{
    CompatibilityIssue, CompatibilityRule, DependencyMerger, MergeConflict, MergeResolution, MergeResult,
    MergeSummary, ResolutionSource, VersionSource,
};
pub use peer::{
    AnalysisPhase, AnalysisResult, AnalysisSummary, EdgeCaseReport, PeerDependencyAnalyzer, ProgressEvent,
    ProgressObserver, Recommendation, TracingObserver,
};
pub use semver::{
    analyze_compatibility, best_compatible_version, check_satisfies, resolve_conflict, satisfies,
    CompatibilityReport, StrategyOutcome, StrategyResolution,
};

use graft_core::error::GraftError;

/// Result type for resolver operations
pub type ResolverResult<T> = Result<T, GraftError>;
