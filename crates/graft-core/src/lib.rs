//! # graft-core
//!
//! Core types and utilities shared across all graft crates.
//!
//! This crate provides:
//! - `Version` and `VersionReq` with npm range semantics
//! - `PackageManifest`, `PackageRef` and template declaration types
//! - Peer conflict, resolution and diagnostic records
//! - `GraftError` for unified error handling
//! - Package-name validation
//!
//! ## Architecture
//!
//! - `types`: Core data types
//! - `error`: Error types and result aliases
//! - `utils`: Validation helpers

pub mod error;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use error::{GraftError, GraftResult};
pub use types::{
    Confidence, ConflictKind, DependencyKind, DependencyMap, DependencySet, Diagnostic,
    DiagnosticCategory, FallbackReason, MergeStrategy, PackageManifest, PackageRef, PeerConflict,
    PeerResolution, RangeKind, ResolutionAction, Severity, TemplatePackages, Version, VersionError,
    VersionReq,
};
