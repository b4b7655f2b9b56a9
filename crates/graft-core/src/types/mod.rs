//! Core data types for graft.
//!
//! This module provides the types shared by the registry, analyzer and merger:
//! - Version and range types with npm semantics
//! - Package manifests and declared dependency sets
//! - Peer conflicts, resolutions and recorded diagnostics

pub mod conflict;
pub mod dependency;
pub mod diagnostic;
pub mod package;
pub mod strategy;
pub mod version;

// Re-export all public types
pub use conflict::{Confidence, ConflictKind, PeerConflict, PeerResolution, ResolutionAction, Severity};
pub use dependency::{DependencyKind, DependencyMap, DependencySet, PackageRef, TemplatePackages};
pub use diagnostic::{Diagnostic, DiagnosticCategory};
pub use package::{FallbackReason, PackageManifest};
pub use strategy::MergeStrategy;
pub use version::{
    Comparator, ComparatorSet, Op, Prerelease, RangeKind, Version, VersionError, VersionReq,
};
