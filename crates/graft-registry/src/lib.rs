//! Package metadata for graft
//!
//! This crate answers "what does `name@range` look like?" It provides the
//! registry backends (npm CLI, HTTP API, in-memory), a two-tier metadata
//! cache, and the resolver that combines them with retries, timeouts and
//! fallbacks.

pub mod api;
pub mod cache;
pub mod client;
pub mod command;
pub mod metadata;
pub mod source;

// Re-export main types
pub use api::{PackumentResponse, VersionMetadata};
pub use cache::{CacheEntry, CacheStats, CacheStore, DiskCache, MemoryCache, MetadataCache, PersistentCache};
pub use client::{AuthConfig, HttpRegistry};
pub use command::NpmCommandRegistry;
pub use metadata::{
    FetchCounters, FetchDiagnostics, FetchReport, MalformedPackage, MetadataResolver, NetworkErrorEntry,
    ResolverOptions,
};
pub use source::{source_from_settings, InMemoryRegistry, RegistrySource, ScriptedFailure};

use graft_core::error::GraftError;

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, GraftError>;
