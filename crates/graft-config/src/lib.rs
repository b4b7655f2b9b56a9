//! Configuration for graft
//!
//! This crate defines the settings every graft component is constructed
//! from, parses `graft.toml` files, and layers global, project and
//! environment configuration into one validated `GraftConfig`.

pub mod merge;
pub mod settings;
pub mod toml;

// Re-export main types
pub use merge::{ConfigLayering, ConfigLoader, ConfigSource};
pub use settings::{
    AnalyzerSettings, CacheSettings, GraftConfig, MergeSettings, RegistryBackend, RegistrySettings,
};
pub use crate::toml::{load_from_file, parse_graft_toml, serialize_graft_toml};

use graft_core::error::GraftError;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, GraftError>;
