//! Registry backends behind one query interface

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use graft_config::{RegistryBackend, RegistrySettings};

use crate::api::VersionMetadata;
use crate::client::HttpRegistry;
use crate::command::NpmCommandRegistry;
use crate::RegistryResult;

pub mod memory;

pub use memory::{InMemoryRegistry, ScriptedFailure};

/// Source of package versions and manifests
#[async_trait]
pub trait RegistrySource: Send + Sync {
    /// Resolve the concrete version `range` selects (a range or a dist-tag)
    async fn resolve_version(&self, name: &str, range: &str) -> RegistryResult<String>;

    /// Fetch the manifest of one concrete version or dist-tag
    async fn fetch_manifest(&self, name: &str, version: &str) -> RegistryResult<VersionMetadata>;

    /// Get a human-readable name for this backend (for logging)
    fn backend_name(&self) -> &str;

    /// Extra time a timed-out call needs to shut down cleanly. Callers that
    /// put their own deadline around a call extend it by this much.
    fn termination_grace(&self) -> Duration {
        Duration::ZERO
    }
}

/// Build the backend selected by the registry settings
pub fn source_from_settings(settings: &RegistrySettings) -> RegistryResult<Arc<dyn RegistrySource>> {
    Ok(match settings.backend {
        RegistryBackend::NpmCli => Arc::new(NpmCommandRegistry::new(settings)),
        RegistryBackend::Http => Arc::new(HttpRegistry::from_settings(settings)?),
    })
}

/// Dist-tags look like words (`latest`, `next`, `beta`), never like ranges
pub fn is_dist_tag(range: &str) -> bool {
    let range = range.trim();
    range
        .chars()
        .next()
        .map_or(false, |first| first.is_ascii_alphabetic() && first != 'v' && first != 'x' && first != 'X')
        && range.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}
