//! Settings structs for every graft component.
//!
//! Each section has documented defaults and is validated as a whole by
//! [`GraftConfig::validate`], so invalid combinations fail at construction
//! instead of surfacing mid-analysis.

use std::time::Duration;

use camino::Utf8PathBuf;
use graft_core::error::GraftError;
use graft_core::types::MergeStrategy;
use serde::{Deserialize, Serialize};

use crate::ConfigResult;

/// Public npm registry, used when the HTTP backend has no explicit URL
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.org";

/// Complete graft configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GraftConfig {
    pub registry: RegistrySettings,
    pub cache: CacheSettings,
    pub analyzer: AnalyzerSettings,
    pub merge: MergeSettings,
}

/// Which registry backend answers metadata queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegistryBackend {
    /// Shell out to the npm CLI (`npm view`)
    #[default]
    NpmCli,
    /// Query the registry HTTP API directly
    Http,
}

/// Package Metadata Resolver settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistrySettings {
    pub backend: RegistryBackend,
    /// Executable used by the npm CLI backend
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    /// Fetch attempts per manifest
    pub retries: u32,
    /// Base delay for exponential backoff
    pub retry_delay_ms: u64,
    /// Hard timeout per registry call
    pub timeout_ms: u64,
    /// Time a timed-out child process gets between SIGTERM and kill
    pub kill_grace_ms: u64,
    pub offline: bool,
    /// Reuse a cached manifest for another version after fetch failure
    pub allow_cached_fallback: bool,
    /// Try the `latest` tag once after fetch failure
    pub try_latest_fallback: bool,
    /// Skip failing packages instead of counting them as failures
    pub skip_malformed: bool,
}

/// Metadata cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSettings {
    pub enabled: bool,
    /// Load from and write back to `path`
    pub persist: bool,
    pub path: Utf8PathBuf,
    /// Entry lifetime; `None` keeps entries for the life of the process
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
    /// Timeout for loading or flushing the cache file
    pub io_timeout_ms: u64,
}

/// Peer Dependency Analyzer settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalyzerSettings {
    /// Concurrent manifest fetches per batch
    pub batch_size: usize,
    /// Pause between batches
    pub batch_delay_ms: u64,
    /// Overall analysis timeout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Dependency Merger settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MergeSettings {
    pub strategy: MergeStrategy,
    pub analyze_peers: bool,
    pub check_known_incompatibilities: bool,
    /// Apply high-confidence peer resolutions to the merged set
    pub auto_apply_peer_resolutions: bool,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            backend: RegistryBackend::NpmCli,
            command: "npm".to_string(),
            registry_url: None,
            auth_token: None,
            retries: 3,
            retry_delay_ms: 1000,
            timeout_ms: 30_000,
            kill_grace_ms: 2000,
            offline: false,
            allow_cached_fallback: true,
            try_latest_fallback: true,
            skip_malformed: false,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            persist: false,
            path: default_cache_path(),
            ttl_secs: None,
            io_timeout_ms: 5000,
        }
    }
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            batch_size: 5,
            batch_delay_ms: 100,
            timeout_ms: None,
        }
    }
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            strategy: MergeStrategy::Smart,
            analyze_peers: true,
            check_known_incompatibilities: true,
            auto_apply_peer_resolutions: true,
        }
    }
}

/// `<user cache dir>/graft/metadata-cache.json`, or a relative path when
/// the platform has no cache directory
pub fn default_cache_path() -> Utf8PathBuf {
    dirs::cache_dir()
        .and_then(|dir| Utf8PathBuf::try_from(dir).ok())
        .unwrap_or_else(|| Utf8PathBuf::from(".graft"))
        .join("graft")
        .join("metadata-cache.json")
}

impl RegistrySettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    /// Configured registry URL, or the public registry
    pub fn registry_url_or_default(&self) -> &str {
        self.registry_url.as_deref().unwrap_or(DEFAULT_REGISTRY_URL)
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}

impl AnalyzerSettings {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> GraftError {
    GraftError::ConfigValidation {
        field: field.to_string(),
        reason: reason.into(),
    }
}

impl GraftConfig {
    /// Reject invalid values and contradictory combinations
    pub fn validate(&self) -> ConfigResult<()> {
        let registry = &self.registry;
        if registry.retries == 0 {
            return Err(invalid("registry.retries", "must be at least 1"));
        }
        if registry.retries > 10 {
            return Err(invalid("registry.retries", "must be at most 10"));
        }
        if registry.timeout_ms == 0 {
            return Err(invalid("registry.timeout_ms", "must be greater than zero"));
        }
        if registry.backend == RegistryBackend::NpmCli && registry.command.trim().is_empty() {
            return Err(invalid("registry.command", "cannot be empty for the npm-cli backend"));
        }
        if let Some(raw) = &registry.registry_url {
            let parsed = url::Url::parse(raw)
                .map_err(|e| invalid("registry.registry_url", format!("'{}' is not a URL: {}", raw, e)))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(invalid(
                    "registry.registry_url",
                    format!("'{}' must use http or https", raw),
                ));
            }
        }

        if self.cache.persist && !self.cache.enabled {
            return Err(invalid("cache.persist", "requires cache.enabled = true"));
        }
        if self.cache.io_timeout_ms == 0 {
            return Err(invalid("cache.io_timeout_ms", "must be greater than zero"));
        }
        if self.cache.ttl_secs == Some(0) {
            return Err(invalid("cache.ttl_secs", "must be greater than zero when set"));
        }

        if self.analyzer.batch_size == 0 {
            return Err(invalid("analyzer.batch_size", "must be at least 1"));
        }
        if self.analyzer.batch_size > 50 {
            return Err(invalid("analyzer.batch_size", "must be at most 50"));
        }
        if self.analyzer.timeout_ms == Some(0) {
            return Err(invalid("analyzer.timeout_ms", "must be greater than zero when set"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(result: ConfigResult<()>) -> String {
        match result {
            Err(GraftError::ConfigValidation { field, .. }) => field,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_defaults() {
        let config = GraftConfig::default();
        assert_eq!(config.registry.backend, RegistryBackend::NpmCli);
        assert_eq!(config.registry.retries, 3);
        assert_eq!(config.registry.retry_delay(), Duration::from_secs(1));
        assert_eq!(config.registry.timeout(), Duration::from_secs(30));
        assert!(config.registry.allow_cached_fallback);
        assert!(!config.registry.skip_malformed);
        assert!(config.cache.enabled);
        assert!(!config.cache.persist);
        assert!(config.cache.path.ends_with("graft/metadata-cache.json"));
        assert_eq!(config.analyzer.batch_size, 5);
        assert_eq!(config.analyzer.timeout(), None);
        assert_eq!(config.merge.strategy, MergeStrategy::Smart);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retry_bounds() {
        let mut config = GraftConfig::default();
        config.registry.retries = 0;
        assert_eq!(field_of(config.validate()), "registry.retries");
        config.registry.retries = 11;
        assert_eq!(field_of(config.validate()), "registry.retries");
        config.registry.retries = 10;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_batch_size_bounds() {
        let mut config = GraftConfig::default();
        config.analyzer.batch_size = 0;
        assert_eq!(field_of(config.validate()), "analyzer.batch_size");
        config.analyzer.batch_size = 51;
        assert_eq!(field_of(config.validate()), "analyzer.batch_size");
    }

    #[test]
    fn test_persist_requires_enabled_cache() {
        let mut config = GraftConfig::default();
        config.cache.enabled = false;
        config.cache.persist = true;
        assert_eq!(field_of(config.validate()), "cache.persist");
    }

    #[test]
    fn test_registry_url_must_be_http() {
        let mut config = GraftConfig::default();
        config.registry.registry_url = Some("ftp://registry.example.com".to_string());
        assert_eq!(field_of(config.validate()), "registry.registry_url");

        config.registry.registry_url = Some("not a url".to_string());
        assert_eq!(field_of(config.validate()), "registry.registry_url");

        config.registry.registry_url = Some("https://npm.internal.example.com/".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let mut config = GraftConfig::default();
        config.registry.timeout_ms = 0;
        assert_eq!(field_of(config.validate()), "registry.timeout_ms");

        let mut config = GraftConfig::default();
        config.analyzer.timeout_ms = Some(0);
        assert_eq!(field_of(config.validate()), "analyzer.timeout_ms");
    }

    #[test]
    fn test_http_backend_defaults_to_public_registry() {
        let mut config = GraftConfig::default();
        config.registry.backend = RegistryBackend::Http;
        assert!(config.validate().is_ok());
        assert_eq!(config.registry.registry_url_or_default(), DEFAULT_REGISTRY_URL);
    }
}
