//! Package Metadata Resolver
//!
//! Turns `name@range` into a [`PackageManifest`]. Resolution never fails:
//! invalid names, offline mode and exhausted retries all degrade to a tagged
//! fallback manifest, and what went wrong is recorded in
//! [`FetchDiagnostics`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use graft_config::RegistrySettings;
use graft_core::error::GraftError;
use graft_core::types::{DiagnosticCategory, FallbackReason, PackageManifest, Version};
use graft_core::utils::validate_package_name;
use tracing::{debug, warn};

use crate::api::VersionMetadata;
use crate::cache::MetadataCache;
use crate::source::{is_dist_tag, source_from_settings, RegistrySource};
use crate::RegistryResult;

pub mod diagnostics;

pub use diagnostics::{FetchCounters, FetchDiagnostics, FetchReport, MalformedPackage, NetworkErrorEntry};

/// Upper bound for a single backoff sleep
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Retry, timeout and fallback policy of the resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverOptions {
    /// Fetch attempts per manifest
    pub retries: u32,
    /// Base delay; attempt `n` is followed by `retry_delay * 2^(n-1)`
    pub retry_delay: Duration,
    /// Hard timeout per registry call
    pub timeout: Duration,
    pub offline: bool,
    pub allow_cached_fallback: bool,
    pub try_latest_fallback: bool,
    pub skip_malformed: bool,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self::from(&RegistrySettings::default())
    }
}

impl From<&RegistrySettings> for ResolverOptions {
    fn from(settings: &RegistrySettings) -> Self {
        Self {
            retries: settings.retries,
            retry_delay: settings.retry_delay(),
            timeout: settings.timeout(),
            offline: settings.offline,
            allow_cached_fallback: settings.allow_cached_fallback,
            try_latest_fallback: settings.try_latest_fallback,
            skip_malformed: settings.skip_malformed,
        }
    }
}

/// Cache key shared by both tiers
pub fn cache_key(name: &str, range_or_version: &str) -> String {
    format!("{}@{}", name, range_or_version)
}

pub struct MetadataResolver {
    source: Arc<dyn RegistrySource>,
    cache: Arc<MetadataCache>,
    options: ResolverOptions,
    diagnostics: FetchDiagnostics,
}

impl MetadataResolver {
    pub fn new(source: Arc<dyn RegistrySource>, cache: Arc<MetadataCache>, options: ResolverOptions) -> Self {
        Self {
            source,
            cache,
            options,
            diagnostics: FetchDiagnostics::new(),
        }
    }

    /// Resolver over the backend selected by the registry settings
    pub fn from_settings(settings: &RegistrySettings, cache: Arc<MetadataCache>) -> RegistryResult<Self> {
        Ok(Self::new(source_from_settings(settings)?, cache, ResolverOptions::from(settings)))
    }

    pub fn cache(&self) -> &Arc<MetadataCache> {
        &self.cache
    }

    pub fn source(&self) -> &Arc<dyn RegistrySource> {
        &self.source
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    pub fn diagnostics(&self) -> &FetchDiagnostics {
        &self.diagnostics
    }

    /// Resolve the manifest `range` selects for `name`
    pub async fn resolve(&self, name: &str, range: &str) -> PackageManifest {
        if let Err(error) = validate_package_name(name) {
            warn!(package = name, error = %error, "invalid package name");
            self.diagnostics.record_malformed(name, error.to_string());
            self.diagnostics.count_fallback();
            return PackageManifest::fallback(name, range, FallbackReason::InvalidName, Some(error.to_string()));
        }

        let range_key = cache_key(name, range);
        if let Some(manifest) = self.cache.get(&range_key) {
            return manifest;
        }

        if self.options.offline {
            debug!(package = name, range, "offline, skipping registry");
            self.diagnostics.count_offline();
            return PackageManifest::offline(name, range);
        }

        let version = self.resolve_concrete_version(name, range).await;
        let version_key = cache_key(name, &version);
        if version_key != range_key {
            if let Some(manifest) = self.cache.get(&version_key) {
                self.cache.put(range_key, manifest.clone());
                return manifest;
            }
        }

        match self.fetch_with_retry(name, &version).await {
            Ok(metadata) => {
                let manifest = metadata.into_manifest(name);
                self.diagnostics.count_fetched();
                self.cache.put(range_key, manifest.clone());
                self.cache.put(version_key, manifest.clone());
                manifest
            },
            Err(error) => self.fall_back(name, range, &version, error).await,
        }
    }

    /// Ask the registry which version `range` selects, coercing on failure
    async fn resolve_concrete_version(&self, name: &str, range: &str) -> String {
        let lookup = self
            .call(format!("resolving {}@{}", name, range), self.source.resolve_version(name, range))
            .await;
        match lookup {
            Ok(version) => version,
            Err(error) => {
                let coerced = coerce_range(range);
                warn!(package = name, range, coerced = %coerced, error = %error, "version lookup failed, coercing range");
                self.diagnostics.warn(
                    DiagnosticCategory::VersionResolution,
                    name,
                    format!("could not resolve '{}' ({}); using {}", range, error, coerced),
                );
                coerced
            },
        }
    }

    async fn fetch_with_retry(&self, name: &str, version: &str) -> RegistryResult<VersionMetadata> {
        let attempts = self.options.retries.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            let result = self
                .call(format!("fetching {}@{}", name, version), self.source.fetch_manifest(name, version))
                .await
                .and_then(|metadata| {
                    metadata.validate(name)?;
                    Ok(metadata)
                });

            match result {
                Ok(metadata) => {
                    if attempt > 1 {
                        debug!(package = name, attempt, "manifest fetched after retry");
                    }
                    return Ok(metadata);
                },
                Err(error) => {
                    self.record_attempt_failure(name, attempt, &error);
                    let retryable = error.is_retryable();
                    last_error = Some(error);

                    // Don't retry on final attempt or permanent failures
                    if !retryable || attempt == attempts {
                        break;
                    }

                    let delay = backoff_delay(self.options.retry_delay, attempt);
                    warn!(package = name, attempt, delay_ms = delay.as_millis() as u64, "manifest fetch failed, retrying");
                    tokio::time::sleep(delay).await;
                },
            }
        }

        Err(last_error.unwrap_or_else(|| GraftError::RegistryFetch {
            package: name.to_string(),
            message: "no fetch attempts were made".to_string(),
        }))
    }

    fn record_attempt_failure(&self, name: &str, attempt: u32, error: &GraftError) {
        if error.is_network_related() {
            self.diagnostics.record_network_error(name, attempt, error.to_string());
            return;
        }
        if error.is_malformed() {
            self.diagnostics.record_malformed(name, error.to_string());
            self.diagnostics.error(DiagnosticCategory::Malformed, name, error.to_string());
        } else {
            self.diagnostics.error(DiagnosticCategory::Registry, name, error.to_string());
        }
    }

    /// Cached version, then `latest`, then a synthesized manifest
    async fn fall_back(&self, name: &str, range: &str, version: &str, error: GraftError) -> PackageManifest {
        let message = error.to_string();

        if self.options.allow_cached_fallback {
            if let Some(cached) = self.cache.find_any_version(name) {
                warn!(package = name, cached = %cached.version, "using cached manifest of another version");
                return self.degraded(
                    name,
                    format!("using cached {}@{} after: {}", name, cached.version, message),
                    cached.into_fallback(FallbackReason::CachedVersion, Some(message)),
                );
            }
        }

        if self.options.try_latest_fallback && version != "latest" {
            let latest = self
                .call(format!("fetching {}@latest", name), self.source.fetch_manifest(name, "latest"))
                .await
                .and_then(|metadata| {
                    metadata.validate(name)?;
                    Ok(metadata)
                });
            match latest {
                Ok(metadata) => {
                    let manifest = metadata.into_manifest(name);
                    warn!(package = name, latest = %manifest.version, "using latest manifest");
                    return self.degraded(
                        name,
                        format!("using {}@latest ({}) after: {}", name, manifest.version, message),
                        manifest.into_fallback(FallbackReason::LatestTag, Some(message)),
                    );
                },
                Err(latest_error) => {
                    debug!(package = name, error = %latest_error, "latest fallback failed");
                },
            }
        }

        if self.options.skip_malformed {
            self.diagnostics.count_skipped();
            return self.degraded(
                name,
                format!("skipped after: {}", message),
                PackageManifest::fallback(name, range, FallbackReason::SkippedMalformed, Some(message)),
            );
        }

        self.diagnostics.count_failed();
        self.diagnostics
            .error(DiagnosticCategory::Fallback, name, format!("no metadata available: {}", message));
        self.degraded(
            name,
            format!("fetch failed: {}", message),
            PackageManifest::fallback(name, range, FallbackReason::FetchFailed, Some(message)),
        )
    }

    fn degraded(&self, name: &str, warning: String, manifest: PackageManifest) -> PackageManifest {
        self.diagnostics.count_fallback();
        self.diagnostics.warn(DiagnosticCategory::Fallback, name, warning);
        manifest
    }

    /// Outer deadline for one backend call. Backends that stop their own
    /// work gracefully get room to finish before the call is dropped.
    async fn call<T>(&self, operation: String, future: impl Future<Output = RegistryResult<T>>) -> RegistryResult<T> {
        let deadline = self.options.timeout + self.source.termination_grace();
        match tokio::time::timeout(deadline, future).await {
            Ok(result) => result,
            Err(_) => Err(GraftError::timeout(operation, self.options.timeout)),
        }
    }
}

impl std::fmt::Debug for MetadataResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataResolver")
            .field("backend", &self.source.backend_name())
            .field("options", &self.options)
            .field("cache", &self.cache)
            .finish()
    }
}

/// `base * 2^(attempt-1)`, capped
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.checked_mul(factor)
        .unwrap_or(MAX_RETRY_DELAY)
        .min(MAX_RETRY_DELAY)
}

/// Best concrete guess for a range when the registry cannot resolve it.
///
/// Dist-tags pass through unchanged so the manifest query can still
/// resolve them; anything without a usable version becomes `latest`.
pub fn coerce_range(range: &str) -> String {
    let range = range.trim();
    if is_dist_tag(range) {
        return range.to_string();
    }
    Version::coerce(range)
        .map(|version| version.to_string())
        .unwrap_or_else(|| "latest".to_string())
}

#[cfg(test)]
mod tests;
