//! Package manifest types.
//!
//! A `PackageManifest` is the resolved metadata for one package at one
//! concrete version, plus provenance flags describing how it was obtained.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Manifest for one package at one resolved version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub peer_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub engines: BTreeMap<String, String>,
    #[serde(default)]
    pub fallback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<FallbackReason>,
    #[serde(default)]
    pub offline: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_error: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

/// Why a manifest was synthesized instead of fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// Name failed package-name validation
    InvalidName,
    /// Reused a cached manifest for another version of the package
    CachedVersion,
    /// Fetched the `latest` tag instead of the requested range
    LatestTag,
    /// Fetch failed and the package was skipped as malformed
    SkippedMalformed,
    /// Fetch failed and no fallback produced real data
    FetchFailed,
}

impl PackageManifest {
    /// Create a manifest with empty dependency maps
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: None,
            peer_dependencies: BTreeMap::new(),
            dependencies: BTreeMap::new(),
            dev_dependencies: BTreeMap::new(),
            engines: BTreeMap::new(),
            fallback: false,
            fallback_reason: None,
            offline: false,
            fetch_error: None,
            fetched_at: Utc::now(),
        }
    }

    /// Synthesized manifest standing in for metadata that could not be obtained
    pub fn fallback(
        name: impl Into<String>,
        version: impl Into<String>,
        reason: FallbackReason,
        fetch_error: Option<String>,
    ) -> Self {
        Self {
            fallback: true,
            fallback_reason: Some(reason),
            fetch_error,
            ..Self::new(name, version)
        }
    }

    /// Minimal manifest returned without touching the registry
    pub fn offline(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            offline: true,
            ..Self::new(name, version)
        }
    }

    /// Mark an existing manifest as reused in place of the requested one
    pub fn into_fallback(mut self, reason: FallbackReason, fetch_error: Option<String>) -> Self {
        self.fallback = true;
        self.fallback_reason = Some(reason);
        self.fetch_error = fetch_error;
        self
    }

    /// Whether the package declares any peer requirements
    pub fn has_peers(&self) -> bool {
        !self.peer_dependencies.is_empty()
    }

    /// Whether the manifest holds anything less than freshly fetched data
    pub fn is_degraded(&self) -> bool {
        self.fallback || self.offline
    }
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackReason::InvalidName => "invalid_name",
            FallbackReason::CachedVersion => "cached_version",
            FallbackReason::LatestTag => "latest_tag",
            FallbackReason::SkippedMalformed => "skipped_malformed",
            FallbackReason::FetchFailed => "fetch_failed",
        }
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
