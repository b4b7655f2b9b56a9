//! In-process registry backend.
//!
//! Holds manifests per package and version, supports scripted failures and
//! counts every call, so analysis can run without touching the network.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use graft_core::error::GraftError;
use graft_core::types::{Version, VersionReq};
use parking_lot::Mutex;

use super::RegistrySource;
use crate::api::VersionMetadata;
use crate::RegistryResult;

/// Failure injected into the next matching call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedFailure {
    /// Transport failure with the given message
    Network(String),
    /// Call exceeded its deadline
    Timeout,
    /// Registry has no such package
    NotFound,
    /// Registry answered with an unusable document
    Malformed(String),
    /// Call hangs for the given time before answering normally
    Delay(Duration),
}

#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    packages: DashMap<String, BTreeMap<String, VersionMetadata>>,
    dist_tags: DashMap<String, HashMap<String, String>>,
    fetch_failures: Mutex<HashMap<String, VecDeque<ScriptedFailure>>>,
    resolve_failures: Mutex<HashMap<String, VecDeque<ScriptedFailure>>>,
    resolve_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl ScriptedFailure {
    fn into_error(self, name: &str) -> GraftError {
        match self {
            ScriptedFailure::Network(message) => GraftError::Network {
                message,
                source: None,
            },
            ScriptedFailure::Timeout => GraftError::timeout(
                format!("registry query for {}", name),
                Duration::from_secs(30),
            ),
            ScriptedFailure::NotFound => GraftError::PackageNotFound {
                name: name.to_string(),
            },
            ScriptedFailure::Malformed(message) => GraftError::ManifestParse {
                package: name.to_string(),
                message,
            },
            ScriptedFailure::Delay(_) => GraftError::RegistryFetch {
                package: name.to_string(),
                message: "delay is not a failure".to_string(),
            },
        }
    }
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a manifest; its name and version select where it is stored
    pub fn publish(&self, metadata: VersionMetadata) {
        let (Some(name), Some(version)) = (metadata.name.clone(), metadata.version.clone()) else {
            return;
        };
        self.packages
            .entry(name)
            .or_default()
            .insert(version, metadata);
    }

    /// Publish `name@version` with the given peer requirements
    pub fn with_package(self, name: &str, version: &str, peers: &[(&str, &str)]) -> Self {
        let metadata = peers
            .iter()
            .fold(VersionMetadata::new(name, version), |metadata, (peer, range)| {
                metadata.with_peer(peer, range)
            });
        self.publish(metadata);
        self
    }

    /// Store a document under `name@version` exactly as given, even if invalid
    pub fn publish_raw(&self, name: &str, version: &str, metadata: VersionMetadata) {
        self.packages
            .entry(name.to_string())
            .or_default()
            .insert(version.to_string(), metadata);
    }

    pub fn set_dist_tag(&self, name: &str, tag: &str, version: &str) {
        self.dist_tags
            .entry(name.to_string())
            .or_default()
            .insert(tag.to_string(), version.to_string());
    }

    /// Fail the next `count` manifest fetches for `name`
    pub fn fail_next_fetches(&self, name: &str, count: usize, failure: ScriptedFailure) {
        let mut failures = self.fetch_failures.lock();
        let queue = failures.entry(name.to_string()).or_default();
        queue.extend(std::iter::repeat(failure).take(count));
    }

    /// Fail the next `count` version resolutions for `name`
    pub fn fail_next_resolves(&self, name: &str, count: usize, failure: ScriptedFailure) {
        let mut failures = self.resolve_failures.lock();
        let queue = failures.entry(name.to_string()).or_default();
        queue.extend(std::iter::repeat(failure).take(count));
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Every call that would have reached a real registry
    pub fn total_calls(&self) -> usize {
        self.resolve_calls() + self.fetch_calls()
    }

    async fn scripted(
        queue: &Mutex<HashMap<String, VecDeque<ScriptedFailure>>>,
        name: &str,
    ) -> RegistryResult<()> {
        let next = queue.lock().get_mut(name).and_then(VecDeque::pop_front);
        match next {
            Some(ScriptedFailure::Delay(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(())
            },
            Some(failure) => Err(failure.into_error(name)),
            None => Ok(()),
        }
    }

    fn tag_target(&self, name: &str, tag: &str) -> Option<String> {
        if let Some(version) = self
            .dist_tags
            .get(name)
            .and_then(|tags| tags.get(tag).cloned())
        {
            return Some(version);
        }
        if tag != "latest" {
            return None;
        }
        // Without an explicit tag, `latest` is the highest stable release
        let versions = self.packages.get(name)?;
        let parsed: Vec<Version> = versions.keys().filter_map(|v| Version::parse(v).ok()).collect();
        VersionReq::any()
            .max_satisfying(&parsed)
            .map(|version| version.to_string())
    }
}

#[async_trait]
impl RegistrySource for InMemoryRegistry {
    async fn resolve_version(&self, name: &str, range: &str) -> RegistryResult<String> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        Self::scripted(&self.resolve_failures, name).await?;

        if !self.packages.contains_key(name) {
            return Err(GraftError::PackageNotFound {
                name: name.to_string(),
            });
        }
        if let Some(version) = self.tag_target(name, range) {
            return Ok(version);
        }

        let req = VersionReq::parse(range).map_err(|source| GraftError::VersionParse {
            input: range.to_string(),
            source,
        })?;
        let parsed: Vec<Version> = self
            .packages
            .get(name)
            .map(|versions| versions.keys().filter_map(|v| Version::parse(v).ok()).collect())
            .unwrap_or_default();

        req.max_satisfying(&parsed)
            .map(|version| version.to_string())
            .ok_or_else(|| GraftError::RegistryFetch {
                package: name.to_string(),
                message: format!("No matching version found for {}@{}", name, range),
            })
    }

    async fn fetch_manifest(&self, name: &str, version: &str) -> RegistryResult<VersionMetadata> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        Self::scripted(&self.fetch_failures, name).await?;

        let concrete = self
            .tag_target(name, version)
            .unwrap_or_else(|| version.to_string());
        self.packages
            .get(name)
            .and_then(|versions| versions.get(&concrete).cloned())
            .ok_or_else(|| GraftError::PackageNotFound {
                name: format!("{}@{}", name, version),
            })
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}
