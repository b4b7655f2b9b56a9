//! Two-tier manifest caching with TTL support
//!
//! Manifests are keyed by `name@range` and, once resolved, by
//! `name@version`. The memory tier is consulted first, then the disk tier;
//! disk hits are promoted into memory.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use graft_config::CacheSettings;
use graft_core::types::{PackageManifest, Version};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::RegistryResult;

pub mod disk;

pub use disk::{DiskCache, PersistentCache};

/// Key/value store for manifests
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Option<PackageManifest>;

    fn put(&self, key: String, manifest: PackageManifest);

    fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    fn remove(&self, key: &str) -> Option<PackageManifest>;

    fn clear(&self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every live entry
    fn entries(&self) -> Vec<(String, PackageManifest)>;
}

/// Cache entry with optional TTL
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Cached manifest
    pub manifest: PackageManifest,
    /// When the entry was stored
    pub stored_at: SystemTime,
    /// Time-to-live; `None` never expires
    pub ttl: Option<Duration>,
}

impl CacheEntry {
    /// Create an entry that never expires
    pub fn new(manifest: PackageManifest) -> Self {
        Self::with_ttl(manifest, None)
    }

    pub fn with_ttl(manifest: PackageManifest, ttl: Option<Duration>) -> Self {
        Self {
            manifest,
            stored_at: SystemTime::now(),
            ttl,
        }
    }

    /// Check if cache entry is still fresh
    pub fn is_fresh(&self) -> bool {
        let Some(ttl) = self.ttl else {
            return true;
        };
        match self.stored_at.elapsed() {
            Ok(elapsed) => elapsed < ttl,
            Err(_) => false, // Clock went backwards, consider stale
        }
    }

    /// Get age of cache entry
    pub fn age(&self) -> Option<Duration> {
        self.stored_at.elapsed().ok()
    }
}

/// In-memory manifest cache
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Option<Duration>,
}

/// Fresh/stale breakdown of the memory tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessStats {
    pub total_entries: usize,
    pub fresh_entries: usize,
    pub stale_entries: usize,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries expire `ttl` after they are stored
    pub fn with_ttl(ttl: Option<Duration>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn stats(&self) -> FreshnessStats {
        let mut fresh_entries = 0;
        let mut stale_entries = 0;

        for entry in self.entries.iter() {
            if entry.is_fresh() {
                fresh_entries += 1;
            } else {
                stale_entries += 1;
            }
        }

        FreshnessStats {
            total_entries: self.entries.len(),
            fresh_entries,
            stale_entries,
        }
    }

    /// Remove stale entries
    pub fn cleanup(&self) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            if entry.is_fresh() {
                true
            } else {
                removed += 1;
                false
            }
        });
        removed
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str) -> Option<PackageManifest> {
        let fresh = {
            let entry = self.entries.get(key)?;
            entry.is_fresh().then(|| entry.manifest.clone())
        };
        if fresh.is_none() {
            // Remove stale entry
            self.entries.remove(key);
        }
        fresh
    }

    fn put(&self, key: String, manifest: PackageManifest) {
        self.entries
            .insert(key, CacheEntry::with_ttl(manifest, self.ttl));
    }

    fn remove(&self, key: &str) -> Option<PackageManifest> {
        self.entries.remove(key).map(|(_, entry)| entry.manifest)
    }

    fn clear(&self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn entries(&self) -> Vec<(String, PackageManifest)> {
        self.entries
            .iter()
            .filter(|entry| entry.is_fresh())
            .map(|entry| (entry.key().clone(), entry.manifest.clone()))
            .collect()
    }
}

/// Hit and size counters for the tiered cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub memory_entries: usize,
    pub disk_entries: usize,
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.memory_hits + self.disk_hits
    }
}

/// Memory tier in front of an optional persistent tier
pub struct MetadataCache {
    enabled: bool,
    memory: Box<dyn CacheStore>,
    disk: Option<Box<dyn PersistentCache>>,
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    misses: AtomicU64,
}

impl MetadataCache {
    pub fn new(memory: Box<dyn CacheStore>, disk: Option<Box<dyn PersistentCache>>) -> Self {
        Self {
            enabled: true,
            memory,
            disk,
            memory_hits: AtomicU64::new(0),
            disk_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Memory tier only
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryCache::new()), None)
    }

    /// Cache that stores nothing and always misses
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::in_memory()
        }
    }

    /// Build the tiers described by the cache settings.
    ///
    /// The disk tier is not read until [`MetadataCache::load`] is called.
    pub fn from_settings(settings: &CacheSettings) -> Self {
        if !settings.enabled {
            return Self::disabled();
        }
        let memory = Box::new(MemoryCache::with_ttl(settings.ttl()));
        let disk: Option<Box<dyn PersistentCache>> = settings.persist.then(|| {
            Box::new(DiskCache::new(settings.path.clone(), settings.io_timeout())) as Box<dyn PersistentCache>
        });
        Self::new(memory, disk)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Read the persistent tier, returning how many entries it holds
    pub async fn load(&self) -> RegistryResult<usize> {
        match &self.disk {
            Some(disk) if self.enabled => disk.load().await,
            _ => Ok(0),
        }
    }

    /// Look up a key in memory, then on disk
    pub fn get(&self, key: &str) -> Option<PackageManifest> {
        if !self.enabled {
            return None;
        }

        if let Some(manifest) = self.memory.get(key) {
            self.memory_hits.fetch_add(1, Ordering::Relaxed);
            debug!(key, "memory cache hit");
            return Some(manifest);
        }

        if let Some(manifest) = self.disk.as_ref().and_then(|disk| disk.get(key)) {
            self.disk_hits.fetch_add(1, Ordering::Relaxed);
            debug!(key, "disk cache hit");
            self.memory.put(key.to_string(), manifest.clone());
            return Some(manifest);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key, "cache miss");
        None
    }

    /// Store into both tiers
    pub fn put(&self, key: String, manifest: PackageManifest) {
        if !self.enabled {
            return;
        }
        if let Some(disk) = &self.disk {
            disk.put(key.clone(), manifest.clone());
        }
        self.memory.put(key, manifest);
    }

    pub fn has(&self, key: &str) -> bool {
        self.enabled
            && (self.memory.has(key) || self.disk.as_ref().map_or(false, |disk| disk.has(key)))
    }

    /// Highest cached real manifest for `name`, at any version
    pub fn find_any_version(&self, name: &str) -> Option<PackageManifest> {
        if !self.enabled {
            return None;
        }
        let prefix = format!("{}@", name);
        let mut candidates: Vec<PackageManifest> = self.memory.entries().into_iter()
            .chain(self.disk.iter().flat_map(|disk| disk.entries()))
            .filter(|(key, manifest)| key.starts_with(&prefix) && manifest.name == name && !manifest.is_degraded())
            .map(|(_, manifest)| manifest)
            .collect();

        candidates.sort_by(|a, b| {
            let left = Version::coerce(&a.version);
            let right = Version::coerce(&b.version);
            left.cmp(&right).then_with(|| a.version.cmp(&b.version))
        });
        candidates.pop()
    }

    /// Write the persistent tier back to disk
    pub async fn persist(&self) -> RegistryResult<()> {
        match &self.disk {
            Some(disk) if self.enabled => disk.flush().await,
            _ => Ok(()),
        }
    }

    pub fn clear(&self) {
        self.memory.clear();
        if let Some(disk) = &self.disk {
            disk.clear();
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            memory_entries: self.memory.len(),
            disk_entries: self.disk.as_ref().map_or(0, |disk| disk.len()),
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl std::fmt::Debug for MetadataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataCache")
            .field("enabled", &self.enabled)
            .field("persistent", &self.disk.is_some())
            .field("stats", &self.stats())
            .finish()
    }
}
