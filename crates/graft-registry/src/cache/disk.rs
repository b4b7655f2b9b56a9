//! JSON-file cache tier.
//!
//! The file is one JSON object mapping `name@range` to a manifest. It is
//! mirrored into a `DashMap` on load and written back atomically on flush.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use dashmap::DashMap;
use graft_core::error::GraftError;
use graft_core::types::PackageManifest;
use tracing::{debug, warn};

use super::CacheStore;
use crate::RegistryResult;

/// Cache tier that survives the process
#[async_trait]
pub trait PersistentCache: CacheStore {
    /// Replace in-memory contents with what is on disk
    async fn load(&self) -> RegistryResult<usize>;

    /// Write current contents to disk
    async fn flush(&self) -> RegistryResult<()>;
}

#[derive(Debug)]
pub struct DiskCache {
    path: Utf8PathBuf,
    entries: DashMap<String, PackageManifest>,
    io_timeout: Duration,
    dirty: AtomicBool,
}

impl DiskCache {
    pub fn new(path: Utf8PathBuf, io_timeout: Duration) -> Self {
        Self {
            path,
            entries: DashMap::new(),
            io_timeout,
            dirty: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Whether there are writes not yet flushed
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    fn temp_path(&self) -> Utf8PathBuf {
        let mut name = self.path.file_name().unwrap_or("metadata-cache.json").to_string();
        name.push_str(".tmp");
        self.path.with_file_name(name)
    }

    async fn read_file(&self) -> RegistryResult<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(GraftError::io(format!("Failed to read cache file {}", self.path), e)),
        }
    }

    async fn write_file(&self, content: String) -> RegistryResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| GraftError::io(format!("Failed to create {}", parent), e))?;
            }
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, content)
            .await
            .map_err(|e| GraftError::io(format!("Failed to write {}", temp), e))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| GraftError::io(format!("Failed to replace {}", self.path), e))
    }
}

impl CacheStore for DiskCache {
    fn get(&self, key: &str) -> Option<PackageManifest> {
        self.entries.get(key).map(|entry| entry.clone())
    }

    fn put(&self, key: String, manifest: PackageManifest) {
        self.entries.insert(key, manifest);
        self.dirty.store(true, Ordering::Release);
    }

    fn remove(&self, key: &str) -> Option<PackageManifest> {
        let removed = self.entries.remove(key).map(|(_, manifest)| manifest);
        if removed.is_some() {
            self.dirty.store(true, Ordering::Release);
        }
        removed
    }

    fn clear(&self) {
        self.entries.clear();
        self.dirty.store(true, Ordering::Release);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn entries(&self) -> Vec<(String, PackageManifest)> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

#[async_trait]
impl PersistentCache for DiskCache {
    async fn load(&self) -> RegistryResult<usize> {
        let content = tokio::time::timeout(self.io_timeout, self.read_file())
            .await
            .map_err(|_| GraftError::timeout(format!("loading cache file {}", self.path), self.io_timeout))??;

        let Some(content) = content else {
            debug!(path = %self.path, "no cache file yet");
            return Ok(0);
        };

        let parsed: BTreeMap<String, PackageManifest> = match serde_json::from_str(&content) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(path = %self.path, error = %e, "cache file is corrupt, starting empty");
                BTreeMap::new()
            },
        };

        self.entries.clear();
        for (key, manifest) in parsed {
            self.entries.insert(key, manifest);
        }
        self.dirty.store(false, Ordering::Release);

        let loaded = self.entries.len();
        debug!(path = %self.path, entries = loaded, "cache file loaded");
        Ok(loaded)
    }

    async fn flush(&self) -> RegistryResult<()> {
        // Sorted keys keep the file stable between runs
        let snapshot: BTreeMap<String, PackageManifest> = self.entries().into_iter().collect();
        let content = serde_json::to_string_pretty(&snapshot)?;

        tokio::time::timeout(self.io_timeout, self.write_file(content))
            .await
            .map_err(|_| GraftError::timeout(format!("writing cache file {}", self.path), self.io_timeout))??;

        self.dirty.store(false, Ordering::Release);
        debug!(path = %self.path, entries = snapshot.len(), "cache file written");
        Ok(())
    }
}
