//! Failure bookkeeping for metadata resolution.
//!
//! Resolution never fails outright, so everything that went wrong is
//! recorded here and drained into a [`FetchReport`] once per analysis.

use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use graft_core::types::{Diagnostic, DiagnosticCategory, Severity};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// One failed registry attempt classified as a transport problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkErrorEntry {
    pub package: String,
    /// 1-based attempt number
    pub attempt: u32,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MalformedPackage {
    pub package: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Per-outcome package counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchCounters {
    /// Manifests fetched from the registry
    pub fetched: usize,
    /// Packages that ended with a `fetch_failed` manifest
    pub failed: usize,
    /// Packages skipped as malformed
    pub skipped: usize,
    /// Fallback manifests of any kind handed out
    pub fallbacks: usize,
    /// Offline manifests handed out
    pub offline: usize,
}

/// Everything recorded since the last drain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchReport {
    pub network_errors: Vec<NetworkErrorEntry>,
    pub warnings: Vec<Diagnostic>,
    pub errors: Vec<Diagnostic>,
    pub malformed: Vec<MalformedPackage>,
    pub counters: FetchCounters,
}

#[derive(Debug, Default)]
pub struct FetchDiagnostics {
    network_errors: Mutex<Vec<NetworkErrorEntry>>,
    warnings: Mutex<Vec<Diagnostic>>,
    errors: Mutex<Vec<Diagnostic>>,
    malformed: Mutex<Vec<MalformedPackage>>,
    fetched: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
    fallbacks: AtomicUsize,
    offline: AtomicUsize,
}

impl FetchDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_network_error(&self, package: &str, attempt: u32, message: impl Into<String>) {
        self.network_errors.lock().push(NetworkErrorEntry {
            package: package.to_string(),
            attempt,
            message: message.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn record_malformed(&self, package: &str, reason: impl Into<String>) {
        self.malformed.lock().push(MalformedPackage {
            package: package.to_string(),
            reason: reason.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn warn(&self, category: DiagnosticCategory, package: &str, message: impl Into<String>) {
        self.warnings
            .lock()
            .push(Diagnostic::new(category, Severity::Medium, message).for_package(package));
    }

    pub fn error(&self, category: DiagnosticCategory, package: &str, message: impl Into<String>) {
        self.errors
            .lock()
            .push(Diagnostic::new(category, Severity::High, message).for_package(package));
    }

    pub fn count_fetched(&self) {
        self.fetched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_offline(&self) {
        self.offline.fetch_add(1, Ordering::Relaxed);
    }

    pub fn network_error_count(&self) -> usize {
        self.network_errors.lock().len()
    }

    pub fn counters(&self) -> FetchCounters {
        FetchCounters {
            fetched: self.fetched.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            offline: self.offline.load(Ordering::Relaxed),
        }
    }

    /// Take everything recorded so far and reset.
    ///
    /// Concurrent fetches record in completion order; entries are sorted by
    /// package (stable, so attempts keep their order) to make reports
    /// reproducible.
    pub fn drain(&self) -> FetchReport {
        let mut network_errors = std::mem::take(&mut *self.network_errors.lock());
        let mut warnings = std::mem::take(&mut *self.warnings.lock());
        let mut errors = std::mem::take(&mut *self.errors.lock());
        let mut malformed = std::mem::take(&mut *self.malformed.lock());

        network_errors.sort_by(|a, b| a.package.cmp(&b.package));
        warnings.sort_by(|a, b| a.package.cmp(&b.package));
        errors.sort_by(|a, b| a.package.cmp(&b.package));
        malformed.sort_by(|a, b| a.package.cmp(&b.package));

        let counters = FetchCounters {
            fetched: self.fetched.swap(0, Ordering::Relaxed),
            failed: self.failed.swap(0, Ordering::Relaxed),
            skipped: self.skipped.swap(0, Ordering::Relaxed),
            fallbacks: self.fallbacks.swap(0, Ordering::Relaxed),
            offline: self.offline.swap(0, Ordering::Relaxed),
        };

        FetchReport {
            network_errors,
            warnings,
            errors,
            malformed,
            counters,
        }
    }
}
