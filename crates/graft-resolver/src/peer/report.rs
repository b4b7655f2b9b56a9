//! Analysis results: summary counts, edge cases and recommendations

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use graft_core::types::{
    DependencyMap, Diagnostic, DiagnosticCategory, FallbackReason, PackageManifest, PeerConflict, PeerResolution,
};
use graft_registry::{CacheStats, FetchReport, MalformedPackage, NetworkErrorEntry};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Per-analysis counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSummary {
    pub total_packages: usize,
    pub processed_packages: usize,
    pub failed_packages: usize,
    pub skipped_packages: usize,
    pub network_errors: usize,
    pub malformed_packages: usize,
    pub fallback_packages: usize,
    pub offline_packages: usize,
    pub packages_with_peers: usize,
    pub conflicts: usize,
    pub resolutions: usize,
    /// `(processed - failed) / total`, e.g. `"87.5%"`
    pub success_rate: String,
}

/// Network failures of one package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkFailureGroup {
    pub package: String,
    pub attempts: usize,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub last_error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackPackage {
    pub name: String,
    pub version: String,
    pub reason: Option<FallbackReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Packages that did not get normal treatment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeCaseReport {
    pub fallback_packages: Vec<FallbackPackage>,
    pub offline_packages: Vec<String>,
    pub invalid_packages: Vec<MalformedPackage>,
    pub network_failures: Vec<NetworkFailureGroup>,
}

impl EdgeCaseReport {
    pub fn is_empty(&self) -> bool {
        self.fallback_packages.is_empty()
            && self.offline_packages.is_empty()
            && self.invalid_packages.is_empty()
            && self.network_failures.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub category: DiagnosticCategory,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// False only when orchestration itself failed
    pub success: bool,
    /// The analyzed dependency set, unchanged
    pub dependencies: DependencyMap,
    /// Manifests in dependency order
    pub manifests: IndexMap<String, PackageManifest>,
    /// Declared peer requirements per package
    pub peer_requirements: IndexMap<String, BTreeMap<String, String>>,
    pub conflicts: Vec<PeerConflict>,
    pub resolutions: Vec<PeerResolution>,
    pub warnings: Vec<Diagnostic>,
    pub errors: Vec<Diagnostic>,
    pub network_errors: Vec<NetworkErrorEntry>,
    pub summary: AnalysisSummary,
    pub edge_cases: EdgeCaseReport,
    pub recommendations: Vec<Recommendation>,
    /// Cache sizes and hit counts. Kept out of the summary, which stays
    /// identical between a cold and a warm run.
    #[serde(default)]
    pub cache: CacheStats,
    #[serde(skip)]
    pub duration: Duration,
}

impl AnalysisResult {
    /// Resolutions safe to apply without review
    pub fn auto_applicable(&self) -> impl Iterator<Item = &PeerResolution> {
        self.resolutions.iter().filter(|resolution| resolution.is_auto_applicable())
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

/// Format `(processed - failed) / total` as a percentage
pub fn success_rate(processed: usize, failed: usize, total: usize) -> String {
    if total == 0 {
        return "100%".to_string();
    }
    let succeeded = processed.saturating_sub(failed) as f64;
    format!("{:.1}%", succeeded / total as f64 * 100.0)
}

/// Group network errors by package, keeping first and last occurrence
pub fn group_network_failures(entries: &[NetworkErrorEntry]) -> Vec<NetworkFailureGroup> {
    let mut groups: BTreeMap<&str, NetworkFailureGroup> = BTreeMap::new();
    for entry in entries {
        groups
            .entry(entry.package.as_str())
            .and_modify(|group| {
                group.attempts += 1;
                if entry.timestamp < group.first_seen {
                    group.first_seen = entry.timestamp;
                }
                if entry.timestamp >= group.last_seen {
                    group.last_seen = entry.timestamp;
                    group.last_error = entry.message.clone();
                }
            })
            .or_insert_with(|| NetworkFailureGroup {
                package: entry.package.clone(),
                attempts: 1,
                first_seen: entry.timestamp,
                last_seen: entry.timestamp,
                last_error: entry.message.clone(),
            });
    }
    groups.into_values().collect()
}

pub fn edge_cases(manifests: &IndexMap<String, PackageManifest>, fetch: &FetchReport) -> EdgeCaseReport {
    let fallback_packages = manifests
        .values()
        .filter(|manifest| manifest.fallback)
        .map(|manifest| FallbackPackage {
            name: manifest.name.clone(),
            version: manifest.version.clone(),
            reason: manifest.fallback_reason,
            error: manifest.fetch_error.clone(),
        })
        .collect();
    let offline_packages = manifests
        .values()
        .filter(|manifest| manifest.offline)
        .map(|manifest| manifest.name.clone())
        .collect();

    EdgeCaseReport {
        fallback_packages,
        offline_packages,
        invalid_packages: fetch.malformed.clone(),
        network_failures: group_network_failures(&fetch.network_errors),
    }
}

/// Advice for each edge-case category that actually occurred
pub fn recommendations(summary: &AnalysisSummary) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();
    let mut push = |category, message: String| recommendations.push(Recommendation { category, message });

    if summary.fallback_packages > 0 {
        push(
            DiagnosticCategory::Fallback,
            format!(
                "{} package(s) were analyzed with fallback metadata; their peer requirements may be incomplete",
                summary.fallback_packages
            ),
        );
    }
    if summary.network_errors > 0 {
        push(
            DiagnosticCategory::Network,
            format!(
                "{} network error(s) talking to the registry; check connectivity or enable the persistent cache",
                summary.network_errors
            ),
        );
    }
    if summary.malformed_packages > 0 {
        push(
            DiagnosticCategory::Malformed,
            format!(
                "{} package(s) had invalid names or unusable manifests; verify the declared package names",
                summary.malformed_packages
            ),
        );
    }
    if summary.offline_packages > 0 {
        push(
            DiagnosticCategory::Offline,
            "Offline mode: peer requirements were not checked against the registry; rerun online before installing"
                .to_string(),
        );
    }
    recommendations
}
