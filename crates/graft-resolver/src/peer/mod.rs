//! Peer Dependency Analyzer
//!
//! Fetches the manifest of every package in a dependency set, collects their
//! peer requirements, reports the requirements the set does not meet, and
//! proposes one resolution per conflict.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use graft_config::{AnalyzerSettings, GraftConfig};
use graft_core::error::GraftError;
use graft_core::types::{
    Confidence, DependencyMap, Diagnostic, DiagnosticCategory, PackageManifest, PeerConflict, PeerResolution,
    ResolutionAction, Severity,
};
use graft_registry::{FetchReport, MetadataCache, MetadataResolver};
use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::semver::{best_compatible_version, check_satisfies};
use crate::ResolverResult;

pub mod progress;
pub mod report;

pub use progress::{AnalysisPhase, ProgressEvent, ProgressObserver, TracingObserver};
pub use report::{AnalysisResult, AnalysisSummary, EdgeCaseReport, FallbackPackage, NetworkFailureGroup, Recommendation};

pub struct PeerDependencyAnalyzer {
    resolver: MetadataResolver,
    settings: AnalyzerSettings,
    observers: Vec<Arc<dyn ProgressObserver>>,
    phase: Mutex<AnalysisPhase>,
}

impl PeerDependencyAnalyzer {
    pub fn new(resolver: MetadataResolver, settings: AnalyzerSettings) -> Self {
        Self {
            resolver,
            settings,
            observers: Vec::new(),
            phase: Mutex::new(AnalysisPhase::Idle),
        }
    }

    /// Build the cache, registry backend and resolver the configuration
    /// describes, loading the persistent cache if there is one.
    pub async fn from_config(config: &GraftConfig) -> ResolverResult<Self> {
        config.validate()?;

        let cache = Arc::new(MetadataCache::from_settings(&config.cache));
        match cache.load().await {
            Ok(loaded) => debug!(entries = loaded, "metadata cache loaded"),
            Err(e) => warn!(error = %e, "failed to load metadata cache, starting empty"),
        }

        let resolver = MetadataResolver::from_settings(&config.registry, cache)?;
        Ok(Self::new(resolver, config.analyzer.clone()))
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Phase of the current or most recent analysis
    pub fn phase(&self) -> AnalysisPhase {
        *self.phase.lock()
    }

    pub fn resolver(&self) -> &MetadataResolver {
        &self.resolver
    }

    pub fn settings(&self) -> &AnalyzerSettings {
        &self.settings
    }

    fn enter(&self, phase: AnalysisPhase, message: impl Into<String>, processed: usize, total: usize) {
        *self.phase.lock() = phase;
        let event = ProgressEvent::new(phase, message, processed, total);
        debug!(phase = %phase, processed, total, "analysis progress");
        for observer in &self.observers {
            observer.on_progress(&event);
        }
    }

    /// Analyze the peer requirements of every package in `dependencies`.
    ///
    /// Per-package failures degrade to fallback manifests and diagnostics;
    /// only orchestration failures are returned as errors, after the cache
    /// has been persisted.
    pub async fn analyze(&self, dependencies: &DependencyMap) -> ResolverResult<AnalysisResult> {
        let started = Instant::now();

        let outcome = match self.settings.timeout() {
            Some(limit) => match tokio::time::timeout(limit, self.run(dependencies)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(GraftError::AnalysisPhase {
                    phase: self.phase().to_string(),
                    message: format!("analysis timed out after {}ms", limit.as_millis()),
                }),
            },
            None => self.run(dependencies).await,
        };

        match outcome {
            Ok(mut result) => {
                if let Err(e) = self.resolver.cache().persist().await {
                    error!(error = %e, "failed to persist metadata cache");
                    result.success = false;
                    result.errors.push(Diagnostic::new(
                        DiagnosticCategory::Cache,
                        Severity::Medium,
                        format!("failed to persist metadata cache: {}", e),
                    ));
                }
                result.cache = self.resolver.cache().stats();
                result.duration = started.elapsed();
                self.enter(
                    AnalysisPhase::Complete,
                    format!(
                        "analyzed {} package(s), {} conflict(s)",
                        result.summary.total_packages, result.summary.conflicts
                    ),
                    result.summary.total_packages,
                    result.summary.total_packages,
                );
                info!(
                    packages = result.summary.total_packages,
                    conflicts = result.summary.conflicts,
                    resolutions = result.summary.resolutions,
                    success_rate = %result.summary.success_rate,
                    "peer dependency analysis complete"
                );
                Ok(result)
            },
            Err(e) => {
                let failed_in = self.phase();
                error!(phase = %failed_in, error = %e, "peer dependency analysis failed");
                if let Err(persist_error) = self.resolver.cache().persist().await {
                    warn!(error = %persist_error, "failed to persist metadata cache after error");
                }
                // Leave the resolver clean for the next run
                let partial = self.resolver.diagnostics().drain();
                let packages = reported_packages(&partial);
                if !packages.is_empty() {
                    warn!(
                        network_errors = partial.network_errors.len(),
                        warnings = partial.warnings.len(),
                        errors = partial.errors.len(),
                        ?packages,
                        "discarding fetch diagnostics of failed analysis"
                    );
                }
                self.enter(AnalysisPhase::Error, e.to_string(), 0, dependencies.len());
                Err(match e {
                    GraftError::AnalysisPhase { .. } => e,
                    other => GraftError::AnalysisPhase {
                        phase: failed_in.to_string(),
                        message: other.to_string(),
                    },
                })
            },
        }
    }

    async fn run(&self, dependencies: &DependencyMap) -> ResolverResult<AnalysisResult> {
        let total = dependencies.len();
        self.enter(AnalysisPhase::Initializing, "starting peer dependency analysis", 0, total);
        if self.settings.batch_size == 0 {
            return Err(GraftError::ConfigValidation {
                field: "analyzer.batch_size".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        // Counters from an earlier run must not leak into this one
        self.resolver.diagnostics().drain();

        let manifests = self.fetch_manifests(dependencies).await;

        self.enter(AnalysisPhase::Extracting, "collecting peer requirements", 0, manifests.len());
        let peer_requirements = extract_peer_requirements(&manifests);

        self.enter(AnalysisPhase::Analyzing, "checking peer requirements", 0, peer_requirements.len());
        let conflicts = detect_conflicts(dependencies, &peer_requirements);

        self.enter(AnalysisPhase::Resolving, "proposing resolutions", 0, conflicts.len());
        let resolutions: Vec<PeerResolution> = conflicts.iter().filter_map(resolve_peer_conflict).collect();

        self.enter(AnalysisPhase::Finalizing, "building report", total, total);
        let fetch = self.resolver.diagnostics().drain();

        let mut warnings = fetch.warnings.clone();
        warnings.extend(
            conflicts
                .iter()
                .filter(|conflict| conflict.kind == graft_core::types::ConflictKind::VersionCheckFailed)
                .map(|conflict| {
                    Diagnostic::new(
                        DiagnosticCategory::PeerDependency,
                        Severity::Low,
                        format!(
                            "could not compare {} '{}' with required '{}'",
                            conflict.peer_dependency,
                            conflict.installed_version.as_deref().unwrap_or_default(),
                            conflict.required_version
                        ),
                    )
                    .for_package(conflict.package.clone())
                }),
        );

        let edge_cases = report::edge_cases(&manifests, &fetch);
        let summary = AnalysisSummary {
            total_packages: total,
            processed_packages: manifests.len(),
            failed_packages: fetch.counters.failed,
            skipped_packages: fetch.counters.skipped,
            network_errors: fetch.network_errors.len(),
            malformed_packages: fetch.malformed.len(),
            fallback_packages: edge_cases.fallback_packages.len(),
            offline_packages: edge_cases.offline_packages.len(),
            packages_with_peers: peer_requirements.len(),
            conflicts: conflicts.len(),
            resolutions: resolutions.len(),
            success_rate: report::success_rate(manifests.len(), fetch.counters.failed, total),
        };
        let recommendations = report::recommendations(&summary);

        Ok(AnalysisResult {
            success: true,
            dependencies: dependencies.clone(),
            manifests,
            peer_requirements,
            conflicts,
            resolutions,
            warnings,
            errors: fetch.errors,
            network_errors: fetch.network_errors,
            summary,
            edge_cases,
            recommendations,
            cache: Default::default(),
            duration: Default::default(),
        })
    }

    /// Resolve every manifest in bounded concurrent batches, keeping
    /// dependency order in the result
    async fn fetch_manifests(&self, dependencies: &DependencyMap) -> IndexMap<String, PackageManifest> {
        let total = dependencies.len();
        let entries: Vec<(&String, &String)> = dependencies.iter().collect();
        let mut manifests = IndexMap::with_capacity(total);
        self.enter(AnalysisPhase::Fetching, "fetching package metadata", 0, total);

        for (index, batch) in entries.chunks(self.settings.batch_size).enumerate() {
            if index > 0 && !self.settings.batch_delay().is_zero() {
                tokio::time::sleep(self.settings.batch_delay()).await;
            }

            let fetched = futures::future::join_all(
                batch
                    .iter()
                    .map(|(name, range)| self.resolver.resolve(name.as_str(), range.as_str())),
            )
            .await;

            for ((name, _), manifest) in batch.iter().zip(fetched) {
                manifests.insert((*name).clone(), manifest);
            }
            self.enter(
                AnalysisPhase::Fetching,
                format!("fetched {} of {} package(s)", manifests.len(), total),
                manifests.len(),
                total,
            );
        }

        manifests
    }
}

impl std::fmt::Debug for PeerDependencyAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerDependencyAnalyzer")
            .field("resolver", &self.resolver)
            .field("settings", &self.settings)
            .field("observers", &self.observers.len())
            .field("phase", &self.phase())
            .finish()
    }
}

/// Packages named anywhere in a fetch report, deduplicated in report order
fn reported_packages(report: &FetchReport) -> Vec<&str> {
    let mut packages: Vec<&str> = Vec::new();
    let named = report
        .network_errors
        .iter()
        .map(|entry| entry.package.as_str())
        .chain(report.errors.iter().filter_map(|d| d.package.as_deref()))
        .chain(report.warnings.iter().filter_map(|d| d.package.as_deref()));
    for package in named {
        if !packages.contains(&package) {
            packages.push(package);
        }
    }
    packages
}

/// Non-empty peer requirement maps, in manifest order
pub fn extract_peer_requirements(
    manifests: &IndexMap<String, PackageManifest>,
) -> IndexMap<String, BTreeMap<String, String>> {
    manifests
        .iter()
        .filter(|(_, manifest)| manifest.has_peers())
        .map(|(name, manifest)| (name.clone(), manifest.peer_dependencies.clone()))
        .collect()
}

/// Compare every peer requirement with the dependency set.
///
/// Conflicts follow package order, then peer name order.
pub fn detect_conflicts(
    dependencies: &DependencyMap,
    peer_requirements: &IndexMap<String, BTreeMap<String, String>>,
) -> Vec<PeerConflict> {
    let mut conflicts = Vec::new();
    for (package, peers) in peer_requirements {
        for (peer, required) in peers {
            let Some(installed) = dependencies.get(peer) else {
                conflicts.push(PeerConflict::missing(package, peer, required));
                continue;
            };
            match check_satisfies(installed, required) {
                Ok(true) => {},
                Ok(false) => conflicts.push(PeerConflict::mismatch(package, peer, required, installed)),
                Err(e) => conflicts.push(PeerConflict::check_failed(
                    package,
                    peer,
                    required,
                    installed,
                    e.to_string(),
                )),
            }
        }
    }
    conflicts
}

/// One resolution per conflict; `None` when no compatible version exists
pub fn resolve_peer_conflict(conflict: &PeerConflict) -> Option<PeerResolution> {
    use graft_core::types::ConflictKind;

    match conflict.kind {
        ConflictKind::MissingPeer => Some(PeerResolution {
            action: ResolutionAction::Add,
            package: conflict.peer_dependency.clone(),
            from_version: None,
            version: Some(conflict.required_version.clone()),
            confidence: Confidence::High,
            reason: format!(
                "{} requires peer {}@{}",
                conflict.package, conflict.peer_dependency, conflict.required_version
            ),
            required_by: conflict.package.clone(),
        }),
        ConflictKind::VersionMismatch => {
            let target = best_compatible_version(&conflict.required_version)?;
            Some(PeerResolution {
                action: ResolutionAction::Update,
                package: conflict.peer_dependency.clone(),
                from_version: conflict.installed_version.clone(),
                version: Some(target),
                confidence: Confidence::Medium,
                reason: format!(
                    "{} requires {}@{} but {} is declared",
                    conflict.package,
                    conflict.peer_dependency,
                    conflict.required_version,
                    conflict.installed_version.as_deref().unwrap_or("nothing")
                ),
                required_by: conflict.package.clone(),
            })
        },
        ConflictKind::VersionCheckFailed => Some(PeerResolution {
            action: ResolutionAction::Warn,
            package: conflict.peer_dependency.clone(),
            from_version: conflict.installed_version.clone(),
            version: None,
            confidence: Confidence::Low,
            reason: format!(
                "could not verify {}@{} against {}'s requirement {}",
                conflict.peer_dependency,
                conflict.installed_version.as_deref().unwrap_or("?"),
                conflict.package,
                conflict.required_version
            ),
            required_by: conflict.package.clone(),
        }),
    }
}
