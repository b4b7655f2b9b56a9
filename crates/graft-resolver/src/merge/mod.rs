//! Dependency Merger
//!
//! Combines the packages declared by several templates into one
//! [`DependencySet`]. Direct conflicts are settled by a [`MergeStrategy`],
//! the merged set is checked against known incompatibilities, and the peer
//! analyzer's high-confidence fixes are applied on top.

use graft_config::{GraftConfig, MergeSettings};
use graft_core::types::{
    Confidence, DependencyKind, DependencySet, Diagnostic, DiagnosticCategory, MergeStrategy, ResolutionAction,
    Severity, TemplatePackages,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::peer::{AnalysisResult, PeerDependencyAnalyzer, Recommendation};
use crate::semver::{analyze_compatibility, distance_severity, resolve_conflict, CompatibilityReport, StrategyOutcome};
use crate::ResolverResult;

pub mod rules;

pub use rules::{check_rules, known_rules, CompatibilityIssue, CompatibilityRule, RuleCheck};

/// One declaration of a conflicting package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSource {
    pub version: String,
    /// Template that declared it
    pub source: String,
}

/// Two templates declared different ranges for the same package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeConflict {
    pub package: String,
    pub kind: DependencyKind,
    /// Previous occurrence first, then the new one
    pub versions: Vec<VersionSource>,
    /// Range kept in the merged set
    pub resolution: String,
    pub severity: Severity,
    pub confidence: Confidence,
    pub compatibility: CompatibilityReport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
    pub strategy: MergeStrategy,
    /// The strategy did not pick; the later declaration was kept
    pub requires_manual_review: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    /// Picked by the merge strategy
    Strategy,
    /// Later declaration kept because the strategy could not pick
    Fallback,
    /// Applied from peer dependency analysis
    PeerAnalysis,
}

/// A change the merger made to the merged set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResolution {
    pub package: String,
    pub kind: DependencyKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_version: Option<String>,
    pub version: String,
    pub source: ResolutionSource,
    pub confidence: Confidence,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeSummary {
    pub total_packages: usize,
    pub dependencies: usize,
    pub dev_dependencies: usize,
    pub peer_dependencies: usize,
    pub conflicts: usize,
    pub warnings: usize,
    pub resolutions: usize,
    pub compatibility_issues: usize,
    pub peer_issues: usize,
    pub high_confidence: usize,
    pub medium_confidence: usize,
    pub low_confidence: usize,
    pub high_severity_conflicts: usize,
    pub manual_resolutions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResult {
    pub success: bool,
    pub strategy: MergeStrategy,
    pub dependencies: DependencySet,
    pub conflicts: Vec<MergeConflict>,
    pub resolutions: Vec<MergeResolution>,
    pub warnings: Vec<Diagnostic>,
    pub errors: Vec<Diagnostic>,
    pub compatibility_issues: Vec<CompatibilityIssue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_analysis: Option<AnalysisResult>,
    pub summary: MergeSummary,
    pub recommendations: Vec<Recommendation>,
}

impl MergeResult {
    /// Whether the install should tolerate unmet peer requirements
    pub fn needs_relaxed_peer_deps(&self) -> bool {
        self.summary.peer_issues > 0
    }

    /// The merged sets in package-manifest form; empty sets are omitted
    pub fn install_manifest(&self) -> serde_json::Value {
        let mut manifest = serde_json::Map::new();
        for kind in DependencyKind::ALL {
            let map = self.dependencies.get(kind);
            if map.is_empty() {
                continue;
            }
            let entries = map
                .iter()
                .map(|(name, range)| (name.clone(), serde_json::Value::String(range.clone())))
                .collect();
            manifest.insert(kind.field_name().to_string(), serde_json::Value::Object(entries));
        }
        serde_json::Value::Object(manifest)
    }
}

/// Merge state while templates are folded in
#[derive(Default)]
struct MergeState {
    dependencies: DependencySet,
    /// Template that declared the current winner of each entry
    provenance: IndexMap<(DependencyKind, String), String>,
    conflicts: Vec<MergeConflict>,
    resolutions: Vec<MergeResolution>,
    warnings: Vec<Diagnostic>,
}

pub struct DependencyMerger {
    settings: MergeSettings,
    analyzer: Option<PeerDependencyAnalyzer>,
    rules: Vec<CompatibilityRule>,
}

impl DependencyMerger {
    /// Merger without peer analysis
    pub fn new(settings: MergeSettings) -> Self {
        Self {
            settings,
            analyzer: None,
            rules: known_rules().to_vec(),
        }
    }

    pub fn with_analyzer(mut self, analyzer: PeerDependencyAnalyzer) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn with_rules(mut self, rules: Vec<CompatibilityRule>) -> Self {
        self.rules = rules;
        self
    }

    pub async fn from_config(config: &GraftConfig) -> ResolverResult<Self> {
        let merger = Self::new(config.merge.clone());
        if !config.merge.analyze_peers {
            return Ok(merger);
        }
        Ok(merger.with_analyzer(PeerDependencyAnalyzer::from_config(config).await?))
    }

    pub fn settings(&self) -> &MergeSettings {
        &self.settings
    }

    pub fn analyzer(&self) -> Option<&PeerDependencyAnalyzer> {
        self.analyzer.as_ref()
    }

    /// Merge with the configured strategy
    pub async fn merge_with_defaults(&self, templates: &[TemplatePackages]) -> ResolverResult<MergeResult> {
        self.merge(templates, self.settings.strategy).await
    }

    /// Merge template declarations in order.
    ///
    /// Only a failed peer analysis is returned as an error; everything else
    /// is reported in the result.
    pub async fn merge(&self, templates: &[TemplatePackages], strategy: MergeStrategy) -> ResolverResult<MergeResult> {
        let mut state = MergeState::default();

        for template in templates {
            for kind in DependencyKind::ALL {
                for declared in template.declared(kind) {
                    merge_one(&mut state, kind, &declared.name, declared.version_range.trim(), &template.id, strategy);
                }
            }
        }
        debug!(
            templates = templates.len(),
            packages = state.dependencies.total(),
            conflicts = state.conflicts.len(),
            "templates merged"
        );

        let compatibility_issues = if self.settings.check_known_incompatibilities {
            check_rules(&self.rules, &state.dependencies.runtime_and_dev())
        } else {
            Vec::new()
        };
        for issue in &compatibility_issues {
            warn!(rule = %issue.rule, "{}", issue.message);
            state.warnings.push(
                Diagnostic::new(DiagnosticCategory::Compatibility, issue.severity, issue.message.clone())
                    .for_package(issue.packages.first().cloned().unwrap_or_default()),
            );
        }

        let mut errors = Vec::new();
        let mut peer_issues = 0;
        let peer_analysis = match (&self.analyzer, self.settings.analyze_peers) {
            (Some(analyzer), true) => {
                let analysis = analyzer.analyze(&state.dependencies.runtime_and_dev()).await?;
                peer_issues = self.apply_peer_resolutions(&mut state, &analysis);
                errors.extend(analysis.errors.iter().cloned());
                Some(analysis)
            },
            _ => None,
        };

        let summary = summarize(&state, compatibility_issues.len(), peer_issues);
        let recommendations = recommendations(&summary);
        let success = peer_analysis.as_ref().map_or(true, |analysis| analysis.success);

        info!(
            strategy = %strategy,
            packages = summary.total_packages,
            conflicts = summary.conflicts,
            resolutions = summary.resolutions,
            peer_issues = summary.peer_issues,
            "dependency merge complete"
        );

        Ok(MergeResult {
            success,
            strategy,
            dependencies: state.dependencies,
            conflicts: state.conflicts,
            resolutions: state.resolutions,
            warnings: state.warnings,
            errors,
            compatibility_issues,
            peer_analysis,
            summary,
            recommendations,
        })
    }

    /// Apply auto-applicable peer resolutions; the rest become warnings.
    /// Returns the number of peer issues left for a human.
    fn apply_peer_resolutions(&self, state: &mut MergeState, analysis: &AnalysisResult) -> usize {
        let mut peer_issues = 0;

        for resolution in &analysis.resolutions {
            let target = resolution.version.as_deref();
            if self.settings.auto_apply_peer_resolutions && resolution.is_auto_applicable() {
                if let Some(version) = target {
                    if apply_peer_change(state, resolution.action, &resolution.package, version, &resolution.reason) {
                        continue;
                    }
                }
            }

            peer_issues += 1;
            let severity = match resolution.confidence {
                Confidence::High => Severity::High,
                Confidence::Medium => Severity::Medium,
                Confidence::Low => Severity::Low,
            };
            let message = match (resolution.action, target) {
                (ResolutionAction::Warn, _) | (_, None) => resolution.reason.clone(),
                (action, Some(version)) => format!(
                    "{} (suggested: {} {}@{})",
                    resolution.reason,
                    action.as_str(),
                    resolution.package,
                    version
                ),
            };
            state.warnings.push(
                Diagnostic::new(DiagnosticCategory::PeerDependency, severity, message)
                    .for_package(resolution.required_by.clone()),
            );
        }

        peer_issues
    }
}

impl std::fmt::Debug for DependencyMerger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyMerger")
            .field("settings", &self.settings)
            .field("analyzer", &self.analyzer)
            .field("rules", &self.rules.len())
            .finish()
    }
}

fn merge_one(
    state: &mut MergeState,
    kind: DependencyKind,
    name: &str,
    incoming: &str,
    source: &str,
    strategy: MergeStrategy,
) {
    let key = (kind, name.to_string());
    let Some(existing) = state.dependencies.get(kind).get(name).cloned() else {
        state.dependencies.get_mut(kind).insert(name.to_string(), incoming.to_string());
        state.provenance.insert(key, source.to_string());
        return;
    };
    if existing == incoming {
        return;
    }

    let previous_source = state.provenance.get(&key).cloned().unwrap_or_default();
    let versions = vec![
        VersionSource {
            version: existing.clone(),
            source: previous_source.clone(),
        },
        VersionSource {
            version: incoming.to_string(),
            source: source.to_string(),
        },
    ];
    let compatibility = analyze_compatibility(&existing, incoming);

    let conflict = match resolve_conflict(&existing, incoming, strategy) {
        StrategyOutcome::Resolved(picked) => {
            debug!(package = name, kind = %kind, picked = %picked.version, "conflict resolved");
            let winner_source = if picked.version == incoming {
                source.to_string()
            } else {
                previous_source
            };
            state.resolutions.push(MergeResolution {
                package: name.to_string(),
                kind,
                from_version: Some(existing.clone()),
                version: picked.version.clone(),
                source: ResolutionSource::Strategy,
                confidence: picked.confidence,
                reason: format!(
                    "{} strategy chose {} over {}",
                    strategy,
                    picked.version,
                    other_of(&picked.version, &existing, incoming)
                ),
            });
            if picked.confidence == Confidence::Low {
                state.warnings.push(
                    Diagnostic::new(
                        DiagnosticCategory::Conflict,
                        picked.severity,
                        format!(
                            "low-confidence resolution of {}: {} chosen from {} and {}",
                            name, picked.version, existing, incoming
                        ),
                    )
                    .for_package(name),
                );
            }
            state.dependencies.get_mut(kind).insert(name.to_string(), picked.version.clone());
            state.provenance.insert(key, winner_source);
            MergeConflict {
                package: name.to_string(),
                kind,
                versions,
                resolution: picked.version,
                severity: picked.severity,
                confidence: picked.confidence,
                compatibility,
                recommendation: picked.recommendation,
                strategy,
                requires_manual_review: false,
            }
        },
        StrategyOutcome::ManualResolutionRequired { reason } | StrategyOutcome::Unresolvable { reason } => {
            warn!(package = name, kind = %kind, %reason, "keeping later declaration {}", incoming);
            state.warnings.push(
                Diagnostic::new(
                    DiagnosticCategory::Conflict,
                    Severity::High,
                    format!(
                        "manual resolution required for {}: {}; using {} from {}",
                        name, reason, incoming, source
                    ),
                )
                .for_package(name),
            );
            state.resolutions.push(MergeResolution {
                package: name.to_string(),
                kind,
                from_version: Some(existing.clone()),
                version: incoming.to_string(),
                source: ResolutionSource::Fallback,
                confidence: Confidence::Low,
                reason: format!("kept the later declaration from {}", source),
            });
            state.dependencies.get_mut(kind).insert(name.to_string(), incoming.to_string());
            state.provenance.insert(key, source.to_string());
            MergeConflict {
                package: name.to_string(),
                kind,
                versions,
                resolution: incoming.to_string(),
                severity: distance_severity(&existing, incoming),
                confidence: Confidence::Low,
                compatibility,
                recommendation: Some(format!("Choose a version of {} manually: {}", name, reason)),
                strategy,
                requires_manual_review: true,
            }
        },
    };
    state.conflicts.push(conflict);
}

fn other_of<'a>(picked: &str, left: &'a str, right: &'a str) -> &'a str {
    if picked == left {
        right
    } else {
        left
    }
}

/// Add or update a runtime/dev entry. Returns false when the change could
/// not be applied as proposed.
fn apply_peer_change(
    state: &mut MergeState,
    action: ResolutionAction,
    package: &str,
    version: &str,
    reason: &str,
) -> bool {
    let current = [DependencyKind::Normal, DependencyKind::Dev]
        .into_iter()
        .find_map(|kind| state.dependencies.get(kind).get(package).map(|range| (kind, range.clone())));

    let (kind, from_version) = match (action, current) {
        (ResolutionAction::Add, None) => (DependencyKind::Normal, None),
        // Another package already asked for the same range
        (ResolutionAction::Add, Some((_, range))) if range == version => return true,
        (ResolutionAction::Update, Some((kind, range))) => (kind, Some(range)),
        _ => return false,
    };

    info!(package, version, action = action.as_str(), "applying peer resolution");
    state.dependencies.get_mut(kind).insert(package.to_string(), version.to_string());
    state.resolutions.push(MergeResolution {
        package: package.to_string(),
        kind,
        from_version,
        version: version.to_string(),
        source: ResolutionSource::PeerAnalysis,
        confidence: Confidence::High,
        reason: reason.to_string(),
    });
    true
}

fn summarize(state: &MergeState, compatibility_issues: usize, peer_issues: usize) -> MergeSummary {
    let count = |confidence| {
        state
            .resolutions
            .iter()
            .filter(|resolution| resolution.confidence == confidence)
            .count()
    };
    MergeSummary {
        total_packages: state.dependencies.total(),
        dependencies: state.dependencies.dependencies.len(),
        dev_dependencies: state.dependencies.dev_dependencies.len(),
        peer_dependencies: state.dependencies.peer_dependencies.len(),
        conflicts: state.conflicts.len(),
        warnings: state.warnings.len(),
        resolutions: state.resolutions.len(),
        compatibility_issues,
        peer_issues,
        high_confidence: count(Confidence::High),
        medium_confidence: count(Confidence::Medium),
        low_confidence: count(Confidence::Low),
        high_severity_conflicts: state
            .conflicts
            .iter()
            .filter(|conflict| conflict.severity == Severity::High)
            .count(),
        manual_resolutions: state
            .conflicts
            .iter()
            .filter(|conflict| conflict.requires_manual_review)
            .count(),
    }
}

pub fn recommendations(summary: &MergeSummary) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();
    let mut push = |category, message: String| recommendations.push(Recommendation { category, message });

    if summary.low_confidence > 0 {
        push(
            DiagnosticCategory::Conflict,
            format!("Review {} low-confidence resolution(s) before installing", summary.low_confidence),
        );
    }
    if summary.manual_resolutions > 0 {
        push(
            DiagnosticCategory::Conflict,
            format!(
                "{} conflict(s) need a manual decision; the later template's version was used",
                summary.manual_resolutions
            ),
        );
    }
    if summary.compatibility_issues > 0 {
        push(
            DiagnosticCategory::Compatibility,
            format!(
                "{} known compatibility issue(s) found; align the listed packages",
                summary.compatibility_issues
            ),
        );
    }
    if summary.peer_issues > 0 {
        push(
            DiagnosticCategory::PeerDependency,
            format!(
                "{} peer dependency issue(s) remain; install with relaxed peer dependency checks or fix them manually",
                summary.peer_issues
            ),
        );
    }
    if summary.high_severity_conflicts > 0 {
        push(
            DiagnosticCategory::Conflict,
            format!(
                "{} high-severity conflict(s) span major versions; test thoroughly",
                summary.high_severity_conflicts
            ),
        );
    }
    recommendations
}
