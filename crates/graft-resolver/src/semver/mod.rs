//! Version Compatibility Engine
//!
//! Pure functions over version strings as they appear in manifests:
//! satisfaction checks, pairwise compatibility analysis, and strategy-based
//! resolution of two conflicting ranges. Nothing here performs I/O.

use std::cmp::Ordering;

use graft_core::error::GraftError;
use graft_core::types::{Confidence, MergeStrategy, RangeKind, Severity, Version, VersionError, VersionReq};
use serde::{Deserialize, Serialize};

use crate::ResolverResult;

/// A declared version or range, reduced to what comparisons need
#[derive(Debug, Clone)]
struct Declared {
    raw: String,
    req: VersionReq,
    /// Lowest version the declaration admits
    floor: Version,
}

impl Declared {
    fn parse(input: &str) -> Option<Self> {
        let raw = input.trim();
        let req = VersionReq::parse(raw).ok()?;
        let floor = match Version::parse(raw) {
            Ok(version) => version,
            Err(_) => req.min_version()?,
        };
        Some(Self {
            raw: raw.to_string(),
            req,
            floor,
        })
    }

    fn specificity(&self) -> u8 {
        self.req.kind().specificity()
    }
}

/// Outcome of comparing two ranges
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompatibilityReport {
    /// Same major version, or one side satisfies the other
    pub compatible: bool,
    /// The lowest version of one side satisfies the other side
    pub satisfies: bool,
    /// Range both sides accept, if any and if both parse
    pub intersection: Option<String>,
    /// Low for equal majors, medium one major apart, high otherwise
    pub risk: Severity,
}

/// Version picked by a strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyResolution {
    pub version: String,
    pub confidence: Confidence,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
}

/// Result of applying a merge strategy to two ranges
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyOutcome {
    Resolved(StrategyResolution),
    /// The `manual` strategy never picks a version
    ManualResolutionRequired { reason: String },
    /// The ranges cannot be reconciled under the strategy
    Unresolvable { reason: String },
}

impl StrategyOutcome {
    pub fn resolved(&self) -> Option<&StrategyResolution> {
        match self {
            StrategyOutcome::Resolved(resolution) => Some(resolution),
            _ => None,
        }
    }

    /// Convert into a result for callers that cannot continue without a pick
    pub fn into_result(self, package: &str, left: &str, right: &str) -> ResolverResult<StrategyResolution> {
        match self {
            StrategyOutcome::Resolved(resolution) => Ok(resolution),
            StrategyOutcome::ManualResolutionRequired { reason } | StrategyOutcome::Unresolvable { reason } => {
                Err(GraftError::UnresolvableVersionConflict {
                    package: package.to_string(),
                    left: left.to_string(),
                    right: right.to_string(),
                    reason,
                })
            },
        }
    }
}

/// Check whether `version` satisfies `range`.
///
/// `version` may be loose (`v1.2`, `^1.2.0`) and is coerced to a concrete
/// version first. Anything that cannot be interpreted yields `false`.
pub fn satisfies(version: &str, range: &str) -> bool {
    let version = match Version::parse(version) {
        Ok(version) => version,
        Err(_) => match Version::coerce(version) {
            Some(version) => version,
            None => return false,
        },
    };
    VersionReq::parse(range).map_or(false, |req| req.matches(&version))
}

/// Check whether the installed declaration meets a peer requirement.
///
/// `installed` is usually itself a range; its lowest admitted version is
/// tested. Fails when either side cannot be interpreted.
pub fn check_satisfies(installed: &str, required: &str) -> ResolverResult<bool> {
    let req = VersionReq::parse(required).map_err(|source| GraftError::VersionParse {
        input: required.to_string(),
        source,
    })?;
    let installed_version = match Version::parse(installed) {
        Ok(version) => version,
        Err(_) => VersionReq::parse(installed)
            .map_err(|source| GraftError::VersionParse {
                input: installed.to_string(),
                source,
            })?
            .min_version()
            .ok_or_else(|| GraftError::VersionParse {
                input: installed.to_string(),
                source: VersionError::InvalidRange {
                    input: installed.to_string(),
                    reason: "matches no version".to_string(),
                },
            })?,
    };
    Ok(req.matches(&installed_version))
}

/// Compare two declared ranges
pub fn analyze_compatibility(left: &str, right: &str) -> CompatibilityReport {
    match (Declared::parse(left), Declared::parse(right)) {
        (Some(left), Some(right)) => compare(&left, &right),
        _ => CompatibilityReport {
            compatible: false,
            satisfies: false,
            intersection: None,
            risk: Severity::High,
        },
    }
}

fn compare(left: &Declared, right: &Declared) -> CompatibilityReport {
    let gap = major_gap(left, right);
    let satisfies = left.req.matches(&right.floor) || right.req.matches(&left.floor);
    CompatibilityReport {
        compatible: gap == 0 || satisfies,
        satisfies,
        intersection: left.req.intersect(&right.req).map(|req| req.as_str().to_string()),
        risk: gap_severity(gap),
    }
}

fn major_gap(left: &Declared, right: &Declared) -> u64 {
    left.floor.major.abs_diff(right.floor.major)
}

fn gap_severity(gap: u64) -> Severity {
    match gap {
        0 => Severity::Low,
        1 => Severity::Medium,
        _ => Severity::High,
    }
}

/// Severity of choosing between two ranges, by major-version distance.
///
/// Unparsable input is high severity.
pub fn distance_severity(left: &str, right: &str) -> Severity {
    match (Declared::parse(left), Declared::parse(right)) {
        (Some(left), Some(right)) => gap_severity(major_gap(&left, &right)),
        _ => Severity::High,
    }
}

/// Ties on the lowest version go to the more specific range, then to
/// string order, so the pick never depends on argument order.
fn tie_break(left: &Declared, right: &Declared) -> Ordering {
    left.specificity()
        .cmp(&right.specificity())
        .then_with(|| left.raw.cmp(&right.raw))
}

fn higher<'a>(left: &'a Declared, right: &'a Declared) -> &'a Declared {
    match left.floor.cmp_precedence(&right.floor).then_with(|| tie_break(left, right)) {
        Ordering::Less => right,
        _ => left,
    }
}

fn lower<'a>(left: &'a Declared, right: &'a Declared) -> &'a Declared {
    match right.floor.cmp_precedence(&left.floor).then_with(|| tie_break(left, right)) {
        Ordering::Less => right,
        _ => left,
    }
}

/// Exact beats tilde beats caret beats wider forms
fn more_specific<'a>(left: &'a Declared, right: &'a Declared) -> &'a Declared {
    match left.specificity().cmp(&right.specificity()) {
        Ordering::Greater => left,
        Ordering::Less => right,
        Ordering::Equal => higher(left, right),
    }
}

/// The higher of two declarations, or `None` if either does not parse
pub fn pick_higher(left: &str, right: &str) -> Option<String> {
    let (left, right) = (Declared::parse(left)?, Declared::parse(right)?);
    Some(higher(&left, &right).raw.clone())
}

/// Resolve two conflicting declarations under `strategy`
pub fn resolve_conflict(left: &str, right: &str, strategy: MergeStrategy) -> StrategyOutcome {
    if strategy == MergeStrategy::Manual {
        return StrategyOutcome::ManualResolutionRequired {
            reason: format!("'{}' and '{}' need a manual decision", left.trim(), right.trim()),
        };
    }

    let (Some(left), Some(right)) = (Declared::parse(left), Declared::parse(right)) else {
        return StrategyOutcome::Unresolvable {
            reason: format!("cannot compare '{}' with '{}'", left.trim(), right.trim()),
        };
    };

    match strategy {
        MergeStrategy::Highest => StrategyOutcome::Resolved(direct_pick(higher(&left, &right), &left, &right)),
        MergeStrategy::Lowest => StrategyOutcome::Resolved(direct_pick(lower(&left, &right), &left, &right)),
        MergeStrategy::Compatible => {
            let report = compare(&left, &right);
            if !report.compatible {
                return StrategyOutcome::Unresolvable {
                    reason: format!(
                        "'{}' and '{}' are not compatible ({} risk)",
                        left.raw, right.raw, report.risk
                    ),
                };
            }
            let winner = if report.satisfies && major_gap(&left, &right) > 0 {
                more_specific(&left, &right)
            } else {
                higher(&left, &right)
            };
            StrategyOutcome::Resolved(StrategyResolution {
                version: winner.raw.clone(),
                confidence: Confidence::High,
                severity: Severity::Low,
                recommendation: None,
            })
        },
        MergeStrategy::Smart | MergeStrategy::Manual => StrategyOutcome::Resolved(smart_pick(&left, &right)),
    }
}

fn direct_pick(winner: &Declared, left: &Declared, right: &Declared) -> StrategyResolution {
    let gap = major_gap(left, right);
    let loser = if std::ptr::eq(winner, left) { right } else { left };
    StrategyResolution {
        version: winner.raw.clone(),
        confidence: if gap == 0 { Confidence::High } else { Confidence::Medium },
        severity: gap_severity(gap),
        recommendation: (gap > 0).then(|| {
            format!(
                "Moving between major versions ({} vs {}); review breaking changes",
                winner.raw, loser.raw
            )
        }),
    }
}

fn smart_pick(left: &Declared, right: &Declared) -> StrategyResolution {
    let gap = major_gap(left, right);
    let report = compare(left, right);

    if gap > 1 {
        let winner = higher(left, right);
        return StrategyResolution {
            version: winner.raw.clone(),
            confidence: Confidence::Low,
            severity: Severity::High,
            recommendation: Some(format!(
                "Major versions are {} apart; test thoroughly with {}",
                gap, winner.raw
            )),
        };
    }

    if gap == 0 && report.compatible {
        return StrategyResolution {
            version: higher(left, right).raw.clone(),
            confidence: Confidence::High,
            severity: Severity::Low,
            recommendation: None,
        };
    }

    if report.satisfies {
        return StrategyResolution {
            version: more_specific(left, right).raw.clone(),
            confidence: Confidence::High,
            severity: Severity::Low,
            recommendation: None,
        };
    }

    let winner = higher(left, right);
    StrategyResolution {
        version: winner.raw.clone(),
        confidence: Confidence::Medium,
        severity: Severity::Medium,
        recommendation: Some(format!("Verify that dependents work with {}", winner.raw)),
    }
}

/// Range to move an installed declaration to so it meets `required`.
///
/// Bounded requirements are used as written. An open-ended one becomes a
/// caret range on its lowest version. For `||` alternatives the one with
/// the highest lowest version is used.
pub fn best_compatible_version(required: &str) -> Option<String> {
    let mut best: Option<(VersionReq, Version)> = None;
    for alternative in required.split("||") {
        let Ok(req) = VersionReq::parse(alternative) else {
            continue;
        };
        let Some(floor) = req.min_version() else {
            continue;
        };
        let replace = match &best {
            Some((_, current)) => floor.cmp_precedence(current) == Ordering::Greater,
            None => true,
        };
        if replace {
            best = Some((req, floor));
        }
    }

    let (req, floor) = best?;
    if req.kind() == RangeKind::Any {
        return None;
    }
    if req.is_bounded_above() {
        Some(req.as_str().to_string())
    } else {
        Some(format!("^{}", floor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(left: &str, right: &str, strategy: MergeStrategy) -> StrategyResolution {
        match resolve_conflict(left, right, strategy) {
            StrategyOutcome::Resolved(resolution) => resolution,
            other => panic!("expected a resolution, got {:?}", other),
        }
    }

    #[test]
    fn test_satisfies() {
        assert!(satisfies("18.2.0", "^18.0.0"));
        assert!(satisfies("v18.2", "^18.0.0"));
        assert!(satisfies("^18.1.0", ">=18.0.0"));
        assert!(!satisfies("17.0.2", "^18.0.0"));
        assert!(!satisfies("latest", "^18.0.0"));
        assert!(!satisfies("18.2.0", "not a range"));
        assert!(!satisfies("", ""));
    }

    #[test]
    fn test_check_satisfies() {
        assert!(check_satisfies("^18.2.0", "^18.0.0").unwrap());
        assert!(check_satisfies("18.2.0", ">=16.8.0").unwrap());
        assert!(!check_satisfies("^17.0.2", "^18.0.0").unwrap());
        assert!(check_satisfies("latest", "^18.0.0").is_err());
        assert!(check_satisfies("^18.0.0", "workspace:*").is_err());
    }

    #[test]
    fn test_analyze_compatibility() {
        let report = analyze_compatibility("^18.0.0", "^18.2.0");
        assert!(report.compatible);
        assert!(report.satisfies);
        assert_eq!(report.risk, Severity::Low);
        assert_eq!(report.intersection.as_deref(), Some(">=18.2.0 <19.0.0-0"));

        let report = analyze_compatibility("^17.0.0", "^18.0.0");
        assert!(!report.compatible);
        assert_eq!(report.risk, Severity::Medium);
        assert!(report.intersection.is_none());

        let report = analyze_compatibility(">=16.8.0", "^18.0.0");
        assert!(report.compatible);
        assert_eq!(report.risk, Severity::High);

        let report = analyze_compatibility("latest", "^18.0.0");
        assert!(!report.compatible);
        assert_eq!(report.risk, Severity::High);
    }

    #[test]
    fn test_highest_strategy() {
        let resolution = resolved("^17.0.0", "^18.0.0", MergeStrategy::Highest);
        assert_eq!(resolution.version, "^18.0.0");
        assert_eq!(resolution.severity, Severity::Medium);
        assert!(resolution.recommendation.is_some());

        let resolution = resolved("^18.2.0", "^18.0.0", MergeStrategy::Highest);
        assert_eq!(resolution.version, "^18.2.0");
        assert_eq!(resolution.severity, Severity::Low);
        assert_eq!(resolution.confidence, Confidence::High);
    }

    #[test]
    fn test_lowest_strategy() {
        let resolution = resolved("^16.0.0", "^18.0.0", MergeStrategy::Lowest);
        assert_eq!(resolution.version, "^16.0.0");
        assert_eq!(resolution.severity, Severity::High);
    }

    #[test]
    fn test_compatible_strategy() {
        let resolution = resolved("~4.17.0", "^4.17.21", MergeStrategy::Compatible);
        assert_eq!(resolution.version, "^4.17.21");

        assert!(matches!(
            resolve_conflict("^3.0.0", "^4.0.0", MergeStrategy::Compatible),
            StrategyOutcome::Unresolvable { .. }
        ));
    }

    #[test]
    fn test_smart_strategy() {
        // Majors far apart
        let resolution = resolved("^16.0.0", "^18.0.0", MergeStrategy::Smart);
        assert_eq!(resolution.version, "^18.0.0");
        assert_eq!(resolution.confidence, Confidence::Low);
        assert_eq!(resolution.severity, Severity::High);
        assert!(resolution.recommendation.unwrap().contains("test thoroughly"));

        // Same major
        let resolution = resolved("^18.0.0", "^18.2.0", MergeStrategy::Smart);
        assert_eq!(resolution.version, "^18.2.0");
        assert_eq!(resolution.confidence, Confidence::High);

        // One satisfies the other: the more specific form wins
        let resolution = resolved(">=17.0.0", "^18.0.0", MergeStrategy::Smart);
        assert_eq!(resolution.version, "^18.0.0");
        assert_eq!(resolution.confidence, Confidence::High);

        // Adjacent majors that do not overlap
        let resolution = resolved("^17.0.0", "^18.0.0", MergeStrategy::Smart);
        assert_eq!(resolution.version, "^18.0.0");
        assert_eq!(resolution.confidence, Confidence::Medium);
        assert_eq!(resolution.severity, Severity::Medium);
    }

    #[test]
    fn test_smart_prefers_tilde_on_equal_floor() {
        assert_eq!(resolved("^1.2.0", "~1.2.0", MergeStrategy::Smart).version, "~1.2.0");
        assert_eq!(resolved("~1.2.0", "^1.2.0", MergeStrategy::Smart).version, "~1.2.0");
        assert_eq!(resolved("1.2.0", "~1.2.0", MergeStrategy::Smart).version, "1.2.0");
    }

    #[test]
    fn test_manual_and_unparsable() {
        assert!(matches!(
            resolve_conflict("^17.0.0", "^18.0.0", MergeStrategy::Manual),
            StrategyOutcome::ManualResolutionRequired { .. }
        ));
        let outcome = resolve_conflict("github:facebook/react", "^18.0.0", MergeStrategy::Smart);
        assert!(matches!(outcome, StrategyOutcome::Unresolvable { .. }));
        assert!(matches!(
            outcome.into_result("react", "github:facebook/react", "^18.0.0"),
            Err(GraftError::UnresolvableVersionConflict { .. })
        ));
    }

    #[test]
    fn test_pick_higher() {
        assert_eq!(pick_higher("^1.0.0", "^2.0.0").as_deref(), Some("^2.0.0"));
        assert_eq!(pick_higher("2.0.0-rc.1", "2.0.0").as_deref(), Some("2.0.0"));
        assert!(pick_higher("next", "^2.0.0").is_none());
    }

    #[test]
    fn test_best_compatible_version() {
        assert_eq!(best_compatible_version("^18.2.0").as_deref(), Some("^18.2.0"));
        assert_eq!(best_compatible_version(">=16.8.0").as_deref(), Some("^16.8.0"));
        assert_eq!(best_compatible_version("^17.0.0 || ^18.0.0").as_deref(), Some("^18.0.0"));
        assert_eq!(best_compatible_version("1.x").as_deref(), Some("1.x"));
        assert!(best_compatible_version("*").is_none());
        assert!(best_compatible_version("not a range").is_none());
    }

    #[test]
    fn test_distance_severity() {
        assert_eq!(distance_severity("^1.0.0", "^1.5.0"), Severity::Low);
        assert_eq!(distance_severity("^1.0.0", "^2.0.0"), Severity::Medium);
        assert_eq!(distance_severity("^1.0.0", "^3.0.0"), Severity::High);
        assert_eq!(distance_severity("latest", "^3.0.0"), Severity::High);
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn range_strategy() -> impl Strategy<Value = String> {
        (0u64..6, 0u64..6, 0u64..6, prop::sample::select(vec!["", "^", "~", ">="]))
            .prop_map(|(major, minor, patch, op)| format!("{}{}.{}.{}", op, major, minor, patch))
    }

    proptest! {
        #[test]
        fn satisfies_never_panics(version in ".{0,20}", range in ".{0,20}") {
            let _ = satisfies(&version, &range);
        }

        #[test]
        fn satisfies_agrees_with_range_matching(major in 0u64..5, minor in 0u64..5, patch in 0u64..5, range in range_strategy()) {
            let version = Version::new(major, minor, patch);
            let req = VersionReq::parse(&range).unwrap();
            prop_assert_eq!(satisfies(&version.to_string(), &range), req.matches(&version));
        }

        #[test]
        fn pick_is_order_independent(left in range_strategy(), right in range_strategy()) {
            for strategy in [MergeStrategy::Highest, MergeStrategy::Lowest, MergeStrategy::Smart] {
                let forward = resolve_conflict(&left, &right, strategy);
                let backward = resolve_conflict(&right, &left, strategy);
                prop_assert_eq!(
                    forward.resolved().map(|r| r.version.clone()),
                    backward.resolved().map(|r| r.version.clone())
                );
            }
        }

        #[test]
        fn highest_pick_is_one_of_the_inputs(left in range_strategy(), right in range_strategy()) {
            let resolution = resolve_conflict(&left, &right, MergeStrategy::Highest);
            let version = resolution.resolved().map(|r| r.version.clone()).unwrap();
            prop_assert!(version == left || version == right);
        }
    }
}
