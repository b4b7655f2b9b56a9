//! Known cross-package incompatibilities
//!
//! A fixed table of rules checked against a merged dependency set. Each rule
//! either requires a minimum version of one package when another is in a
//! given range, or requires two packages to share a major version.

use graft_core::types::{DependencyMap, Severity, Version, VersionReq};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleCheck {
    /// When `when` is declared in `in_range`, `requires` must admit nothing below `at_least`
    MinimumVersion {
        when: &'static str,
        in_range: &'static str,
        requires: &'static str,
        at_least: &'static str,
    },
    /// Both packages must be on the same major version
    SameMajor { left: &'static str, right: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatibilityRule {
    pub name: &'static str,
    pub check: RuleCheck,
    pub severity: Severity,
}

/// One triggered rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompatibilityIssue {
    pub rule: String,
    pub packages: Vec<String>,
    pub message: String,
    pub severity: Severity,
}

const fn minimum(
    name: &'static str,
    when: &'static str,
    in_range: &'static str,
    requires: &'static str,
    at_least: &'static str,
) -> CompatibilityRule {
    CompatibilityRule {
        name,
        check: RuleCheck::MinimumVersion {
            when,
            in_range,
            requires,
            at_least,
        },
        severity: Severity::High,
    }
}

const fn same_major(name: &'static str, left: &'static str, right: &'static str) -> CompatibilityRule {
    CompatibilityRule {
        name,
        check: RuleCheck::SameMajor { left, right },
        severity: Severity::Medium,
    }
}

static KNOWN_RULES: &[CompatibilityRule] = &[
    minimum("next-react", "next", ">=13.0.0", "react", "18.2.0"),
    minimum("next-react-dom", "next", ">=13.0.0", "react-dom", "18.2.0"),
    same_major("react-react-dom", "react", "react-dom"),
    minimum("testing-library-react", "@testing-library/react", ">=13.0.0", "react", "18.0.0"),
    minimum("vite-plugin-react", "@vitejs/plugin-react", ">=4.0.0", "vite", "4.2.0"),
    same_major(
        "typescript-eslint-pair",
        "@typescript-eslint/parser",
        "@typescript-eslint/eslint-plugin",
    ),
    minimum(
        "typescript-eslint-typescript",
        "@typescript-eslint/parser",
        ">=6.0.0",
        "typescript",
        "4.7.4",
    ),
    minimum("react-router-hooks", "react-router-dom", ">=6.0.0", "react", "16.8.0"),
    same_major("eslint-config-next", "eslint-config-next", "next"),
    same_major("angular-core-common", "@angular/core", "@angular/common"),
    minimum("vue-router", "vue", ">=3.0.0", "vue-router", "4.0.0"),
];

/// The shipped rule table, in check order
pub fn known_rules() -> &'static [CompatibilityRule] {
    KNOWN_RULES
}

/// Lowest version a declaration admits: exact versions as written, ranges by their floor
fn floor(declared: &str) -> Option<Version> {
    Version::parse(declared)
        .ok()
        .or_else(|| VersionReq::parse(declared).ok()?.min_version())
}

impl CompatibilityRule {
    /// Evaluate against a dependency set; rules whose packages are absent
    /// or unparsable do not trigger
    pub fn check(&self, dependencies: &DependencyMap) -> Option<CompatibilityIssue> {
        match &self.check {
            RuleCheck::MinimumVersion {
                when,
                in_range,
                requires,
                at_least,
            } => {
                let trigger = dependencies.get(*when)?;
                let trigger_floor = floor(trigger)?;
                if !VersionReq::parse(in_range).ok()?.matches(&trigger_floor) {
                    return None;
                }
                let required = dependencies.get(*requires)?;
                let required_floor = floor(required)?;
                let minimum = Version::parse(at_least).ok()?;
                if required_floor.cmp_precedence(&minimum).is_ge() {
                    return None;
                }
                Some(CompatibilityIssue {
                    rule: self.name.to_string(),
                    packages: vec![when.to_string(), requires.to_string()],
                    message: format!(
                        "{}@{} requires {} >= {}, but {} is declared",
                        when, trigger, requires, at_least, required
                    ),
                    severity: self.severity,
                })
            },
            RuleCheck::SameMajor { left, right } => {
                let left_declared = dependencies.get(*left)?;
                let right_declared = dependencies.get(*right)?;
                let (left_floor, right_floor) = (floor(left_declared)?, floor(right_declared)?);
                if left_floor.major == right_floor.major {
                    return None;
                }
                Some(CompatibilityIssue {
                    rule: self.name.to_string(),
                    packages: vec![left.to_string(), right.to_string()],
                    message: format!(
                        "{}@{} and {}@{} should share a major version",
                        left, left_declared, right, right_declared
                    ),
                    severity: self.severity,
                })
            },
        }
    }
}

/// Every triggered rule, in table order
pub fn check_rules(rules: &[CompatibilityRule], dependencies: &DependencyMap) -> Vec<CompatibilityIssue> {
    rules.iter().filter_map(|rule| rule.check(dependencies)).collect()
}
