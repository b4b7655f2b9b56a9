//! Semantic versions and npm-style version ranges.
//!
//! `Version` follows semver 2.0.0 precedence. `VersionReq` understands the
//! range grammar used in package manifests: `||` unions, space-separated
//! comparator sets, hyphen ranges, x-ranges, partial versions, `~` and `^`.
//! Ranges are desugared into plain comparator sets at parse time so matching,
//! minimum-version search and intersection all work on the same shape.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Semantic version (major.minor.patch-prerelease+build)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre: Vec<Prerelease>,
    pub build: Vec<String>,
}

/// One dot-separated prerelease identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Prerelease {
    Numeric(u64),
    AlphaNumeric(String),
}

/// Version requirement (`^1.0.0`, `~2.3`, `>=1.0.0 <2.0.0 || 3.x`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionReq {
    raw: String,
    kind: RangeKind,
    sets: Vec<ComparatorSet>,
}

/// Comparators that must all match (one side of a `||`)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ComparatorSet {
    pub comparators: Vec<Comparator>,
}

/// Individual version comparator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparator {
    pub op: Op,
    pub version: Version,
}

/// Comparison operator after range desugaring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Exact,     // =1.0.0
    Greater,   // >1.0.0
    GreaterEq, // >=1.0.0
    Less,      // <1.0.0
    LessEq,    // <=1.0.0
}

/// Syntactic shape of a range as written, used to rank how specific it is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RangeKind {
    /// `1.2.3`, `=1.2.3`
    Exact,
    /// `~1.2.3`
    Tilde,
    /// `^1.2.3`
    Caret,
    /// `1.x`, `1.2`
    XRange,
    /// `>=1.2.3 <2.0.0`
    Comparison,
    /// `1.2.3 - 2.0.0`
    Hyphen,
    /// `^1.0.0 || ^2.0.0`
    Union,
    /// `*`, empty string
    Any,
}

/// Version parsing and validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("Invalid version format: {input}")]
    InvalidFormat { input: String },

    #[error("Invalid number in version: {component}")]
    InvalidNumber { component: String },

    #[error("Invalid prerelease identifier: {prerelease}")]
    InvalidPrerelease { prerelease: String },

    #[error("Invalid build metadata: {build}")]
    InvalidBuild { build: String },

    #[error("Invalid range '{input}': {reason}")]
    InvalidRange { input: String, reason: String },
}

impl Version {
    /// Create a new version
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: Vec::new(),
            build: Vec::new(),
        }
    }

    /// Parse a version, accepting a leading `v` or `=`
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        input.parse()
    }

    /// Extract the first `major[.minor[.patch]]` run of digits from arbitrary text.
    ///
    /// `^18.2.0` becomes `18.2.0`, `v2` becomes `2.0.0`, `latest` yields `None`.
    pub fn coerce(input: &str) -> Option<Self> {
        let bytes = input.as_bytes();
        let start = bytes.iter().position(u8::is_ascii_digit)?;
        let mut parts = [0u64; 3];
        let mut filled = 0;
        let mut pos = start;

        while filled < 3 {
            let digits_end = bytes[pos..]
                .iter()
                .position(|b| !b.is_ascii_digit())
                .map_or(bytes.len(), |offset| pos + offset);
            if digits_end == pos {
                break;
            }
            parts[filled] = input[pos..digits_end].parse().ok()?;
            filled += 1;
            // Only continue through a '.' that is followed by another number
            if digits_end + 1 < bytes.len()
                && bytes[digits_end] == b'.'
                && bytes[digits_end + 1].is_ascii_digit()
            {
                pos = digits_end + 1;
            } else {
                break;
            }
        }

        Some(Version::new(parts[0], parts[1], parts[2]))
    }

    /// Check if this version satisfies a version requirement
    pub fn satisfies(&self, req: &VersionReq) -> bool {
        req.matches(self)
    }

    /// Check if this is a prerelease version
    pub fn is_prerelease(&self) -> bool {
        !self.pre.is_empty()
    }

    /// Compare by semver precedence (ignores build metadata)
    pub fn cmp_precedence(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (self.pre.is_empty(), other.pre.is_empty()) {
                (true, true) => Ordering::Equal,
                (false, true) => Ordering::Less, // prerelease < normal
                (true, false) => Ordering::Greater,
                (false, false) => self.pre.cmp(&other.pre),
            })
    }

    fn with_zero_pre(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            pre: vec![Prerelease::Numeric(0)],
            ..Self::new(major, minor, patch)
        }
    }

    fn same_core(&self, other: &Self) -> bool {
        (self.major, self.minor, self.patch) == (other.major, other.minor, other.patch)
    }
}

impl PartialOrd for Prerelease {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Prerelease {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Prerelease::Numeric(a), Prerelease::Numeric(b)) => a.cmp(b),
            (Prerelease::Numeric(_), Prerelease::AlphaNumeric(_)) => Ordering::Less,
            (Prerelease::AlphaNumeric(_), Prerelease::Numeric(_)) => Ordering::Greater,
            (Prerelease::AlphaNumeric(a), Prerelease::AlphaNumeric(b)) => a.cmp(b),
        }
    }
}

impl fmt::Display for Prerelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prerelease::Numeric(n) => write!(f, "{}", n),
            Prerelease::AlphaNumeric(s) => f.write_str(s),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        // Build metadata only breaks ties so Ord stays consistent with Eq
        self.cmp_precedence(other)
            .then_with(|| self.build.cmp(&other.build))
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let partial = Partial::parse(s)?;
        match (partial.major, partial.minor, partial.patch) {
            (Some(major), Some(minor), Some(patch)) => Ok(Version {
                major,
                minor,
                patch,
                pre: partial.pre,
                build: partial.build,
            }),
            _ => Err(VersionError::InvalidFormat {
                input: s.trim().to_string(),
            }),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;

        if !self.pre.is_empty() {
            let pre: Vec<String> = self.pre.iter().map(ToString::to_string).collect();
            write!(f, "-{}", pre.join("."))?;
        }

        if !self.build.is_empty() {
            write!(f, "+{}", self.build.join("."))?;
        }

        Ok(())
    }
}

impl Serialize for Version {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Largest component accepted, so bound arithmetic never overflows
const MAX_COMPONENT: u64 = 9_007_199_254_740_991;

/// Version with possibly missing components (`1`, `1.2`, `1.x`, `*`)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct Partial {
    major: Option<u64>,
    minor: Option<u64>,
    patch: Option<u64>,
    pre: Vec<Prerelease>,
    build: Vec<String>,
}

impl Partial {
    fn parse(input: &str) -> Result<Self, VersionError> {
        let trimmed = input.trim();
        let stripped = trimmed.strip_prefix('=').unwrap_or(trimmed).trim_start();
        let stripped = stripped
            .strip_prefix('v')
            .or_else(|| stripped.strip_prefix('V'))
            .unwrap_or(stripped);

        if stripped.is_empty() {
            return Ok(Self::default());
        }

        // Split on '+' for build metadata
        let (version_part, build) = match stripped.split_once('+') {
            Some((v, b)) => (v, parse_build(b)?),
            None => (stripped, Vec::new()),
        };

        // Split on the first '-' for prerelease
        let (core_part, pre) = match version_part.split_once('-') {
            Some((c, p)) => (c, parse_prerelease(p)?),
            None => (version_part, Vec::new()),
        };

        let parts: Vec<&str> = core_part.split('.').collect();
        if parts.len() > 3 {
            return Err(VersionError::InvalidFormat {
                input: trimmed.to_string(),
            });
        }

        let mut numbers = [None; 3];
        let mut wildcard_seen = false;
        for (slot, part) in numbers.iter_mut().zip(parts.iter()) {
            if matches!(*part, "x" | "X" | "*") {
                wildcard_seen = true;
                continue;
            }
            if wildcard_seen {
                // `1.x.3` is treated as `1.x`
                continue;
            }
            let number = part
                .parse::<u64>()
                .ok()
                .filter(|n| *n <= MAX_COMPONENT)
                .ok_or_else(|| VersionError::InvalidNumber {
                    component: (*part).to_string(),
                })?;
            *slot = Some(number);
        }

        let complete = numbers.iter().all(Option::is_some);
        if !pre.is_empty() && !complete {
            return Err(VersionError::InvalidFormat {
                input: trimmed.to_string(),
            });
        }

        Ok(Self {
            major: numbers[0],
            minor: numbers[1],
            patch: numbers[2],
            pre,
            build,
        })
    }

    fn full(&self) -> Option<Version> {
        Some(Version {
            major: self.major?,
            minor: self.minor?,
            patch: self.patch?,
            pre: self.pre.clone(),
            build: Vec::new(),
        })
    }
}

fn parse_prerelease(input: &str) -> Result<Vec<Prerelease>, VersionError> {
    input
        .split('.')
        .map(|ident| {
            if ident.is_empty() || !ident.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
                return Err(VersionError::InvalidPrerelease {
                    prerelease: input.to_string(),
                });
            }
            if ident.chars().all(|c| c.is_ascii_digit()) {
                if let Ok(n) = ident.parse() {
                    return Ok(Prerelease::Numeric(n));
                }
            }
            Ok(Prerelease::AlphaNumeric(ident.to_string()))
        })
        .collect()
}

fn parse_build(input: &str) -> Result<Vec<String>, VersionError> {
    input
        .split('.')
        .map(|ident| {
            if ident.is_empty() || !ident.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
                Err(VersionError::InvalidBuild {
                    build: input.to_string(),
                })
            } else {
                Ok(ident.to_string())
            }
        })
        .collect()
}

/// Operator prefix as written in a range token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RangeOp {
    Caret,
    Tilde,
    Greater,
    GreaterEq,
    Less,
    LessEq,
    Eq,
}

fn split_op(token: &str) -> (RangeOp, &str) {
    const PREFIXES: &[(&str, RangeOp)] = &[
        ("~>", RangeOp::Tilde),
        ("^", RangeOp::Caret),
        ("~", RangeOp::Tilde),
        (">=", RangeOp::GreaterEq),
        ("<=", RangeOp::LessEq),
        (">", RangeOp::Greater),
        ("<", RangeOp::Less),
        ("=", RangeOp::Eq),
    ];
    for (prefix, op) in PREFIXES {
        if let Some(rest) = token.strip_prefix(*prefix) {
            return (*op, rest);
        }
    }
    (RangeOp::Eq, token)
}

fn cmp(op: Op, version: Version) -> Comparator {
    Comparator { op, version }
}

/// Comparator set that nothing satisfies
fn nothing() -> Vec<Comparator> {
    vec![cmp(Op::Less, Version::with_zero_pre(0, 0, 0))]
}

fn desugar(op: RangeOp, p: &Partial) -> Vec<Comparator> {
    let full = p.full();
    match (op, p.major, p.minor) {
        (RangeOp::Greater, None, _) | (RangeOp::Less, None, _) => nothing(),
        (_, None, _) => Vec::new(),
        (RangeOp::Eq, Some(major), minor) => match (minor, full) {
            (_, Some(v)) => vec![cmp(Op::Exact, v)],
            (None, None) => vec![
                cmp(Op::GreaterEq, Version::new(major, 0, 0)),
                cmp(Op::Less, Version::with_zero_pre(major + 1, 0, 0)),
            ],
            (Some(minor), None) => vec![
                cmp(Op::GreaterEq, Version::new(major, minor, 0)),
                cmp(Op::Less, Version::with_zero_pre(major, minor + 1, 0)),
            ],
        },
        (RangeOp::Tilde, Some(major), minor) => match (minor, full) {
            (Some(minor), Some(v)) => vec![
                cmp(Op::GreaterEq, v),
                cmp(Op::Less, Version::with_zero_pre(major, minor + 1, 0)),
            ],
            (Some(minor), None) => vec![
                cmp(Op::GreaterEq, Version::new(major, minor, 0)),
                cmp(Op::Less, Version::with_zero_pre(major, minor + 1, 0)),
            ],
            (None, _) => vec![
                cmp(Op::GreaterEq, Version::new(major, 0, 0)),
                cmp(Op::Less, Version::with_zero_pre(major + 1, 0, 0)),
            ],
        },
        (RangeOp::Caret, Some(major), minor) => {
            let upper = match (major, minor, p.patch) {
                (0, Some(0), Some(patch)) => Version::with_zero_pre(0, 0, patch + 1),
                (0, Some(minor), _) => Version::with_zero_pre(0, minor + 1, 0),
                _ => Version::with_zero_pre(major + 1, 0, 0),
            };
            let lower = full.unwrap_or_else(|| Version::new(major, minor.unwrap_or(0), 0));
            vec![cmp(Op::GreaterEq, lower), cmp(Op::Less, upper)]
        },
        (RangeOp::Greater, Some(major), minor) => match (minor, full) {
            (_, Some(v)) => vec![cmp(Op::Greater, v)],
            (None, None) => vec![cmp(Op::GreaterEq, Version::new(major + 1, 0, 0))],
            (Some(minor), None) => vec![cmp(Op::GreaterEq, Version::new(major, minor + 1, 0))],
        },
        (RangeOp::GreaterEq, Some(major), minor) => {
            let v = full.unwrap_or_else(|| Version::new(major, minor.unwrap_or(0), 0));
            vec![cmp(Op::GreaterEq, v)]
        },
        (RangeOp::Less, Some(major), minor) => match (minor, full) {
            (_, Some(v)) => vec![cmp(Op::Less, v)],
            (None, None) => vec![cmp(Op::Less, Version::with_zero_pre(major, 0, 0))],
            (Some(minor), None) => vec![cmp(Op::Less, Version::with_zero_pre(major, minor, 0))],
        },
        (RangeOp::LessEq, Some(major), minor) => match (minor, full) {
            (_, Some(v)) => vec![cmp(Op::LessEq, v)],
            (None, None) => vec![cmp(Op::Less, Version::with_zero_pre(major + 1, 0, 0))],
            (Some(minor), None) => {
                vec![cmp(Op::Less, Version::with_zero_pre(major, minor + 1, 0))]
            },
        },
    }
}

fn desugar_hyphen(from: &Partial, to: &Partial) -> Vec<Comparator> {
    let mut comparators = Vec::new();
    if let Some(major) = from.major {
        let lower = from
            .full()
            .unwrap_or_else(|| Version::new(major, from.minor.unwrap_or(0), 0));
        comparators.push(cmp(Op::GreaterEq, lower));
    }
    match (to.major, to.minor, to.full()) {
        (None, _, _) => {},
        (Some(_), _, Some(v)) => comparators.push(cmp(Op::LessEq, v)),
        (Some(major), None, None) => {
            comparators.push(cmp(Op::Less, Version::with_zero_pre(major + 1, 0, 0)))
        },
        (Some(major), Some(minor), None) => {
            comparators.push(cmp(Op::Less, Version::with_zero_pre(major, minor + 1, 0)))
        },
    }
    comparators
}

/// Join bare operators with the version that follows them (`>= 1.2.3`)
fn tokenize(alternative: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut pending: Option<String> = None;
    for word in alternative.split_whitespace() {
        let bare_op = word.chars().all(|c| matches!(c, '<' | '>' | '=' | '~' | '^'));
        match pending.take() {
            Some(op) => tokens.push(format!("{}{}", op, word)),
            None if bare_op => pending = Some(word.to_string()),
            None => tokens.push(word.to_string()),
        }
    }
    if let Some(op) = pending {
        tokens.push(op);
    }
    tokens
}

fn classify(raw: &str) -> RangeKind {
    let trimmed = raw.trim();
    if trimmed.contains("||") {
        return RangeKind::Union;
    }
    let words: Vec<&str> = trimmed.split_whitespace().collect();
    if words.len() == 3 && words[1] == "-" {
        return RangeKind::Hyphen;
    }
    if matches!(trimmed, "" | "*" | "x" | "X") {
        return RangeKind::Any;
    }
    if tokenize(trimmed).len() > 1 {
        return RangeKind::Comparison;
    }
    let (op, rest) = split_op(trimmed);
    let complete = Partial::parse(rest)
        .map(|p| p.full().is_some())
        .unwrap_or(false);
    match op {
        RangeOp::Caret => RangeKind::Caret,
        RangeOp::Tilde => RangeKind::Tilde,
        RangeOp::Eq if complete => RangeKind::Exact,
        RangeOp::Eq => RangeKind::XRange,
        _ => RangeKind::Comparison,
    }
}

impl VersionReq {
    /// Parse a version requirement string
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let raw = input.trim();
        let invalid = |reason: &str| VersionError::InvalidRange {
            input: raw.to_string(),
            reason: reason.to_string(),
        };

        let mut sets = Vec::new();
        for alternative in raw.split("||") {
            let alternative = alternative.trim();
            let words: Vec<&str> = alternative.split_whitespace().collect();

            let comparators = if words.len() == 3 && words[1] == "-" {
                desugar_hyphen(&Partial::parse(words[0])?, &Partial::parse(words[2])?)
            } else {
                let mut comparators = Vec::new();
                for token in tokenize(alternative) {
                    let (op, rest) = split_op(&token);
                    if rest.contains(|c| matches!(c, '<' | '>' | '^' | '~')) {
                        return Err(invalid("unexpected operator"));
                    }
                    comparators.extend(desugar(op, &Partial::parse(rest)?));
                }
                comparators
            };
            sets.push(ComparatorSet { comparators });
        }

        if sets.is_empty() {
            return Err(invalid("no comparators"));
        }

        Ok(Self {
            raw: raw.to_string(),
            kind: classify(raw),
            sets,
        })
    }

    /// Requirement that matches every release
    pub fn any() -> Self {
        Self {
            raw: "*".to_string(),
            kind: RangeKind::Any,
            sets: vec![ComparatorSet::default()],
        }
    }

    /// The range exactly as written
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Syntactic shape of the range
    pub fn kind(&self) -> RangeKind {
        self.kind
    }

    /// Desugared comparator sets (`||` alternatives)
    pub fn sets(&self) -> &[ComparatorSet] {
        &self.sets
    }

    /// Check if a version matches this requirement
    pub fn matches(&self, version: &Version) -> bool {
        self.sets.iter().any(|set| set.matches(version))
    }

    /// Lowest version that satisfies this requirement, if any does
    pub fn min_version(&self) -> Option<Version> {
        for candidate in [Version::new(0, 0, 0), Version::with_zero_pre(0, 0, 0)] {
            if self.matches(&candidate) {
                return Some(candidate);
            }
        }

        self.sets
            .iter()
            .map(ComparatorSet::lower_candidate)
            .filter(|candidate| self.matches(candidate))
            .min_by(Version::cmp_precedence)
    }

    /// Whether every alternative has an upper bound
    pub fn is_bounded_above(&self) -> bool {
        self.sets.iter().all(|set| {
            set.comparators
                .iter()
                .any(|c| matches!(c.op, Op::Exact | Op::Less | Op::LessEq))
        })
    }

    /// Highest version in `versions` that satisfies this requirement.
    ///
    /// Stable releases win over prereleases when both match.
    pub fn max_satisfying<'a, I>(&self, versions: I) -> Option<Version>
    where
        I: IntoIterator<Item = &'a Version>,
    {
        let matching: Vec<&Version> = versions.into_iter().filter(|v| self.matches(v)).collect();
        matching
            .iter()
            .filter(|v| !v.is_prerelease())
            .max_by(|a, b| a.cmp_precedence(b))
            .or_else(|| matching.iter().max_by(|a, b| a.cmp_precedence(b)))
            .map(|v| (*v).clone())
    }

    /// Requirement satisfied by exactly the versions both sides accept.
    ///
    /// Returns `None` when the ranges are disjoint.
    pub fn intersect(&self, other: &VersionReq) -> Option<VersionReq> {
        let mut sets = Vec::new();
        for left in &self.sets {
            for right in &other.sets {
                let combined = ComparatorSet {
                    comparators: left
                        .comparators
                        .iter()
                        .chain(right.comparators.iter())
                        .cloned()
                        .collect(),
                };
                if combined.matches(&combined.lower_candidate()) {
                    let simplified = combined.simplified();
                    if !sets.contains(&simplified) {
                        sets.push(simplified);
                    }
                }
            }
        }

        if sets.is_empty() {
            return None;
        }

        let raw = sets
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" || ");
        Some(Self {
            kind: classify(&raw),
            raw,
            sets,
        })
    }
}

impl ComparatorSet {
    /// Check whether every comparator accepts the version.
    ///
    /// A prerelease only matches when some comparator in the set names a
    /// prerelease of the same `major.minor.patch`.
    pub fn matches(&self, version: &Version) -> bool {
        if !self.comparators.iter().all(|c| c.matches(version)) {
            return false;
        }
        if !version.is_prerelease() {
            return true;
        }
        self.comparators
            .iter()
            .any(|c| c.version.is_prerelease() && c.version.same_core(version))
    }

    /// Smallest version allowed by the lower-bound comparators
    fn lower_candidate(&self) -> Version {
        let mut floor: Option<Version> = None;
        for comparator in &self.comparators {
            let mut candidate = comparator.version.clone();
            match comparator.op {
                Op::Greater => {
                    if candidate.pre.is_empty() {
                        candidate.patch += 1;
                    } else {
                        candidate.pre.push(Prerelease::Numeric(0));
                    }
                },
                Op::GreaterEq | Op::Exact => {},
                Op::Less | Op::LessEq => continue,
            }
            if floor
                .as_ref()
                .map_or(true, |current| candidate.cmp_precedence(current) == Ordering::Greater)
            {
                floor = Some(candidate);
            }
        }
        floor.unwrap_or_else(|| Version::new(0, 0, 0))
    }

    /// Tightest lower and upper bound of a satisfiable set
    fn simplified(&self) -> ComparatorSet {
        if let Some(exact) = self.comparators.iter().find(|c| c.op == Op::Exact) {
            return ComparatorSet {
                comparators: vec![exact.clone()],
            };
        }

        let lower = self
            .comparators
            .iter()
            .filter(|c| matches!(c.op, Op::Greater | Op::GreaterEq))
            .max_by(|a, b| {
                a.version
                    .cmp_precedence(&b.version)
                    .then_with(|| (a.op == Op::Greater).cmp(&(b.op == Op::Greater)))
            });
        let upper = self
            .comparators
            .iter()
            .filter(|c| matches!(c.op, Op::Less | Op::LessEq))
            .min_by(|a, b| {
                a.version
                    .cmp_precedence(&b.version)
                    .then_with(|| (a.op == Op::LessEq).cmp(&(b.op == Op::LessEq)))
            });

        ComparatorSet {
            comparators: lower.into_iter().chain(upper).cloned().collect(),
        }
    }
}

impl Comparator {
    /// Check if a version matches this comparator
    pub fn matches(&self, version: &Version) -> bool {
        let ordering = version.cmp_precedence(&self.version);
        match self.op {
            Op::Exact => ordering == Ordering::Equal,
            Op::Greater => ordering == Ordering::Greater,
            Op::GreaterEq => ordering != Ordering::Less,
            Op::Less => ordering == Ordering::Less,
            Op::LessEq => ordering != Ordering::Greater,
        }
    }
}

impl FromStr for VersionReq {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionReq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl fmt::Display for ComparatorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.comparators.is_empty() {
            return f.write_str("*");
        }
        let parts: Vec<String> = self.comparators.iter().map(ToString::to_string).collect();
        f.write_str(&parts.join(" "))
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.op {
            Op::Exact => "",
            Op::Greater => ">",
            Op::GreaterEq => ">=",
            Op::Less => "<",
            Op::LessEq => "<=",
        };
        write!(f, "{}{}", op, self.version)
    }
}

impl RangeKind {
    /// How narrowly this shape pins a version; higher is more specific.
    ///
    /// Exact pins beat tilde, tilde beats caret, caret beats open ranges.
    pub fn specificity(self) -> u8 {
        match self {
            RangeKind::Exact => 5,
            RangeKind::Tilde => 4,
            RangeKind::Caret => 3,
            RangeKind::XRange | RangeKind::Hyphen => 2,
            RangeKind::Comparison | RangeKind::Union => 1,
            RangeKind::Any => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn req(s: &str) -> VersionReq {
        VersionReq::parse(s).unwrap()
    }

    #[test]
    fn test_version_parsing() {
        let version = v("1.2.3");
        assert_eq!((version.major, version.minor, version.patch), (1, 2, 3));
        assert!(version.pre.is_empty());
        assert!(version.build.is_empty());

        let version = v("v1.2.3-alpha.1+build.5");
        assert_eq!(
            version.pre,
            vec![Prerelease::AlphaNumeric("alpha".to_string()), Prerelease::Numeric(1)]
        );
        assert_eq!(version.build, vec!["build".to_string(), "5".to_string()]);
        assert_eq!(version.to_string(), "1.2.3-alpha.1+build.5");

        assert!(Version::parse("1.2").is_err());
        assert!(Version::parse("1.2.3.4").is_err());
        assert!(Version::parse("latest").is_err());
        assert!(Version::parse("1.2.3-").is_err());
    }

    #[test]
    fn test_prerelease_precedence() {
        // Ordering example from semver.org
        let ordered = [
            "1.0.0-alpha",
            "1.0.0-alpha.1",
            "1.0.0-alpha.beta",
            "1.0.0-beta",
            "1.0.0-beta.2",
            "1.0.0-beta.11",
            "1.0.0-rc.1",
            "1.0.0",
        ];
        for pair in ordered.windows(2) {
            assert!(v(pair[0]) < v(pair[1]), "{} < {}", pair[0], pair[1]);
        }
        assert_eq!(v("1.0.0+a").cmp_precedence(&v("1.0.0+b")), Ordering::Equal);
    }

    #[test]
    fn test_coerce() {
        assert_eq!(Version::coerce("^18.2.0"), Some(v("18.2.0")));
        assert_eq!(Version::coerce("~1.2"), Some(v("1.2.0")));
        assert_eq!(Version::coerce("v2"), Some(v("2.0.0")));
        assert_eq!(Version::coerce(">=16.8 <19"), Some(v("16.8.0")));
        assert_eq!(Version::coerce("1.2.3.4"), Some(v("1.2.3")));
        assert_eq!(Version::coerce("latest"), None);
        assert_eq!(Version::coerce("workspace:*"), None);
    }

    #[test]
    fn test_version_req_exact() {
        let r = req("1.2.3");
        assert_eq!(r.kind(), RangeKind::Exact);
        assert!(r.matches(&v("1.2.3")));
        assert!(!r.matches(&v("1.2.4")));
    }

    #[test]
    fn test_version_req_wildcard() {
        for raw in ["*", "", "x"] {
            let r = req(raw);
            assert_eq!(r.kind(), RangeKind::Any);
            assert!(r.matches(&v("1.2.3")));
            assert!(r.matches(&v("999.999.999")));
            assert!(!r.matches(&v("1.0.0-beta")));
        }
    }

    #[test]
    fn test_version_req_caret() {
        let r = req("^1.2.3");
        assert!(r.matches(&v("1.2.3")));
        assert!(r.matches(&v("1.9.0")));
        assert!(!r.matches(&v("2.0.0")));
        assert!(!r.matches(&v("1.2.2")));

        let r = req("^0.2.3");
        assert!(r.matches(&v("0.2.9")));
        assert!(!r.matches(&v("0.3.0")));

        let r = req("^0.0.3");
        assert!(r.matches(&v("0.0.3")));
        assert!(!r.matches(&v("0.0.4")));

        let r = req("^1.x");
        assert!(r.matches(&v("1.0.0")));
        assert!(!r.matches(&v("2.0.0")));
    }

    #[test]
    fn test_version_req_tilde() {
        let r = req("~1.2.3");
        assert_eq!(r.kind(), RangeKind::Tilde);
        assert!(r.matches(&v("1.2.9")));
        assert!(!r.matches(&v("1.3.0")));

        let r = req("~1");
        assert!(r.matches(&v("1.9.9")));
        assert!(!r.matches(&v("2.0.0")));
    }

    #[test]
    fn test_version_req_operators() {
        let r = req(">=1.2.3 <2.0.0");
        assert_eq!(r.kind(), RangeKind::Comparison);
        assert!(r.matches(&v("1.2.3")));
        assert!(r.matches(&v("1.9.9")));
        assert!(!r.matches(&v("2.0.0")));

        let r = req("> 1.2");
        assert!(!r.matches(&v("1.2.9")));
        assert!(r.matches(&v("1.3.0")));

        let r = req("<=1.2");
        assert!(r.matches(&v("1.2.9")));
        assert!(!r.matches(&v("1.3.0")));
    }

    #[test]
    fn test_version_req_hyphen_and_union() {
        let r = req("1.2.3 - 2.3");
        assert_eq!(r.kind(), RangeKind::Hyphen);
        assert!(r.matches(&v("2.3.9")));
        assert!(!r.matches(&v("2.4.0")));
        assert!(!r.matches(&v("1.2.2")));

        let r = req("^16.8.0 || ^17.0.0 || ^18.0.0");
        assert_eq!(r.kind(), RangeKind::Union);
        assert!(r.matches(&v("17.0.2")));
        assert!(r.matches(&v("18.2.0")));
        assert!(!r.matches(&v("15.0.0")));
    }

    #[test]
    fn test_prerelease_matching_rule() {
        let r = req("^1.2.3-beta.2");
        assert!(r.matches(&v("1.2.3-beta.4")));
        assert!(!r.matches(&v("1.2.4-beta.1")));
        assert!(r.matches(&v("1.5.0")));
    }

    #[test]
    fn test_invalid_ranges() {
        assert!(VersionReq::parse("latest").is_err());
        assert!(VersionReq::parse("workspace:*").is_err());
        assert!(VersionReq::parse(">=1.2.3<").is_err());
        assert!(VersionReq::parse("1.2-beta").is_err());
    }

    #[test]
    fn test_min_version() {
        assert_eq!(req("^1.2.3").min_version(), Some(v("1.2.3")));
        assert_eq!(req(">1.2.3").min_version(), Some(v("1.2.4")));
        assert_eq!(req("*").min_version(), Some(v("0.0.0")));
        assert_eq!(req("^2.0.0 || ^1.0.0").min_version(), Some(v("1.0.0")));
        assert_eq!(req(">2.0.0 <2.0.1").min_version(), None);
    }

    #[test]
    fn test_intersect() {
        let both = req("^1.2.0").intersect(&req(">=1.4.0")).unwrap();
        assert_eq!(both.to_string(), ">=1.4.0 <2.0.0-0");
        assert!(both.matches(&v("1.4.0")));
        assert!(!both.matches(&v("1.3.0")));

        assert!(req("^1.0.0").intersect(&req("^2.0.0")).is_none());

        let exact = req("1.5.0").intersect(&req("^1.0.0")).unwrap();
        assert_eq!(exact.to_string(), "1.5.0");
    }

    #[test]
    fn test_max_satisfying_prefers_stable() {
        let versions = vec![v("1.0.0"), v("1.4.0"), v("2.0.0-rc.1"), v("2.1.0")];
        assert_eq!(req("^1.0.0").max_satisfying(&versions), Some(v("1.4.0")));
        assert_eq!(req("*").max_satisfying(&versions), Some(v("2.1.0")));
        assert_eq!(req("^3.0.0").max_satisfying(&versions), None);
    }

    #[test]
    fn test_specificity_ranking() {
        assert!(RangeKind::Exact.specificity() > RangeKind::Tilde.specificity());
        assert!(RangeKind::Tilde.specificity() > RangeKind::Caret.specificity());
        assert!(RangeKind::Caret.specificity() > RangeKind::Comparison.specificity());
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn version_round_trip(
            major in 0u64..1000,
            minor in 0u64..1000,
            patch in 0u64..1000,
        ) {
            let original = Version::new(major, minor, patch);
            let parsed = Version::parse(&original.to_string()).unwrap();
            prop_assert_eq!(parsed, original);
        }

        #[test]
        fn caret_matches_same_major_at_or_above(
            major in 1u64..50,
            minor in 0u64..50,
            patch in 0u64..50,
            bump_minor in 0u64..10,
            bump_patch in 0u64..10,
        ) {
            let r = VersionReq::parse(&format!("^{}.{}.{}", major, minor, patch)).unwrap();
            let above = Version::new(major, minor + bump_minor, patch + bump_patch);
            let next_major = Version::new(major + 1, 0, 0);
            prop_assert!(r.matches(&above));
            prop_assert!(!r.matches(&next_major));
        }

        #[test]
        fn min_version_satisfies_range(
            major in 0u64..20,
            minor in 0u64..20,
            patch in 0u64..20,
            op in prop::sample::select(vec!["^", "~", ">=", ">", "=", ""]),
        ) {
            let r = VersionReq::parse(&format!("{}{}.{}.{}", op, major, minor, patch)).unwrap();
            let min = r.min_version().unwrap();
            prop_assert!(r.matches(&min));
        }

        #[test]
        fn unparsable_input_never_panics(input in "\\PC{0,24}") {
            let _ = VersionReq::parse(&input);
            let _ = Version::parse(&input);
            let _ = Version::coerce(&input);
        }

        #[test]
        fn version_comparison_transitivity(
            a in (0u64..20, 0u64..20, 0u64..20),
            b in (0u64..20, 0u64..20, 0u64..20),
            c in (0u64..20, 0u64..20, 0u64..20),
        ) {
            let a = Version::new(a.0, a.1, a.2);
            let b = Version::new(b.0, b.1, b.2);
            let c = Version::new(c.0, c.1, c.2);
            if a < b && b < c {
                prop_assert!(a < c);
            }
        }
    }
}
