//! Peer-dependency conflicts and their proposed resolutions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Estimated runtime risk of a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// How far an automatic resolution can be trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Peer requirement has no entry in the dependency set
    MissingPeer,
    /// Entry exists but its range does not satisfy the requirement
    VersionMismatch,
    /// The ranges could not be compared
    VersionCheckFailed,
}

/// Peer requirement the dependency set does not meet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerConflict {
    pub kind: ConflictKind,
    /// Package declaring the peer requirement
    pub package: String,
    pub peer_dependency: String,
    pub required_version: String,
    pub installed_version: Option<String>,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionAction {
    Add,
    Update,
    Warn,
}

/// Proposed fix for one `PeerConflict`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerResolution {
    pub action: ResolutionAction,
    /// Package whose entry would change
    pub package: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_version: Option<String>,
    /// Range to add or update to; `None` for warnings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub confidence: Confidence,
    pub reason: String,
    /// Package whose peer requirement produced the conflict
    pub required_by: String,
}

impl PeerConflict {
    pub fn missing(package: &str, peer: &str, required: &str) -> Self {
        Self {
            kind: ConflictKind::MissingPeer,
            package: package.to_string(),
            peer_dependency: peer.to_string(),
            required_version: required.to_string(),
            installed_version: None,
            severity: Severity::High,
            error: None,
        }
    }

    pub fn mismatch(package: &str, peer: &str, required: &str, installed: &str) -> Self {
        Self {
            kind: ConflictKind::VersionMismatch,
            package: package.to_string(),
            peer_dependency: peer.to_string(),
            required_version: required.to_string(),
            installed_version: Some(installed.to_string()),
            severity: Severity::Medium,
            error: None,
        }
    }

    pub fn check_failed(
        package: &str,
        peer: &str,
        required: &str,
        installed: &str,
        error: String,
    ) -> Self {
        Self {
            kind: ConflictKind::VersionCheckFailed,
            package: package.to_string(),
            peer_dependency: peer.to_string(),
            required_version: required.to_string(),
            installed_version: Some(installed.to_string()),
            severity: Severity::Low,
            error: Some(error),
        }
    }
}

impl PeerResolution {
    /// Whether applying this resolution changes the dependency set
    pub fn mutates(&self) -> bool {
        self.action != ResolutionAction::Warn && self.version.is_some()
    }

    /// Eligible for automatic application
    pub fn is_auto_applicable(&self) -> bool {
        self.mutates() && self.confidence == Confidence::High
    }
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

impl ResolutionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionAction::Add => "add",
            ResolutionAction::Update => "update",
            ResolutionAction::Warn => "warn",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConflictKind::MissingPeer => "missing peer",
            ConflictKind::VersionMismatch => "version mismatch",
            ConflictKind::VersionCheckFailed => "version check failed",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_constructors_assign_severity() {
        assert_eq!(PeerConflict::missing("a", "b", "^1").severity, Severity::High);
        assert_eq!(
            PeerConflict::mismatch("a", "b", "^2", "^1").severity,
            Severity::Medium
        );
        let failed = PeerConflict::check_failed("a", "b", "^2", "latest", "bad".to_string());
        assert_eq!(failed.severity, Severity::Low);
        assert_eq!(failed.kind, ConflictKind::VersionCheckFailed);
    }

    #[test]
    fn test_ordering() {
        assert!(Severity::High > Severity::Medium);
        assert!(Confidence::High > Confidence::Low);
    }

    #[test]
    fn test_warn_never_mutates() {
        let warn = PeerResolution {
            action: ResolutionAction::Warn,
            package: "react".to_string(),
            from_version: None,
            version: Some("^18.0.0".to_string()),
            confidence: Confidence::High,
            reason: "check manually".to_string(),
            required_by: "react-dom".to_string(),
        };
        assert!(!warn.mutates());
        assert!(!warn.is_auto_applicable());

        let add = PeerResolution {
            action: ResolutionAction::Add,
            ..warn
        };
        assert!(add.is_auto_applicable());
    }

    #[test]
    fn test_serialized_tags() {
        let conflict = PeerConflict::missing("pkg-a", "pkg-b", "^2.0.0");
        let json = serde_json::to_value(&conflict).unwrap();
        assert_eq!(json["kind"], "missing_peer");
        assert_eq!(json["severity"], "high");
        assert_eq!(json["peerDependency"], "pkg-b");
    }
}
