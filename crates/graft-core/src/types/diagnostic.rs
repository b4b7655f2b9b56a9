//! Recorded warnings and errors.
//!
//! Every recoverable failure becomes a `Diagnostic` with a category and
//! severity instead of being dropped.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticCategory {
    /// Transport failure talking to the registry
    Network,
    /// Registry answered but the query failed
    Registry,
    /// Invalid name or unusable registry document
    Malformed,
    /// Version lookup failed and the range was coerced
    VersionResolution,
    /// Synthesized or substitute manifest in use
    Fallback,
    /// Offline mode skipped the registry
    Offline,
    /// Cache load or persist failure
    Cache,
    /// Direct version conflict between templates
    Conflict,
    /// Known cross-package incompatibility
    Compatibility,
    /// Peer requirement left unresolved
    PeerDependency,
    /// Failure outside any single package
    Orchestration,
}

/// One recorded warning or error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub category: DiagnosticCategory,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Diagnostic {
    pub fn new(category: DiagnosticCategory, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            category,
            severity,
            package: None,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Attach the package the diagnostic is about
    pub fn for_package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }
}

impl DiagnosticCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticCategory::Network => "network",
            DiagnosticCategory::Registry => "registry",
            DiagnosticCategory::Malformed => "malformed",
            DiagnosticCategory::VersionResolution => "version_resolution",
            DiagnosticCategory::Fallback => "fallback",
            DiagnosticCategory::Offline => "offline",
            DiagnosticCategory::Cache => "cache",
            DiagnosticCategory::Conflict => "conflict",
            DiagnosticCategory::Compatibility => "compatibility",
            DiagnosticCategory::PeerDependency => "peer_dependency",
            DiagnosticCategory::Orchestration => "orchestration",
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.package {
            Some(package) => write!(f, "[{}] {}: {}", self.category.as_str(), package, self.message),
            None => write!(f, "[{}] {}", self.category.as_str(), self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let diagnostic = Diagnostic::new(DiagnosticCategory::Network, Severity::Medium, "timed out")
            .for_package("react");
        assert_eq!(diagnostic.to_string(), "[network] react: timed out");

        let diagnostic = Diagnostic::new(DiagnosticCategory::Cache, Severity::Low, "disk full");
        assert_eq!(diagnostic.to_string(), "[cache] disk full");
    }
}
