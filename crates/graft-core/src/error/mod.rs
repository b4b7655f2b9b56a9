//! Error types and result aliases for graft operations.
//!
//! Provides a unified error type that covers every failure the registry,
//! analyzer and merger can report, with actionable suggestions.

use std::time::Duration;

use thiserror::Error;

use crate::types::VersionError;

/// Unified error type for all graft operations
#[derive(Error, Debug)]
pub enum GraftError {
    // Package errors
    #[error("Invalid package name '{name}': {reason}")]
    InvalidPackageName { name: String, reason: String },

    #[error("Package '{name}' not found in registry")]
    PackageNotFound { name: String },

    // Registry errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("{operation} timed out after {}ms", after.as_millis())]
    Timeout { operation: String, after: Duration },

    #[error("Registry query for '{package}' failed: {message}")]
    RegistryFetch { package: String, message: String },

    #[error("Malformed manifest for '{package}': {message}")]
    ManifestParse { package: String, message: String },

    // Version errors
    #[error("Invalid version '{input}': {source}")]
    VersionParse {
        input: String,
        #[source]
        source: VersionError,
    },

    #[error("Cannot reconcile {package}: {left} vs {right} ({reason})")]
    UnresolvableVersionConflict {
        package: String,
        left: String,
        right: String,
        reason: String,
    },

    // Orchestration errors
    #[error("Peer dependency analysis failed during {phase} phase: {message}")]
    AnalysisPhase { phase: String, message: String },

    // Config errors
    #[error("Configuration field '{field}' is invalid: {reason}")]
    ConfigValidation { field: String, reason: String },

    #[error("Failed to parse {path}: {message}")]
    ConfigParse { path: String, message: String },

    // IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

/// Result type alias for graft operations
pub type GraftResult<T> = Result<T, GraftError>;

/// Message fragments that identify transport-level failures regardless of
/// which backend produced them.
const NETWORK_PATTERNS: &[&str] = &[
    "timed out",
    "timeout",
    "etimedout",
    "econnrefused",
    "connection refused",
    "econnreset",
    "connection reset",
    "enotfound",
    "eai_again",
    "getaddrinfo",
    "dns",
    "socket hang up",
    "network",
    "registry error",
    "e500",
    "e502",
    "e503",
    "e504",
];

impl GraftError {
    /// Create a network error from any error type
    pub fn network<E>(message: String, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Network {
            message,
            source: Some(Box::new(source)),
        }
    }

    /// Create an IO error from std::io::Error
    pub fn io(message: String, source: std::io::Error) -> Self {
        Self::Io { message, source }
    }

    /// Create a timeout error for the named operation
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Whether this failure looks like a transport problem rather than bad data.
    ///
    /// Backends surface npm and HTTP failures as free text, so everything
    /// outside the dedicated variants is classified by message pattern.
    pub fn is_network_related(&self) -> bool {
        match self {
            GraftError::Network { .. } | GraftError::Timeout { .. } => true,
            GraftError::PackageNotFound { .. }
            | GraftError::InvalidPackageName { .. }
            | GraftError::ManifestParse { .. } => false,
            other => {
                let message = other.to_string().to_lowercase();
                NETWORK_PATTERNS.iter().any(|pattern| message.contains(pattern))
            }
        }
    }

    /// Whether retrying the same request may succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            GraftError::PackageNotFound { .. }
                | GraftError::InvalidPackageName { .. }
                | GraftError::ManifestParse { .. }
                | GraftError::VersionParse { .. }
        )
    }

    /// Whether this error means the registry returned unusable data
    pub fn is_malformed(&self) -> bool {
        matches!(self, GraftError::ManifestParse { .. } | GraftError::InvalidPackageName { .. })
    }

    /// Get a user-friendly suggestion for fixing this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            GraftError::InvalidPackageName { .. } => {
                Some("Package names must be lowercase and may only contain URL-safe characters")
            },
            GraftError::PackageNotFound { .. } => {
                Some("Check the package name spelling or try searching the registry")
            },
            GraftError::Network { .. } | GraftError::Timeout { .. } => {
                Some("Check your internet connection and registry configuration, or run offline")
            },
            GraftError::UnresolvableVersionConflict { .. } => {
                Some("Pick a version manually or merge with the 'smart' strategy")
            },
            GraftError::ConfigValidation { .. } | GraftError::ConfigParse { .. } => {
                Some("Fix the reported field in graft.toml or the GRAFT_* environment")
            },
            _ => None,
        }
    }
}

impl From<serde_json::Error> for GraftError {
    fn from(error: serde_json::Error) -> Self {
        GraftError::Serialization {
            message: error.to_string(),
        }
    }
}
