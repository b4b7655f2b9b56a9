//! npm registry API response types

use std::collections::{BTreeMap, HashMap};

use graft_core::error::GraftError;
use graft_core::types::PackageManifest;
use serde::{Deserialize, Deserializer, Serialize};

use crate::RegistryResult;

/// Abbreviated package document (`application/vnd.npm.install-v1+json`)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PackumentResponse {
    /// Package name
    pub name: String,
    /// Tag to version mapping (`latest`, `next`, ...)
    #[serde(rename = "dist-tags", default)]
    pub dist_tags: HashMap<String, String>,
    /// All published versions
    #[serde(default)]
    pub versions: BTreeMap<String, VersionMetadata>,
}

/// Manifest of one published version, as returned by the registry
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionMetadata {
    pub name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "string_map")]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "string_map")]
    pub dev_dependencies: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "string_map")]
    pub peer_dependencies: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "string_map")]
    pub engines: BTreeMap<String, String>,
    // Free-form fields whose shape varies between publishers
    pub keywords: Option<serde_json::Value>,
    pub homepage: Option<serde_json::Value>,
    pub repository: Option<serde_json::Value>,
    pub bugs: Option<serde_json::Value>,
    pub license: Option<serde_json::Value>,
}

/// Accept any JSON for a dependency map, keeping only string-valued entries.
///
/// Old packages publish `engines` as an array; treating that as empty keeps
/// one odd field from failing the whole manifest.
fn string_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let map = match value {
        Some(serde_json::Value::Object(object)) => object
            .into_iter()
            .filter_map(|(key, value)| match value {
                serde_json::Value::String(range) => Some((key, range)),
                _ => None,
            })
            .collect(),
        _ => BTreeMap::new(),
    };
    Ok(map)
}

impl VersionMetadata {
    /// Create a minimal document for `name@version`
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            version: Some(version.to_string()),
            ..Self::default()
        }
    }

    pub fn with_peer(mut self, name: &str, range: &str) -> Self {
        self.peer_dependencies
            .insert(name.to_string(), range.to_string());
        self
    }

    pub fn with_dependency(mut self, name: &str, range: &str) -> Self {
        self.dependencies.insert(name.to_string(), range.to_string());
        self
    }

    /// Reject documents missing required fields or describing another package
    pub fn validate(&self, requested: &str) -> RegistryResult<()> {
        let malformed = |message: String| GraftError::ManifestParse {
            package: requested.to_string(),
            message,
        };

        let name = match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => return Err(malformed("missing required field 'name'".to_string())),
        };
        match self.version.as_deref().map(str::trim) {
            Some(version) if !version.is_empty() => {},
            _ => return Err(malformed("missing required field 'version'".to_string())),
        }
        if name != requested {
            return Err(malformed(format!(
                "registry returned manifest for '{}' instead",
                name
            )));
        }

        Ok(())
    }

    /// Convert into a normalized manifest. Call `validate` first.
    pub fn into_manifest(self, requested: &str) -> PackageManifest {
        let mut manifest = PackageManifest::new(
            self.name.unwrap_or_else(|| requested.to_string()),
            self.version.unwrap_or_default(),
        );
        manifest.description = self.description;
        manifest.dependencies = self.dependencies;
        manifest.dev_dependencies = self.dev_dependencies;
        manifest.peer_dependencies = self.peer_dependencies;
        manifest.engines = self.engines;
        manifest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_document() {
        let doc = serde_json::json!({
            "name": "react-dom",
            "version": "18.2.0",
            "description": "React package for working with the DOM.",
            "dependencies": { "loose-envify": "^1.1.0", "scheduler": "^0.23.0" },
            "peerDependencies": { "react": "^18.2.0" },
            "keywords": ["react"],
            "repository": { "type": "git", "url": "https://github.com/facebook/react.git" },
            "license": "MIT",
            "dist": { "tarball": "https://registry.npmjs.org/react-dom/-/react-dom-18.2.0.tgz" }
        });

        let metadata: VersionMetadata = serde_json::from_value(doc).unwrap();
        assert!(metadata.validate("react-dom").is_ok());

        let manifest = metadata.into_manifest("react-dom");
        assert_eq!(manifest.version, "18.2.0");
        assert_eq!(manifest.peer_dependencies["react"], "^18.2.0");
        assert_eq!(manifest.dependencies.len(), 2);
        assert!(manifest.dev_dependencies.is_empty());
        assert!(!manifest.fallback);
    }

    #[test]
    fn test_lenient_maps() {
        let doc = serde_json::json!({
            "name": "old-package",
            "version": "0.1.0",
            "engines": ["node >= 0.4"],
            "peerDependencies": { "a": "^1.0.0", "b": 2 }
        });

        let metadata: VersionMetadata = serde_json::from_value(doc).unwrap();
        assert!(metadata.engines.is_empty());
        assert_eq!(metadata.peer_dependencies.len(), 1);
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        let metadata: VersionMetadata = serde_json::from_str(r#"{"version":"1.0.0"}"#).unwrap();
        let err = metadata.validate("left-pad").unwrap_err();
        assert!(err.is_malformed());
        assert!(err.to_string().contains("name"));

        let metadata: VersionMetadata = serde_json::from_str(r#"{"name":"left-pad"}"#).unwrap();
        assert!(metadata.validate("left-pad").unwrap_err().to_string().contains("version"));
    }

    #[test]
    fn test_validate_rejects_other_package() {
        let metadata = VersionMetadata::new("lodash", "4.17.21");
        let err = metadata.validate("lodash-es").unwrap_err();
        assert!(matches!(err, GraftError::ManifestParse { .. }));
    }

    #[test]
    fn test_packument_defaults() {
        let packument: PackumentResponse =
            serde_json::from_str(r#"{"name":"tiny","versions":{"1.0.0":{"name":"tiny","version":"1.0.0"}}}"#)
                .unwrap();
        assert!(packument.dist_tags.is_empty());
        assert_eq!(packument.versions.len(), 1);
    }
}
