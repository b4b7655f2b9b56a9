//! Dependency declaration types.
//!
//! Defines package references as declared by templates, the three
//! dependency sets of a manifest, and the template package lists the
//! merger consumes.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Ordered `name -> range` map, iterated in declaration order
pub type DependencyMap = IndexMap<String, String>;

/// Declared package requirement
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageRef {
    pub name: String,
    #[serde(rename = "version")]
    pub version_range: String,
}

/// Which dependency set an entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DependencyKind {
    /// Runtime dependency
    Normal,
    /// Development-only dependency
    Dev,
    /// Peer dependency (must be provided by consumer)
    Peer,
}

/// Dependencies, devDependencies and peerDependencies of one manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencySet {
    #[serde(default)]
    pub dependencies: DependencyMap,
    #[serde(default)]
    pub dev_dependencies: DependencyMap,
    #[serde(default)]
    pub peer_dependencies: DependencyMap,
}

/// Packages declared by one feature template
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplatePackages {
    pub id: String,
    #[serde(default)]
    pub packages: Vec<PackageRef>,
    #[serde(default)]
    pub dev_packages: Vec<PackageRef>,
    #[serde(default)]
    pub peer_dependencies: Vec<PackageRef>,
}

impl PackageRef {
    pub fn new(name: impl Into<String>, version_range: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version_range: version_range.into(),
        }
    }

    /// Composite cache key, `name@range`
    pub fn key(&self) -> String {
        format!("{}@{}", self.name, self.version_range)
    }
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version_range)
    }
}

impl DependencyKind {
    /// All kinds, in the order templates declare them
    pub const ALL: [DependencyKind; 3] = [
        DependencyKind::Normal,
        DependencyKind::Dev,
        DependencyKind::Peer,
    ];

    /// Check if this dependency is needed at runtime
    pub fn is_runtime(&self) -> bool {
        matches!(self, DependencyKind::Normal)
    }

    /// Check if this dependency is only for development
    pub fn is_dev_only(&self) -> bool {
        matches!(self, DependencyKind::Dev)
    }

    /// Check if this dependency must be provided by the consumer
    pub fn is_peer(&self) -> bool {
        matches!(self, DependencyKind::Peer)
    }

    /// Manifest field name for this set
    pub fn field_name(&self) -> &'static str {
        match self {
            DependencyKind::Normal => "dependencies",
            DependencyKind::Dev => "devDependencies",
            DependencyKind::Peer => "peerDependencies",
        }
    }
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

impl DependencySet {
    pub fn get(&self, kind: DependencyKind) -> &DependencyMap {
        match kind {
            DependencyKind::Normal => &self.dependencies,
            DependencyKind::Dev => &self.dev_dependencies,
            DependencyKind::Peer => &self.peer_dependencies,
        }
    }

    pub fn get_mut(&mut self, kind: DependencyKind) -> &mut DependencyMap {
        match kind {
            DependencyKind::Normal => &mut self.dependencies,
            DependencyKind::Dev => &mut self.dev_dependencies,
            DependencyKind::Peer => &mut self.peer_dependencies,
        }
    }

    /// dependencies followed by devDependencies; the first declaration of a name wins
    pub fn runtime_and_dev(&self) -> DependencyMap {
        let mut combined = self.dependencies.clone();
        for (name, range) in &self.dev_dependencies {
            combined
                .entry(name.clone())
                .or_insert_with(|| range.clone());
        }
        combined
    }

    /// Number of entries across all three sets
    pub fn total(&self) -> usize {
        self.dependencies.len() + self.dev_dependencies.len() + self.peer_dependencies.len()
    }
}

impl TemplatePackages {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Add a runtime package
    pub fn with_package(mut self, name: &str, version_range: &str) -> Self {
        self.packages.push(PackageRef::new(name, version_range));
        self
    }

    /// Add a development package
    pub fn with_dev_package(mut self, name: &str, version_range: &str) -> Self {
        self.dev_packages.push(PackageRef::new(name, version_range));
        self
    }

    /// Add a peer requirement
    pub fn with_peer(mut self, name: &str, version_range: &str) -> Self {
        self.peer_dependencies
            .push(PackageRef::new(name, version_range));
        self
    }

    /// Declarations of one kind, in template order
    pub fn declared(&self, kind: DependencyKind) -> &[PackageRef] {
        match kind {
            DependencyKind::Normal => &self.packages,
            DependencyKind::Dev => &self.dev_packages,
            DependencyKind::Peer => &self.peer_dependencies,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_ref_serde_uses_version_field() {
        let pkg: PackageRef = serde_json::from_str(r#"{"name":"react","version":"^18.0.0"}"#).unwrap();
        assert_eq!(pkg.version_range, "^18.0.0");
        assert_eq!(pkg.key(), "react@^18.0.0");
        assert_eq!(pkg.to_string(), "react@^18.0.0");
    }

    #[test]
    fn test_dependency_kinds() {
        assert!(DependencyKind::Normal.is_runtime());
        assert!(!DependencyKind::Normal.is_dev_only());
        assert!(!DependencyKind::Normal.is_peer());

        assert!(!DependencyKind::Dev.is_runtime());
        assert!(DependencyKind::Dev.is_dev_only());

        assert!(DependencyKind::Peer.is_peer());
        assert_eq!(DependencyKind::Peer.to_string(), "peerDependencies");
    }

    #[test]
    fn test_runtime_and_dev_preserves_order() {
        let mut set = DependencySet::default();
        set.dependencies.insert("react".to_string(), "^18.0.0".to_string());
        set.dependencies.insert("next".to_string(), "^14.0.0".to_string());
        set.dev_dependencies.insert("typescript".to_string(), "^5.0.0".to_string());
        set.dev_dependencies.insert("react".to_string(), "^17.0.0".to_string());

        let combined = set.runtime_and_dev();
        let names: Vec<&str> = combined.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["react", "next", "typescript"]);
        assert_eq!(combined["react"], "^18.0.0");
        assert_eq!(set.total(), 4);
    }

    #[test]
    fn test_template_packages_builder() {
        let template = TemplatePackages::new("nextjs")
            .with_package("next", "^14.0.0")
            .with_dev_package("eslint", "^8.0.0")
            .with_peer("react", "^18.0.0");

        assert_eq!(template.declared(DependencyKind::Normal).len(), 1);
        assert_eq!(template.declared(DependencyKind::Dev)[0].name, "eslint");
        assert_eq!(template.declared(DependencyKind::Peer)[0].version_range, "^18.0.0");
    }

    #[test]
    fn test_template_packages_json() {
        let template: TemplatePackages = serde_json::from_str(
            r#"{"id":"tailwind","devPackages":[{"name":"tailwindcss","version":"^3.4.0"}]}"#,
        )
        .unwrap();
        assert!(template.packages.is_empty());
        assert_eq!(template.dev_packages[0].name, "tailwindcss");
    }
}
