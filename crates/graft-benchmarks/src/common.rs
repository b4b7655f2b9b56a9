//! Common utilities for benchmarks

use std::sync::Arc;
use std::time::Duration;

use criterion::Criterion;
use graft_config::{AnalyzerSettings, MergeSettings};
use graft_core::types::TemplatePackages;
use graft_registry::{InMemoryRegistry, MetadataCache, MetadataResolver, ResolverOptions};
use graft_resolver::{DependencyMerger, PeerDependencyAnalyzer};

/// Criterion defaults shared by all benches
pub fn criterion_config() -> Criterion {
    Criterion::default()
        .warm_up_time(Duration::from_secs(2))
        .measurement_time(Duration::from_secs(5))
        .sample_size(50)
}

/// `count` packages `pkg-0..pkg-N`, each published at 1.0.0 and 2.0.0.
/// Every fifth package declares a peer on its predecessor.
pub fn fixture_registry(count: usize) -> Arc<InMemoryRegistry> {
    let mut registry = InMemoryRegistry::new();
    for index in 0..count {
        let name = format!("pkg-{}", index);
        let peer = format!("pkg-{}", index.saturating_sub(1));
        let peers: Vec<(&str, &str)> = if index > 0 && index % 5 == 0 {
            vec![(peer.as_str(), "^2.0.0")]
        } else {
            Vec::new()
        };
        registry = registry
            .with_package(&name, "1.0.0", &peers)
            .with_package(&name, "2.0.0", &peers);
    }
    Arc::new(registry)
}

/// `templates` templates over `packages` packages; odd templates ask for
/// the newer major, so about half the declarations conflict
pub fn fixture_templates(templates: usize, packages: usize) -> Vec<TemplatePackages> {
    (0..templates)
        .map(|template| {
            let range = if template % 2 == 0 { "^1.0.0" } else { "^2.0.0" };
            (0..packages).fold(TemplatePackages::new(format!("template-{}", template)), |acc, index| {
                acc.with_package(&format!("pkg-{}", index), range)
            })
        })
        .collect()
}

/// Merger wired to `registry` through a fresh in-memory cache
pub fn merger_with_registry(registry: Arc<InMemoryRegistry>) -> DependencyMerger {
    let resolver = MetadataResolver::new(
        registry,
        Arc::new(MetadataCache::in_memory()),
        ResolverOptions {
            retry_delay: Duration::from_millis(1),
            ..ResolverOptions::default()
        },
    );
    let analyzer = PeerDependencyAnalyzer::new(
        resolver,
        AnalyzerSettings {
            batch_size: 10,
            batch_delay_ms: 0,
            timeout_ms: None,
        },
    );
    DependencyMerger::new(MergeSettings::default()).with_analyzer(analyzer)
}
