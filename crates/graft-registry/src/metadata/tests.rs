//! Unit tests for the metadata resolver

use super::*;
use crate::source::{InMemoryRegistry, ScriptedFailure};

fn options() -> ResolverOptions {
    ResolverOptions {
        retries: 3,
        retry_delay: Duration::from_millis(1),
        timeout: Duration::from_secs(5),
        ..ResolverOptions::default()
    }
}

fn registry() -> Arc<InMemoryRegistry> {
    Arc::new(
        InMemoryRegistry::new()
            .with_package("react", "17.0.2", &[])
            .with_package("react", "18.2.0", &[])
            .with_package("react-dom", "18.2.0", &[("react", "^18.2.0")])
            .with_package("@emotion/react", "11.11.1", &[("react", ">=16.8.0")]),
    )
}

fn resolver(registry: &Arc<InMemoryRegistry>, options: ResolverOptions) -> MetadataResolver {
    MetadataResolver::new(registry.clone(), Arc::new(MetadataCache::in_memory()), options)
}

#[tokio::test]
async fn test_resolve_fetches_and_caches_under_both_keys() {
    let registry = registry();
    let resolver = resolver(&registry, options());

    let manifest = resolver.resolve("react-dom", "^18.0.0").await;
    assert_eq!(manifest.version, "18.2.0");
    assert_eq!(manifest.peer_dependencies["react"], "^18.2.0");
    assert!(!manifest.is_degraded());

    assert!(resolver.cache().has("react-dom@^18.0.0"));
    assert!(resolver.cache().has("react-dom@18.2.0"));
    assert_eq!(resolver.diagnostics().counters().fetched, 1);
}

#[tokio::test]
async fn test_cache_hit_skips_registry() {
    let registry = registry();
    let resolver = resolver(&registry, options());

    resolver.resolve("react-dom", "^18.0.0").await;
    let calls = registry.total_calls();

    let again = resolver.resolve("react-dom", "^18.0.0").await;
    assert_eq!(again.version, "18.2.0");
    assert_eq!(registry.total_calls(), calls);

    // Another range selecting the same version only needs the lookup
    let other = resolver.resolve("react-dom", "~18.2.0").await;
    assert_eq!(other.version, "18.2.0");
    assert_eq!(registry.resolve_calls(), 2);
    assert_eq!(registry.fetch_calls(), 1);
}

#[tokio::test]
async fn test_scoped_package() {
    let registry = registry();
    let resolver = resolver(&registry, options());

    let manifest = resolver.resolve("@emotion/react", "^11.0.0").await;
    assert_eq!(manifest.version, "11.11.1");
    assert!(manifest.has_peers());
}

#[tokio::test]
async fn test_two_network_failures_then_success() {
    let registry = registry();
    registry.fail_next_fetches("react", 2, ScriptedFailure::Network("ECONNRESET".to_string()));
    let resolver = resolver(&registry, options());

    let manifest = resolver.resolve("react", "^18.0.0").await;
    assert_eq!(manifest.version, "18.2.0");
    assert!(!manifest.fallback);

    let report = resolver.diagnostics().drain();
    assert_eq!(report.network_errors.len(), 2);
    assert_eq!(report.network_errors[0].attempt, 1);
    assert_eq!(report.network_errors[1].attempt, 2);
    assert_eq!(report.counters.fallbacks, 0);
    assert_eq!(registry.fetch_calls(), 3);
}

#[tokio::test]
async fn test_timeouts_count_as_network_errors() {
    let registry = registry();
    registry.fail_next_fetches("react", 1, ScriptedFailure::Delay(Duration::from_millis(200)));
    let resolver = resolver(
        &registry,
        ResolverOptions {
            timeout: Duration::from_millis(20),
            ..options()
        },
    );

    let manifest = resolver.resolve("react", "18.2.0").await;
    assert_eq!(manifest.version, "18.2.0");
    assert!(!manifest.fallback);

    let report = resolver.diagnostics().drain();
    assert_eq!(report.network_errors.len(), 1);
    assert!(report.network_errors[0].message.contains("timed out"));
}

#[tokio::test]
async fn test_offline_makes_no_calls() {
    let registry = registry();
    let resolver = resolver(
        &registry,
        ResolverOptions {
            offline: true,
            ..options()
        },
    );

    for (name, range) in [("react", "^18.0.0"), ("react-dom", "^18.0.0"), ("vue", "^3.0.0")] {
        let manifest = resolver.resolve(name, range).await;
        assert!(manifest.offline);
        assert!(manifest.peer_dependencies.is_empty());
    }

    assert_eq!(registry.total_calls(), 0);
    assert_eq!(resolver.diagnostics().counters().offline, 3);
    assert!(resolver.cache().get("react@^18.0.0").is_none());
}

#[tokio::test]
async fn test_invalid_name_is_malformed_fallback() {
    let registry = registry();
    let resolver = resolver(&registry, options());

    let manifest = resolver.resolve("Not_A_Package", "^1.0.0").await;
    assert!(manifest.fallback);
    assert_eq!(manifest.fallback_reason, Some(FallbackReason::InvalidName));
    assert_eq!(registry.total_calls(), 0);

    let report = resolver.diagnostics().drain();
    assert_eq!(report.malformed.len(), 1);
    assert_eq!(report.malformed[0].package, "Not_A_Package");
    assert_eq!(report.counters.failed, 0);
}

#[tokio::test]
async fn test_version_lookup_failure_coerces_range() {
    let registry = registry();
    registry.fail_next_resolves("react", 1, ScriptedFailure::Network("EAI_AGAIN".to_string()));
    let resolver = resolver(&registry, options());

    let manifest = resolver.resolve("react", "^17.0.2").await;
    assert_eq!(manifest.version, "17.0.2");

    let report = resolver.diagnostics().drain();
    assert!(report.network_errors.is_empty());
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].category, DiagnosticCategory::VersionResolution);
}

#[tokio::test]
async fn test_cached_version_fallback() {
    let registry = registry();
    let resolver = resolver(&registry, options());
    resolver.resolve("react", "^17.0.0").await;

    registry.fail_next_fetches("react", 3, ScriptedFailure::Network("ECONNREFUSED".to_string()));
    let manifest = resolver.resolve("react", "^18.0.0").await;

    assert!(manifest.fallback);
    assert_eq!(manifest.fallback_reason, Some(FallbackReason::CachedVersion));
    assert_eq!(manifest.version, "17.0.2");
    assert!(manifest.fetch_error.is_some());
    // Fallbacks are never cached
    assert!(resolver.cache().get("react@^18.0.0").is_none());

    let report = resolver.diagnostics().drain();
    assert_eq!(report.network_errors.len(), 3);
    assert_eq!(report.counters.fallbacks, 1);
    assert_eq!(report.counters.failed, 0);
}

#[tokio::test]
async fn test_latest_fallback() {
    let registry = registry();
    registry.fail_next_fetches("react-dom", 3, ScriptedFailure::Network("socket hang up".to_string()));
    let resolver = resolver(&registry, options());

    let manifest = resolver.resolve("react-dom", "^18.0.0").await;
    assert!(manifest.fallback);
    assert_eq!(manifest.fallback_reason, Some(FallbackReason::LatestTag));
    assert_eq!(manifest.version, "18.2.0");
    assert_eq!(manifest.peer_dependencies["react"], "^18.2.0");
    assert_eq!(registry.fetch_calls(), 4);
}

#[tokio::test]
async fn test_skip_malformed() {
    let registry = registry();
    registry.publish_raw("broken", "1.0.0", VersionMetadata::default());
    let resolver = resolver(
        &registry,
        ResolverOptions {
            skip_malformed: true,
            try_latest_fallback: false,
            ..options()
        },
    );

    let manifest = resolver.resolve("broken", "1.0.0").await;
    assert_eq!(manifest.fallback_reason, Some(FallbackReason::SkippedMalformed));

    let report = resolver.diagnostics().drain();
    // Malformed documents are not retried
    assert_eq!(registry.fetch_calls(), 1);
    assert_eq!(report.malformed.len(), 1);
    assert_eq!(report.counters.skipped, 1);
    assert_eq!(report.counters.failed, 0);
    assert!(report.network_errors.is_empty());
}

#[tokio::test]
async fn test_fetch_failed() {
    let registry = registry();
    let resolver = resolver(
        &registry,
        ResolverOptions {
            allow_cached_fallback: false,
            try_latest_fallback: false,
            ..options()
        },
    );
    registry.fail_next_fetches("react", 3, ScriptedFailure::Network("ETIMEDOUT".to_string()));

    let manifest = resolver.resolve("react", "^18.0.0").await;
    assert!(manifest.fallback);
    assert_eq!(manifest.fallback_reason, Some(FallbackReason::FetchFailed));
    assert_eq!(manifest.version, "^18.0.0");

    let report = resolver.diagnostics().drain();
    assert_eq!(report.counters.failed, 1);
    assert_eq!(report.network_errors.len(), 3);
    assert!(report.errors.iter().any(|e| e.category == DiagnosticCategory::Fallback));
}

#[tokio::test]
async fn test_unknown_package_is_not_retried() {
    let registry = registry();
    let resolver = resolver(&registry, options());

    let manifest = resolver.resolve("left-pad", "^1.0.0").await;
    assert_eq!(manifest.fallback_reason, Some(FallbackReason::FetchFailed));
    // One fetch for the coerced version, one for latest
    assert_eq!(registry.fetch_calls(), 2);

    let report = resolver.diagnostics().drain();
    assert!(report.network_errors.is_empty());
    assert!(report.errors.iter().any(|e| e.category == DiagnosticCategory::Registry));
}

#[tokio::test]
async fn test_offline_cache_hit_keeps_fetched_manifest() {
    let registry = registry();
    let cache = Arc::new(MetadataCache::in_memory());
    let online = MetadataResolver::new(registry.clone(), cache.clone(), options());
    online.resolve("react", "^18.0.0").await;
    let calls = registry.total_calls();

    let offline = MetadataResolver::new(
        registry.clone(),
        cache,
        ResolverOptions {
            offline: true,
            ..options()
        },
    );
    let manifest = offline.resolve("react", "^18.0.0").await;
    // Cached data wins over the offline placeholder
    assert_eq!(manifest.version, "18.2.0");
    assert!(!manifest.offline);
    assert_eq!(offline.diagnostics().counters().offline, 0);
    assert_eq!(registry.total_calls(), calls);
}

/// Shell script standing in for npm that never answers and records SIGTERM
#[cfg(unix)]
fn hanging_npm(dir: &std::path::Path, marker: &std::path::Path) -> String {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("npm-hang");
    let body = format!(
        "#!/bin/sh\ntrap 'touch \"{}\"; exit 0' TERM\nsleep 5 &\nwait\n",
        marker.display()
    );
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().into_owned()
}

#[cfg(unix)]
fn hanging_settings(command: String) -> RegistrySettings {
    RegistrySettings {
        command,
        timeout_ms: 200,
        kill_grace_ms: 500,
        retries: 1,
        allow_cached_fallback: false,
        try_latest_fallback: false,
        ..RegistrySettings::default()
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_timed_out_command_receives_sigterm() {
    let dir = tempfile::TempDir::new().unwrap();
    let marker = dir.path().join("terminated");
    let settings = hanging_settings(hanging_npm(dir.path(), &marker));
    let resolver = MetadataResolver::from_settings(&settings, Arc::new(MetadataCache::in_memory())).unwrap();

    let manifest = resolver.resolve("react", "18.2.0").await;

    assert_eq!(manifest.fallback_reason, Some(FallbackReason::FetchFailed));
    assert!(marker.exists(), "timed-out command was killed without SIGTERM");
    let report = resolver.diagnostics().drain();
    assert!(report.network_errors.iter().any(|e| e.message.contains("timed out")));
}

#[cfg(unix)]
#[tokio::test]
async fn test_cancelled_resolve_terminates_command_gracefully() {
    let dir = tempfile::TempDir::new().unwrap();
    let marker = dir.path().join("terminated");
    let settings = hanging_settings(hanging_npm(dir.path(), &marker));
    let resolver = MetadataResolver::from_settings(&settings, Arc::new(MetadataCache::in_memory())).unwrap();

    let cancelled = tokio::time::timeout(Duration::from_millis(150), resolver.resolve("react", "18.2.0")).await;
    assert!(cancelled.is_err());

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(marker.exists(), "abandoned command was killed without SIGTERM");
}

#[test]
fn test_backoff_delay() {
    let base = Duration::from_millis(100);
    assert_eq!(backoff_delay(base, 1), Duration::from_millis(100));
    assert_eq!(backoff_delay(base, 2), Duration::from_millis(200));
    assert_eq!(backoff_delay(base, 3), Duration::from_millis(400));
    assert_eq!(backoff_delay(base, 40), MAX_RETRY_DELAY);
}

#[test]
fn test_coerce_range() {
    assert_eq!(coerce_range("^18.2.0"), "18.2.0");
    assert_eq!(coerce_range(">=1.4 <2"), "1.4.0");
    assert_eq!(coerce_range("next"), "next");
    assert_eq!(coerce_range("*"), "latest");
}
