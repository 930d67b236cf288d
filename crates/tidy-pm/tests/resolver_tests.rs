//! Integration tests for the concurrent resolver
//!
//! These run against an in-process HTTP fixture, never the real registry.

mod support;

use parking_lot::Mutex;
use std::sync::Arc;
use tempfile::TempDir;
use tidy_pm::events::{Event, Progress};
use tidy_pm::{ManifestCache, PackageJson, RegistryClient, Resolver};

/// Collects progress events for assertions.
struct Recorder(Arc<Mutex<Vec<Event>>>);

impl Progress for Recorder {
    fn event(&self, event: &Event) {
        self.0.lock().push(event.clone());
    }
}

fn client_for(registry: &support::Registry, cache_dir: &std::path::Path) -> Arc<RegistryClient> {
    let cache = Arc::new(ManifestCache::with_root(cache_dir.to_path_buf()));
    Arc::new(RegistryClient::with_registry_and_cache(&registry.url(), cache).unwrap())
}

fn manifest(deps: &[(&str, &str)]) -> PackageJson {
    let entries: Vec<String> = deps
        .iter()
        .map(|(name, range)| format!(r#""{}": "{}""#, name, range))
        .collect();
    PackageJson::from_str(&format!(
        r#"{{"name": "app", "dependencies": {{{}}}}}"#,
        entries.join(", ")
    ))
    .unwrap()
}

#[test]
fn test_transitive_graph_resolves_flat() {
    let registry = support::Registry::spawn();
    let base = registry.url();
    registry.add_manifest("a", "1.0.0", "1.0.0", &[("c", "1.2.3")], &format!("{base}/t/a"));
    registry.add_manifest(
        "b",
        "2.0.0",
        "2.0.0",
        &[("c", "1.2.3"), ("d", "*")],
        &format!("{base}/t/b"),
    );
    registry.add_manifest("c", "1.2.3", "1.2.3", &[], &format!("{base}/t/c"));
    registry.add_manifest("d", "latest", "4.4.4", &[], &format!("{base}/t/d"));

    let project = TempDir::new().unwrap();
    let cache_dir = TempDir::new().unwrap();
    let client = client_for(&registry, cache_dir.path());

    let resolved = Resolver::new(client, project.path())
        .with_workers(8)
        .resolve(&manifest(&[("a", "^1.0.0"), ("b", "^2.0.0")]))
        .unwrap();

    assert_eq!(resolved.len(), 4);
    assert_eq!(resolved["a"].version, "1.0.0");
    assert_eq!(resolved["b"].version, "2.0.0");
    assert_eq!(resolved["c"].version, "1.2.3");
    assert_eq!(resolved["d"].version, "4.4.4");
    assert!(resolved["d"].tarball.ends_with("/t/d"));

    // The shared dependency is fetched exactly once.
    assert_eq!(registry.hit_count("/c/1.2.3"), 1);
}

#[test]
fn test_cycles_terminate() {
    let registry = support::Registry::spawn();
    let base = registry.url();
    registry.add_manifest("x", "1.0.0", "1.0.0", &[("y", "1.0.0")], &format!("{base}/t/x"));
    registry.add_manifest("y", "1.0.0", "1.0.0", &[("x", "1.0.0")], &format!("{base}/t/y"));

    let project = TempDir::new().unwrap();
    let cache_dir = TempDir::new().unwrap();
    let client = client_for(&registry, cache_dir.path());

    let resolved = Resolver::new(client, project.path())
        .with_workers(4)
        .resolve(&manifest(&[("x", "1.0.0")]))
        .unwrap();

    assert_eq!(resolved.len(), 2);
    assert_eq!(registry.hit_count("/x/1.0.0"), 1);
    assert_eq!(registry.hit_count("/y/1.0.0"), 1);
}

#[test]
fn test_unresolvable_subtree_is_dropped() {
    let registry = support::Registry::spawn();
    let base = registry.url();
    registry.add_manifest(
        "a",
        "1.0.0",
        "1.0.0",
        &[("ghost", "9.9.9")],
        &format!("{base}/t/a"),
    );

    let project = TempDir::new().unwrap();
    let cache_dir = TempDir::new().unwrap();
    let client = client_for(&registry, cache_dir.path());

    let events = Arc::new(Mutex::new(Vec::new()));
    let resolved = Resolver::new(client, project.path())
        .with_workers(4)
        .with_progress(Arc::new(Recorder(events.clone())))
        .resolve(&manifest(&[("a", "1.0.0")]))
        .unwrap();

    assert_eq!(resolved.len(), 1);
    assert!(resolved.contains_key("a"));
    assert!(!resolved.contains_key("ghost"));

    let saw_failure = events
        .lock()
        .iter()
        .any(|event| matches!(event, Event::FetchFailed { name, .. } if name == "ghost"));
    assert!(saw_failure, "expected a FetchFailed event for ghost");
}

#[test]
fn test_second_resolve_uses_snapshot() {
    let registry = support::Registry::spawn();
    let base = registry.url();
    registry.add_manifest("a", "1.0.0", "1.0.0", &[], &format!("{base}/t/a"));

    let project = TempDir::new().unwrap();
    let cache_dir = TempDir::new().unwrap();
    let client = client_for(&registry, cache_dir.path());

    let pkg = manifest(&[("a", "1.0.0")]);
    let resolver = Resolver::new(client, project.path()).with_workers(4);

    let first = resolver.resolve(&pkg).unwrap();
    let hits_after_first = registry.total_hits();

    let events = Arc::new(Mutex::new(Vec::new()));
    let resolver = resolver.with_progress(Arc::new(Recorder(events.clone())));
    let second = resolver.resolve(&pkg).unwrap();

    assert_eq!(first, second);
    assert_eq!(registry.total_hits(), hits_after_first, "no new fetches");
    assert!(events
        .lock()
        .iter()
        .any(|event| matches!(event, Event::Resolved { from_cache: true, .. })));
}

#[test]
fn test_manifest_change_invalidates_snapshot() {
    let registry = support::Registry::spawn();
    let base = registry.url();
    registry.add_manifest("a", "1.0.0", "1.0.0", &[], &format!("{base}/t/a"));
    registry.add_manifest("b", "latest", "2.0.0", &[], &format!("{base}/t/b"));

    let project = TempDir::new().unwrap();
    let cache_dir = TempDir::new().unwrap();
    let client = client_for(&registry, cache_dir.path());
    let resolver = Resolver::new(client, project.path()).with_workers(4);

    let first = resolver.resolve(&manifest(&[("a", "1.0.0")])).unwrap();
    assert_eq!(first.len(), 1);

    let second = resolver
        .resolve(&manifest(&[("a", "1.0.0"), ("b", "*")]))
        .unwrap();
    assert_eq!(second.len(), 2);
    assert!(second.contains_key("b"));
}

#[test]
fn test_two_runs_share_the_manifest_cache() {
    let registry = support::Registry::spawn();
    let base = registry.url();
    registry.add_manifest("shared", "1.0.0", "1.0.0", &[], &format!("{base}/t/s"));
    registry.add_manifest("only-a", "1.0.0", "1.0.0", &[], &format!("{base}/t/oa"));
    registry.add_manifest("only-b", "1.0.0", "1.0.0", &[], &format!("{base}/t/ob"));

    let cache_dir = TempDir::new().unwrap();
    let client = client_for(&registry, cache_dir.path());

    let project_a = TempDir::new().unwrap();
    let set_a = Resolver::new(client.clone(), project_a.path())
        .with_workers(4)
        .resolve(&manifest(&[("shared", "1.0.0"), ("only-a", "1.0.0")]))
        .unwrap();

    let project_b = TempDir::new().unwrap();
    let set_b = Resolver::new(client, project_b.path())
        .with_workers(4)
        .resolve(&manifest(&[("shared", "1.0.0"), ("only-b", "1.0.0")]))
        .unwrap();

    assert!(set_a.contains_key("shared") && set_a.contains_key("only-a"));
    assert!(set_b.contains_key("shared") && set_b.contains_key("only-b"));

    // The overlapping manifest went over the wire once.
    assert_eq!(registry.hit_count("/shared/1.0.0"), 1);
}

#[test]
fn test_empty_manifest_resolves_empty() {
    let registry = support::Registry::spawn();
    let project = TempDir::new().unwrap();
    let cache_dir = TempDir::new().unwrap();
    let client = client_for(&registry, cache_dir.path());

    let resolved = Resolver::new(client, project.path())
        .with_workers(4)
        .resolve(&PackageJson::default())
        .unwrap();

    assert!(resolved.is_empty());
    assert_eq!(registry.total_hits(), 0);
}
