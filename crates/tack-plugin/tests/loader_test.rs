//! Discovery and resolution tests against a JSON-speaking mock executor.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};
use tack_core::manifest::{CheckResult, Manifest};
use tack_core::traits::{PluginExecutor, PluginInstance, RegistryResolver};
use tack_core::{Error, Result};
use tack_plugin::{BundledPlugins, DiscoveryCache, Loader, SourceKind};
use tempfile::TempDir;

/// Treats plugin bytes as a JSON manifest and counts loads.
#[derive(Debug, Default)]
struct MockExecutor {
    loads: AtomicUsize,
}

impl MockExecutor {
    fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct MockInstance(Manifest);

impl PluginInstance for MockInstance {
    fn manifest(&self) -> &Manifest {
        &self.0
    }

    fn check(&mut self, config: &Map<String, Value>) -> Result<CheckResult> {
        Ok(CheckResult {
            data: config.clone(),
            ..CheckResult::default()
        })
    }
}

impl PluginExecutor for MockExecutor {
    fn load(&self, bytes: &[u8]) -> Result<Box<dyn PluginInstance>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let manifest: Manifest = serde_json::from_slice(bytes)?;
        Ok(Box::new(MockInstance(manifest)))
    }
}

fn manifest_bytes(name: &str, version: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "name": name,
        "version": version,
        "services": {
            name: {
                "name": name,
                "operations": [{ "name": "run" }]
            }
        }
    }))
    .unwrap()
}

struct Fixture {
    temp: TempDir,
    executor: Arc<MockExecutor>,
}

impl Fixture {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("plugins")).unwrap();
        Self {
            temp,
            executor: Arc::new(MockExecutor::default()),
        }
    }

    fn plugins_dir(&self) -> PathBuf {
        self.temp.path().join("plugins")
    }

    fn cache_path(&self) -> PathBuf {
        self.temp.path().join("state").join("discovery_cache.json")
    }

    fn write_plugin(&self, file: &str, name: &str, version: &str) -> PathBuf {
        let path = self.plugins_dir().join(file);
        fs::write(&path, manifest_bytes(name, version)).unwrap();
        path
    }

    fn loader(&self) -> Loader {
        Loader::new(self.plugins_dir(), self.executor.clone()).with_cache_path(self.cache_path())
    }
}

fn set_mtime(path: &Path, time: SystemTime) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(time)
        .unwrap();
}

fn mtime(path: &Path) -> SystemTime {
    fs::metadata(path).unwrap().modified().unwrap()
}

#[test]
fn test_end_to_end_single_local_plugin() {
    let fx = Fixture::new();
    fx.write_plugin("dns.wasm", "dns", "1.0.0");

    let plugins = fx.loader().discover_all();
    assert_eq!(plugins.len(), 1);
    assert_eq!(plugins[0].name(), "dns");
    assert_eq!(plugins[0].source, SourceKind::Local);
    assert!(plugins[0].source_path.ends_with("dns.wasm"));
}

#[test]
fn test_rediscovery_hits_cache_and_does_not_rewrite_it() {
    let fx = Fixture::new();
    fx.write_plugin("dns.wasm", "dns", "1.0.0");
    fx.write_plugin("http.wasm", "http", "0.1.0");

    let first = fx.loader().discover_all();
    assert_eq!(fx.executor.loads(), 2);
    assert!(fx.cache_path().exists());

    let old = SystemTime::now() - Duration::from_secs(3600);
    set_mtime(&fx.cache_path(), old);
    let cache_content = fs::read(fx.cache_path()).unwrap();

    let second = fx.loader().discover_all();
    assert_eq!(fx.executor.loads(), 2, "cache hit must not invoke the runtime");
    assert_eq!(mtime(&fx.cache_path()), old, "unchanged cache must not be rewritten");
    assert_eq!(fs::read(fx.cache_path()).unwrap(), cache_content);

    let names = |p: &[tack_plugin::DiscoveredPlugin]| {
        p.iter().map(|p| p.manifest.clone()).collect::<Vec<_>>()
    };
    assert_eq!(names(&first), names(&second));
}

#[test]
fn test_mtime_change_invalidates_entry() {
    let fx = Fixture::new();
    let path = fx.write_plugin("dns.wasm", "dns", "1.0.0");
    let _ = fx.loader().discover_all();
    assert_eq!(fx.executor.loads(), 1);

    set_mtime(&path, mtime(&path) + Duration::from_secs(10));
    let _ = fx.loader().discover_all();
    assert_eq!(fx.executor.loads(), 2);
}

#[test]
fn test_size_change_invalidates_entry() {
    let fx = Fixture::new();
    let path = fx.write_plugin("dns.wasm", "dns", "1.0.0");
    let original_mtime = mtime(&path);
    let _ = fx.loader().discover_all();

    // Same mtime, different length.
    fx.write_plugin("dns.wasm", "dns", "1.0.0-patched");
    set_mtime(&path, original_mtime);

    let plugins = fx.loader().discover_all();
    assert_eq!(fx.executor.loads(), 2);
    assert_eq!(plugins[0].manifest.version, "1.0.0-patched");
}

#[test]
fn test_unchanged_fingerprint_serves_cached_manifest() {
    let fx = Fixture::new();
    let path = fx.write_plugin("dns.wasm", "dns", "1.0.0");
    let original_mtime = mtime(&path);
    let _ = fx.loader().discover_all();

    // Same length and mtime: the cached manifest wins even though the
    // content changed.
    fx.write_plugin("dns.wasm", "dns", "9.9.9");
    set_mtime(&path, original_mtime);

    let plugins = fx.loader().discover_all();
    assert_eq!(fx.executor.loads(), 1);
    assert_eq!(plugins[0].manifest.version, "1.0.0");
}

#[test]
fn test_local_overrides_bundled() {
    let fx = Fixture::new();
    fx.write_plugin("dns.wasm", "dns", "2.0.0");

    let bundled = BundledPlugins::default()
        .with_file("dns.wasm", manifest_bytes("dns", "1.0.0"))
        .with_file("http.wasm", manifest_bytes("http", "1.0.0"));
    let plugins = fx.loader().with_bundled(bundled).discover_all();

    assert_eq!(plugins.len(), 2);
    let dns = plugins.iter().find(|p| p.name() == "dns").unwrap();
    assert_eq!(dns.source, SourceKind::Local);
    assert_eq!(dns.manifest.version, "2.0.0");
    let http = plugins.iter().find(|p| p.name() == "http").unwrap();
    assert_eq!(http.source, SourceKind::Bundled);
    assert_eq!(http.source_path, "bundled://plugins/http.wasm");
}

#[test]
fn test_bundled_cache_checks_size_only() {
    let fx = Fixture::new();
    let bundled = BundledPlugins::default().with_file("http.wasm", manifest_bytes("http", "1.0.0"));

    let _ = fx.loader().with_bundled(bundled.clone()).discover_all();
    let _ = fx.loader().with_bundled(bundled).discover_all();
    assert_eq!(fx.executor.loads(), 1);

    let cache = DiscoveryCache::load(&fx.cache_path());
    let entry = cache.entry("bundled://plugins/http.wasm").unwrap();
    assert!(entry.mod_time.is_none());
}

#[test]
fn test_broken_candidate_is_skipped() {
    let fx = Fixture::new();
    fx.write_plugin("dns.wasm", "dns", "1.0.0");
    fs::write(fx.plugins_dir().join("broken.wasm"), b"\0asm garbage").unwrap();
    fs::write(fx.plugins_dir().join("README.md"), b"not a plugin").unwrap();

    let plugins = fx.loader().discover_all();
    assert_eq!(plugins.len(), 1);
    assert_eq!(plugins[0].name(), "dns");
}

#[test]
fn test_nameless_manifest_is_skipped() {
    let fx = Fixture::new();
    fs::write(fx.plugins_dir().join("anon.wasm"), br#"{"name": ""}"#).unwrap();
    assert!(fx.loader().discover_all().is_empty());
}

#[test]
fn test_missing_plugins_dir_is_empty() {
    let temp = TempDir::new().unwrap();
    let loader = Loader::new(temp.path().join("absent"), Arc::new(MockExecutor::default()));
    assert!(loader.discover_all().is_empty());
}

#[test]
fn test_corrupt_cache_file_is_ignored() {
    let fx = Fixture::new();
    fx.write_plugin("dns.wasm", "dns", "1.0.0");
    fs::create_dir_all(fx.cache_path().parent().unwrap()).unwrap();
    fs::write(fx.cache_path(), b"][").unwrap();

    let plugins = fx.loader().discover_all();
    assert_eq!(plugins.len(), 1);
    assert_eq!(DiscoveryCache::load(&fx.cache_path()).len(), 1);
}

#[test]
fn test_discovery_order_is_lexicographic() {
    let fx = Fixture::new();
    for name in ["zeta", "alpha", "mid"] {
        fx.write_plugin(&format!("{name}.wasm"), name, "1.0.0");
    }
    let names: Vec<_> = fx
        .loader()
        .discover_all()
        .iter()
        .map(|p| p.name().to_string())
        .collect();
    assert_eq!(names, vec!["alpha", "mid", "zeta"]);
}

#[test]
fn test_byte_loader_sees_new_content_after_discovery() {
    let fx = Fixture::new();
    let path = fx.write_plugin("dns.wasm", "dns", "1.0.0");
    let plugins = fx.loader().discover_all();

    fs::write(&path, b"replaced").unwrap();
    assert_eq!(plugins[0].loader.load().unwrap(), b"replaced");
}

#[test]
fn test_discover_with_in_memory_cache() {
    let fx = Fixture::new();
    fx.write_plugin("dns.wasm", "dns", "1.0.0");
    let loader = Loader::new(fx.plugins_dir(), fx.executor.clone());

    let mut cache = DiscoveryCache::default();
    let _ = loader.discover_with_cache(&mut cache);
    assert!(cache.is_dirty());
    assert_eq!(cache.len(), 1);
    assert!(!fx.cache_path().exists());
}

#[tokio::test]
async fn test_load_by_name_prefers_exact_local_file() {
    let fx = Fixture::new();
    fx.write_plugin("dns.wasm", "dns", "exact");
    fx.write_plugin("dns@9.0.0.wasm", "dns", "versioned");

    let plugin = fx.loader().load_by_name("dns").await.unwrap();
    assert_eq!(plugin.manifest.version, "exact");
    assert_eq!(plugin.source, SourceKind::Local);
}

#[tokio::test]
async fn test_load_by_name_picks_greatest_version() {
    let fx = Fixture::new();
    fx.write_plugin("dns@1.0.0.wasm", "dns", "1.0.0");
    fx.write_plugin("dns@1.5.0.wasm", "dns", "1.5.0");

    let plugin = fx.loader().load_by_name("dns").await.unwrap();
    assert_eq!(plugin.manifest.version, "1.5.0");
}

#[tokio::test]
async fn test_load_by_name_falls_back_to_bundled() {
    let fx = Fixture::new();
    let bundled = BundledPlugins::default().with_file("http.wasm", manifest_bytes("http", "1.0.0"));

    let plugin = fx.loader().with_bundled(bundled).load_by_name("http").await.unwrap();
    assert_eq!(plugin.source, SourceKind::Bundled);
    assert_eq!(plugin.loader.load().unwrap(), manifest_bytes("http", "1.0.0"));
}

#[tokio::test]
async fn test_load_by_name_not_found() {
    let fx = Fixture::new();
    let err = fx.loader().load_by_name("ghost").await.unwrap_err();
    assert!(err.is_not_found());
}

#[derive(Debug)]
struct DirRegistry {
    dir: PathBuf,
    requested: std::sync::Mutex<Vec<String>>,
    delay: Duration,
}

#[async_trait]
impl RegistryResolver for DirRegistry {
    async fn resolve(&self, reference: &str) -> Result<PathBuf> {
        self.requested.lock().unwrap().push(reference.to_string());
        tokio::time::sleep(self.delay).await;
        let path = self.dir.join("fetched.wasm");
        if path.exists() {
            Ok(path)
        } else {
            Err(Error::RegistryFetch {
                reference: reference.to_string(),
                message: "manifest unknown".to_string(),
            })
        }
    }
}

#[tokio::test]
async fn test_load_by_name_uses_registry_last() {
    let fx = Fixture::new();
    let registry_dir = fx.temp.path().join("registry");
    fs::create_dir(&registry_dir).unwrap();
    fs::write(registry_dir.join("fetched.wasm"), manifest_bytes("tls", "3.0.0")).unwrap();

    let registry = Arc::new(DirRegistry {
        dir: registry_dir,
        requested: std::sync::Mutex::new(Vec::new()),
        delay: Duration::ZERO,
    });
    let loader = fx.loader().with_registry(registry.clone(), "ghcr.io/acme");

    let plugin = loader.load_by_name("tls@3.0.0").await.unwrap();
    assert_eq!(plugin.source, SourceKind::Registry);
    assert_eq!(plugin.manifest.name, "tls");
    assert_eq!(
        registry.requested.lock().unwrap().as_slice(),
        ["ghcr.io/acme/tls:3.0.0"]
    );
}

#[tokio::test]
async fn test_registry_failure_is_reported() {
    let fx = Fixture::new();
    let registry = Arc::new(DirRegistry {
        dir: fx.temp.path().join("empty"),
        requested: std::sync::Mutex::new(Vec::new()),
        delay: Duration::ZERO,
    });
    let err = fx
        .loader()
        .with_registry(registry, "ghcr.io/acme")
        .load_by_name("tls")
        .await
        .unwrap_err();
    assert!(err.is_registry_error());
}

#[tokio::test]
async fn test_registry_fetch_honors_timeout() {
    let fx = Fixture::new();
    let registry = Arc::new(DirRegistry {
        dir: fx.temp.path().to_path_buf(),
        requested: std::sync::Mutex::new(Vec::new()),
        delay: Duration::from_secs(5),
    });
    let err = fx
        .loader()
        .with_registry(registry, "ghcr.io/acme")
        .with_registry_timeout(Duration::from_millis(50))
        .load_by_name("tls")
        .await
        .unwrap_err();
    assert!(err.is_timeout());
}

#[test]
fn test_installed_files_matches_exact_and_versioned_only() {
    let fx = Fixture::new();
    fx.write_plugin("dns.wasm", "dns", "1.0.0");
    fx.write_plugin("dns@2.0.0.wasm", "dns", "2.0.0");
    fx.write_plugin("dnssec.wasm", "dnssec", "1.0.0");

    let names: Vec<String> = fx
        .loader()
        .installed_files("dns")
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["dns.wasm", "dns@2.0.0.wasm"]);
}

#[test]
fn test_install_file_copies_under_manifest_name() {
    let fx = Fixture::new();
    let download = fx.temp.path().join("download.wasm");
    fs::write(&download, manifest_bytes("http", "0.3.0")).unwrap();

    let (manifest, target) = fx.loader().install_file(&download).unwrap();
    assert_eq!(manifest.name, "http");
    assert_eq!(target, fx.plugins_dir().join("http.wasm"));
    assert_eq!(fs::read(&target).unwrap(), fs::read(&download).unwrap());

    let plugins = fx.loader().discover_all();
    assert_eq!(plugins[0].name(), "http");
}

#[test]
fn test_install_rejects_manifest_name_that_escapes_plugins_dir() {
    let fx = Fixture::new();
    let outside = fx.temp.path().join("outside");
    fs::create_dir(&outside).unwrap();

    let hostile = [
        outside.join("owned").display().to_string(),
        "../owned".to_string(),
        "nested/owned".to_string(),
        "..".to_string(),
    ];
    for name in hostile {
        let download = fx.temp.path().join("download.wasm");
        fs::write(&download, manifest_bytes(&name, "1.0.0")).unwrap();

        let err = fx.loader().install_file(&download).unwrap_err();
        assert!(err.is_load_error(), "{name}: {err}");
    }

    assert!(!outside.join("owned.wasm").exists());
    assert!(!fx.temp.path().join("owned.wasm").exists());
    assert_eq!(fs::read_dir(fx.plugins_dir()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_load_by_name_does_not_read_outside_plugins_dir() {
    let fx = Fixture::new();
    fs::write(fx.temp.path().join("secret.wasm"), manifest_bytes("secret", "1.0.0")).unwrap();

    let err = fx.loader().load_by_name("../secret").await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(fx.executor.loads(), 0);
}

#[test]
fn test_install_rejects_unloadable_file() {
    let fx = Fixture::new();
    let bogus = fx.temp.path().join("bogus.wasm");
    fs::write(&bogus, b"not a plugin").unwrap();

    let err = fx.loader().install_file(&bogus).unwrap_err();
    assert!(err.is_load_error());
    assert!(fx.loader().installed_files("bogus").is_empty());
}

#[test]
fn test_remove_deletes_every_version() {
    let fx = Fixture::new();
    fx.write_plugin("dns.wasm", "dns", "1.0.0");
    fx.write_plugin("dns@2.0.0.wasm", "dns", "2.0.0");
    fx.write_plugin("tls.wasm", "tls", "1.0.0");

    let removed = fx.loader().remove("dns").unwrap();
    assert_eq!(removed.len(), 2);
    assert!(fx.loader().installed_files("dns").is_empty());
    assert_eq!(fx.loader().installed_files("tls").len(), 1);

    assert!(fx.loader().remove("dns").unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_fetch_from_registry_skips_local_tier() {
    let fx = Fixture::new();
    fx.write_plugin("tls.wasm", "tls", "1.0.0");
    let registry_dir = fx.temp.path().join("registry");
    fs::create_dir(&registry_dir).unwrap();
    fs::write(registry_dir.join("fetched.wasm"), manifest_bytes("tls", "2.0.0")).unwrap();

    let registry = Arc::new(DirRegistry {
        dir: registry_dir,
        requested: std::sync::Mutex::new(Vec::new()),
        delay: Duration::ZERO,
    });
    let plugin = fx
        .loader()
        .with_registry(registry, "ghcr.io/acme")
        .fetch_from_registry("tls")
        .await
        .unwrap();

    assert_eq!(plugin.source, SourceKind::Registry);
    assert_eq!(plugin.manifest.version, "2.0.0");
}

#[tokio::test]
async fn test_fetch_without_registry_names_the_reference() {
    let fx = Fixture::new();
    let err = fx
        .loader()
        .with_default_registry("ghcr.io/acme")
        .fetch_from_registry("dns@1.2.0")
        .await
        .unwrap_err();

    assert!(err.is_registry_error());
    assert!(err.to_string().contains("ghcr.io/acme/dns:1.2.0"));
}
