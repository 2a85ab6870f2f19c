//! Plugin source resolution.
//!
//! Plugins come from three tiers:
//!
//! 1. **Bundled** - compiled into the binary
//! 2. **Local** - `.wasm` files in the plugins directory
//! 3. **Registry** - fetched on demand through a [`RegistryResolver`]
//!
//! Discovery enumerates the first two tiers and lets a local plugin replace
//! a bundled plugin of the same name. Lookup by name walks all three.
//!
//! # Examples
//!
//! ```no_run
//! use tack_plugin::Loader;
//! # use tack_core::traits::PluginExecutor;
//! # use std::sync::Arc;
//!
//! # fn example(executor: Arc<dyn PluginExecutor>) {
//! let loader = Loader::new("/home/me/.tack/plugins", executor)
//!     .with_cache_path("/home/me/.tack/discovery_cache.json");
//!
//! for plugin in loader.discover_all() {
//!     println!("{} ({})", plugin.name(), plugin.source);
//! }
//! # }
//! ```

use crate::bundled::BundledPlugins;
use crate::cache::DiscoveryCache;
use crate::source::{ByteLoader, DiscoveredPlugin, SourceKind};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tack_core::config::DEFAULT_REGISTRY;
use tack_core::manifest::Manifest;
use tack_core::traits::{PluginExecutor, RegistryResolver};
use tack_core::{Error, Result};

/// File extension of plugin binaries.
pub const PLUGIN_EXTENSION: &str = "wasm";

/// Default bound on a registry fetch.
pub const DEFAULT_REGISTRY_TIMEOUT: Duration = Duration::from_secs(30);

/// Finds plugins across source tiers.
pub struct Loader {
    bundled: BundledPlugins,
    plugins_dir: PathBuf,
    cache_path: Option<PathBuf>,
    executor: Arc<dyn PluginExecutor>,
    registry: Option<Arc<dyn RegistryResolver>>,
    default_registry: String,
    registry_timeout: Duration,
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("bundled", &self.bundled)
            .field("plugins_dir", &self.plugins_dir)
            .field("cache_path", &self.cache_path)
            .field("registry", &self.registry.is_some())
            .field("default_registry", &self.default_registry)
            .finish_non_exhaustive()
    }
}

impl Loader {
    /// Creates a loader over `plugins_dir` with no bundled plugins, no
    /// persisted cache, and no registry.
    pub fn new(plugins_dir: impl Into<PathBuf>, executor: Arc<dyn PluginExecutor>) -> Self {
        Self {
            bundled: BundledPlugins::default(),
            plugins_dir: plugins_dir.into(),
            cache_path: None,
            executor,
            registry: None,
            default_registry: DEFAULT_REGISTRY.to_string(),
            registry_timeout: DEFAULT_REGISTRY_TIMEOUT,
        }
    }

    /// Sets the bundled tier.
    #[must_use]
    pub fn with_bundled(mut self, bundled: BundledPlugins) -> Self {
        self.bundled = bundled;
        self
    }

    /// Persists the discovery cache at `path`.
    #[must_use]
    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    /// Enables the registry fallback.
    #[must_use]
    pub fn with_registry(
        mut self,
        resolver: Arc<dyn RegistryResolver>,
        default_registry: impl Into<String>,
    ) -> Self {
        self.registry = Some(resolver);
        self.default_registry = default_registry.into();
        self
    }

    /// Sets the registry prefix used to qualify short plugin names.
    #[must_use]
    pub fn with_default_registry(mut self, default_registry: impl Into<String>) -> Self {
        self.default_registry = default_registry.into();
        self
    }

    /// Bounds each registry fetch.
    #[must_use]
    pub const fn with_registry_timeout(mut self, timeout: Duration) -> Self {
        self.registry_timeout = timeout;
        self
    }

    /// Local plugins directory.
    #[must_use]
    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    /// Discovery cache location, if persisted.
    #[must_use]
    pub fn cache_path(&self) -> Option<&Path> {
        self.cache_path.as_deref()
    }

    /// Discovers every bundled and local plugin.
    ///
    /// Loads the persisted cache, runs [`Loader::discover_with_cache`], and
    /// saves the cache once if any entry changed. Failing to save is logged
    /// and otherwise ignored.
    #[must_use]
    pub fn discover_all(&self) -> Vec<DiscoveredPlugin> {
        let mut cache = self
            .cache_path
            .as_deref()
            .map(DiscoveryCache::load)
            .unwrap_or_default();

        let plugins = self.discover_with_cache(&mut cache);

        if cache.is_dirty() {
            if let Some(path) = &self.cache_path {
                if let Err(e) = cache.save(path) {
                    tracing::warn!("Failed to save discovery cache: {}", e);
                }
            }
        }

        plugins
    }

    /// Discovers plugins using `cache` for manifests and updating it for
    /// every miss.
    ///
    /// Bundled plugins are enumerated first, then local files; a local
    /// plugin replaces a bundled plugin with the same name. Within a tier
    /// files are visited in file-name order, so a later file wins a name
    /// clash. The result is sorted by plugin name.
    ///
    /// A candidate that cannot be read or whose manifest cannot be loaded
    /// is logged and skipped.
    pub fn discover_with_cache(&self, cache: &mut DiscoveryCache) -> Vec<DiscoveredPlugin> {
        let mut plugins: BTreeMap<String, DiscoveredPlugin> = BTreeMap::new();

        for plugin in self.discover_bundled(cache) {
            plugins.insert(plugin.manifest.name.clone(), plugin);
        }

        for plugin in self.discover_local(cache) {
            if let Some(previous) = plugins.get(&plugin.manifest.name) {
                tracing::debug!(
                    "Plugin '{}' from {} overrides {} source {}",
                    plugin.manifest.name,
                    plugin.source_path,
                    previous.source,
                    previous.source_path
                );
            }
            plugins.insert(plugin.manifest.name.clone(), plugin);
        }

        tracing::debug!("Discovered {} plugin(s)", plugins.len());
        plugins.into_values().collect()
    }

    fn discover_bundled(&self, cache: &mut DiscoveryCache) -> Vec<DiscoveredPlugin> {
        let mut found = Vec::new();

        for (file_name, bytes) in self.bundled.wasm_files() {
            let key = BundledPlugins::key(file_name);
            let size = bytes.len() as u64;

            let manifest = if let Some(cached) = cache.bundled(&key, size) {
                tracing::debug!("Cache hit for {}", key);
                cached.clone()
            } else {
                tracing::debug!("Cache miss for {}", key);
                match self.read_manifest(bytes, Path::new(&key)) {
                    Ok(manifest) => {
                        cache.insert_bundled(key.clone(), size, manifest.clone());
                        manifest
                    }
                    Err(e) => {
                        tracing::warn!("Skipping bundled plugin {}: {}", file_name, e);
                        continue;
                    }
                }
            };

            if let Some(plugin) = named(manifest, SourceKind::Bundled, key, || {
                ByteLoader::bundled(Arc::clone(bytes))
            }) {
                found.push(plugin);
            }
        }

        found
    }

    fn discover_local(&self, cache: &mut DiscoveryCache) -> Vec<DiscoveredPlugin> {
        let files = match list_wasm_files(&self.plugins_dir) {
            Ok(files) => files,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(
                    "Plugins directory {} does not exist",
                    self.plugins_dir.display()
                );
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!(
                    "Skipping local plugins: cannot read {}: {}",
                    self.plugins_dir.display(),
                    e
                );
                return Vec::new();
            }
        };

        let mut found = Vec::new();

        for path in files {
            let key = path.display().to_string();

            let (size, mod_time) = match file_fingerprint(&path) {
                Ok(fingerprint) => fingerprint,
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", key, e);
                    continue;
                }
            };

            let manifest = if let Some(cached) = cache.local(&key, size, mod_time) {
                tracing::debug!("Cache hit for {}", key);
                cached.clone()
            } else {
                tracing::debug!("Cache miss for {}", key);
                match self.read_manifest_from_file(&path) {
                    Ok(manifest) => {
                        cache.insert_local(key.clone(), size, mod_time, manifest.clone());
                        manifest
                    }
                    Err(e) => {
                        tracing::warn!("Skipping {}: {}", key, e);
                        continue;
                    }
                }
            };

            if let Some(plugin) = named(manifest, SourceKind::Local, key, || {
                ByteLoader::file(path.clone())
            }) {
                found.push(plugin);
            }
        }

        found
    }

    /// Resolves one plugin by name.
    ///
    /// Resolution order:
    ///
    /// 1. `<plugins_dir>/<name>.wasm`
    /// 2. `<plugins_dir>/<name>@<version>.wasm`, lexicographically greatest
    /// 3. bundled `<name>.wasm`
    /// 4. the registry, if one is configured
    ///
    /// The manifest is always read from the plugin; the discovery cache is
    /// not consulted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if every tier misses, or the error of the
    /// tier that matched but failed to load.
    pub async fn load_by_name(&self, name: &str) -> Result<DiscoveredPlugin> {
        // Qualified references and anything else that is not a bare file
        // name only make sense to the registry.
        if !is_plain_name(name) {
            if let Some(registry) = &self.registry {
                return self.load_from_registry(registry.as_ref(), name).await;
            }
            return Err(Error::NotFound {
                name: name.to_string(),
            });
        }

        let exact = self
            .plugins_dir
            .join(format!("{name}.{PLUGIN_EXTENSION}"));
        if exact.is_file() {
            return self.load_local_file(exact);
        }

        if let Some(versioned) = latest_versioned_file(&self.plugins_dir, name) {
            return self.load_local_file(versioned);
        }

        let file_name = format!("{name}.{PLUGIN_EXTENSION}");
        if let Some(bytes) = self.bundled.get(&file_name) {
            let source_path = BundledPlugins::key(&file_name);
            let manifest = self.read_manifest(&bytes, Path::new(&source_path))?;
            return Ok(DiscoveredPlugin {
                manifest,
                source: SourceKind::Bundled,
                source_path,
                loader: ByteLoader::bundled(bytes),
            });
        }

        if let Some(registry) = &self.registry {
            return self.load_from_registry(registry.as_ref(), name).await;
        }

        Err(Error::NotFound {
            name: name.to_string(),
        })
    }

    /// Fetches `name` from the registry without looking at the local or
    /// bundled tiers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RegistryFetch`] if no registry resolver is
    /// configured, otherwise whatever the fetch returns.
    pub async fn fetch_from_registry(&self, name: &str) -> Result<DiscoveredPlugin> {
        let Some(registry) = &self.registry else {
            return Err(Error::RegistryFetch {
                reference: registry_reference(&self.default_registry, name),
                message: "no registry resolver is configured".to_string(),
            });
        };
        self.load_from_registry(registry.as_ref(), name).await
    }

    async fn load_from_registry(
        &self,
        registry: &dyn RegistryResolver,
        name: &str,
    ) -> Result<DiscoveredPlugin> {
        let reference = registry_reference(&self.default_registry, name);
        tracing::info!("Fetching plugin {} from registry", reference);

        let path = tokio::time::timeout(self.registry_timeout, registry.resolve(&reference))
            .await
            .map_err(|_| Error::Timeout {
                operation: format!("registry fetch of {reference}"),
                duration_secs: self.registry_timeout.as_secs(),
            })??;

        let manifest = self.read_manifest_from_file(&path)?;
        Ok(DiscoveredPlugin {
            manifest,
            source: SourceKind::Registry,
            source_path: path.display().to_string(),
            loader: ByteLoader::file(path),
        })
    }

    /// Installed local files for `name`: `<name>.wasm` and every
    /// `<name>@<version>.wasm`, sorted.
    #[must_use]
    pub fn installed_files(&self, name: &str) -> Vec<PathBuf> {
        let exact = format!("{name}.{PLUGIN_EXTENSION}");
        let prefix = format!("{name}@");
        list_wasm_files(&self.plugins_dir)
            .unwrap_or_default()
            .into_iter()
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n == exact || n.starts_with(&prefix))
            })
            .collect()
    }

    /// Copies a plugin file into the plugins directory as `<name>.wasm`.
    ///
    /// The manifest is read first, so a file the runtime cannot load is
    /// rejected before anything is written.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not a loadable plugin,
    /// has no name, or cannot be written.
    pub fn install_file(&self, path: &Path) -> Result<(Manifest, PathBuf)> {
        let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
        let manifest = self.read_manifest(&bytes, path)?;
        if manifest.name.is_empty() {
            return Err(Error::LoadError {
                source_path: path.to_path_buf(),
                message: "manifest has no name".to_string(),
            });
        }
        if !is_plain_name(&manifest.name) {
            return Err(Error::LoadError {
                source_path: path.to_path_buf(),
                message: format!("manifest name '{}' is not a valid file name", manifest.name),
            });
        }

        fs::create_dir_all(&self.plugins_dir).map_err(|e| Error::io(&self.plugins_dir, e))?;
        let target = self
            .plugins_dir
            .join(format!("{}.{PLUGIN_EXTENSION}", manifest.name));
        fs::write(&target, &bytes).map_err(|e| Error::io(&target, e))?;

        tracing::info!("Installed {} v{} to {}", manifest.name, manifest.version, target.display());
        Ok((manifest, target))
    }

    /// Deletes every installed local file for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if nothing is installed, or an I/O error
    /// if a file cannot be removed.
    pub fn remove(&self, name: &str) -> Result<Vec<PathBuf>> {
        let files = self.installed_files(name);
        if files.is_empty() {
            return Err(Error::NotFound {
                name: name.to_string(),
            });
        }
        for file in &files {
            fs::remove_file(file).map_err(|e| Error::io(file, e))?;
        }
        Ok(files)
    }

    fn load_local_file(&self, path: PathBuf) -> Result<DiscoveredPlugin> {
        let manifest = self.read_manifest_from_file(&path)?;
        Ok(DiscoveredPlugin {
            manifest,
            source: SourceKind::Local,
            source_path: path.display().to_string(),
            loader: ByteLoader::file(path),
        })
    }

    fn read_manifest_from_file(&self, path: &Path) -> Result<Manifest> {
        let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
        self.read_manifest(&bytes, path)
    }

    /// One runtime call; the instance is dropped immediately.
    fn read_manifest(&self, bytes: &[u8], source: &Path) -> Result<Manifest> {
        let instance = self.executor.load(bytes).map_err(|e| Error::LoadError {
            source_path: source.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(instance.manifest().clone())
    }
}

/// Returns `true` if `name` can be used as a file name inside the plugins
/// directory: one normal path component with no separators or `..`.
///
/// # Examples
///
/// ```
/// use tack_plugin::loader::is_plain_name;
///
/// assert!(is_plain_name("dns"));
/// assert!(is_plain_name("dns@1.2.0"));
/// assert!(!is_plain_name("../dns"));
/// assert!(!is_plain_name("/tmp/dns"));
/// assert!(!is_plain_name("ghcr.io/acme/dns"));
/// ```
#[must_use]
pub fn is_plain_name(name: &str) -> bool {
    if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Builds a plugin unless the manifest has no name.
fn named(
    manifest: Manifest,
    source: SourceKind,
    source_path: String,
    loader: impl FnOnce() -> ByteLoader,
) -> Option<DiscoveredPlugin> {
    if manifest.name.is_empty() {
        tracing::warn!("Skipping {}: manifest has no name", source_path);
        return None;
    }
    Some(DiscoveredPlugin {
        manifest,
        source,
        source_path,
        loader: loader(),
    })
}

/// Builds a fully qualified registry reference.
///
/// A name containing `/` is already qualified and is returned unchanged.
/// Otherwise `name[@version]` becomes `<registry>/<name>:<version>` with
/// `latest` as the default version.
///
/// # Examples
///
/// ```
/// use tack_plugin::loader::registry_reference;
///
/// assert_eq!(registry_reference("ghcr.io/acme", "dns"), "ghcr.io/acme/dns:latest");
/// assert_eq!(registry_reference("ghcr.io/acme", "dns@1.2.0"), "ghcr.io/acme/dns:1.2.0");
/// assert_eq!(registry_reference("ghcr.io/acme", "docker.io/x/dns:2"), "docker.io/x/dns:2");
/// ```
#[must_use]
pub fn registry_reference(default_registry: &str, name: &str) -> String {
    if name.contains('/') {
        return name.to_string();
    }
    let (plugin, version) = match name.split_once('@') {
        Some((plugin, version)) if !version.is_empty() => (plugin, version),
        Some((plugin, _)) => (plugin, "latest"),
        None => (name, "latest"),
    };
    format!(
        "{}/{plugin}:{version}",
        default_registry.trim_end_matches('/')
    )
}

/// `.wasm` files directly inside `dir`, sorted by file name.
pub(crate) fn list_wasm_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                continue;
            }
        };
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == PLUGIN_EXTENSION) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// The greatest `<name>@*.wasm` in `dir`.
fn latest_versioned_file(dir: &Path, name: &str) -> Option<PathBuf> {
    let prefix = format!("{name}@");
    list_wasm_files(dir)
        .ok()?
        .into_iter()
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix))
        })
        .max()
}

fn file_fingerprint(path: &Path) -> Result<(u64, DateTime<Utc>)> {
    let metadata = fs::metadata(path).map_err(|e| Error::io(path, e))?;
    let modified = metadata.modified().map_err(|e| Error::io(path, e))?;
    Ok((metadata.len(), DateTime::<Utc>::from(modified)))
}
