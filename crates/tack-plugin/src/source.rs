//! Discovered plugins and their byte sources.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tack_core::manifest::Manifest;
use tack_core::{Error, Result};

/// Where a plugin was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Compiled into the binary.
    Bundled,
    /// A `.wasm` file in the local plugins directory.
    Local,
    /// Fetched from a remote registry.
    Registry,
}

impl SourceKind {
    /// Lowercase tag shown to users.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Bundled => "bundled",
            Self::Local => "local",
            Self::Registry => "registry",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Repeatable accessor to a plugin's raw bytes.
///
/// Every call reads the source again. Nothing is memoized, so a loader held
/// by many command nodes costs no resident memory and always observes the
/// current content of the file.
///
/// # Examples
///
/// ```
/// use tack_plugin::ByteLoader;
///
/// let loader = ByteLoader::from_fn(|| Ok(vec![0, 97, 115, 109]));
/// assert_eq!(loader.load()?.len(), 4);
/// assert_eq!(loader.load()?.len(), 4);
/// # Ok::<(), tack_core::Error>(())
/// ```
#[derive(Clone)]
pub struct ByteLoader(Arc<dyn Fn() -> Result<Vec<u8>> + Send + Sync>);

impl ByteLoader {
    /// Wraps an arbitrary closure.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn() -> Result<Vec<u8>> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Reads `path` on every call.
    #[must_use]
    pub fn file(path: PathBuf) -> Self {
        Self::from_fn(move || std::fs::read(&path).map_err(|e| Error::io(&path, e)))
    }

    /// Copies bundled bytes on every call.
    #[must_use]
    pub fn bundled(bytes: Arc<[u8]>) -> Self {
        Self::from_fn(move || Ok(bytes.to_vec()))
    }

    /// Fetches the current bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the source can no longer be read.
    pub fn load(&self) -> Result<Vec<u8>> {
        (self.0)()
    }
}

impl fmt::Debug for ByteLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ByteLoader")
    }
}

/// A plugin found during discovery or resolved by name.
#[derive(Debug, Clone)]
pub struct DiscoveredPlugin {
    /// Manifest, taken from the cache or read from the plugin.
    pub manifest: Manifest,
    /// Tier the plugin came from.
    pub source: SourceKind,
    /// File path, bundle URL, or registry path of the plugin.
    pub source_path: String,
    /// Lazy access to the plugin bytes.
    pub loader: ByteLoader,
}

impl DiscoveredPlugin {
    /// Plugin name from the manifest.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.manifest.name
    }
}
