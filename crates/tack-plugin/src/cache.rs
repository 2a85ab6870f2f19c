//! Persisted discovery cache.
//!
//! Maps a source key (a local file path or a `bundled://` URL) to the
//! manifest last read from that source plus a fingerprint used to decide
//! whether the manifest is still valid.
//!
//! The cache is advisory. A missing or unreadable file loads as an empty
//! cache, and concurrent writers can at worst drop an update.
//!
//! # File format
//!
//! ```json
//! {
//!   "files": {
//!     "/home/me/.tack/plugins/dns.wasm": {
//!       "mod_time": "2025-01-01T12:00:00.123456789Z",
//!       "size": 81234,
//!       "manifest": { "name": "dns", "services": {} }
//!     }
//!   }
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tack_core::manifest::Manifest;
use tack_core::{Error, Result};

/// Cached manifest plus freshness fingerprint for one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Modification time of the source; present only for local files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mod_time: Option<DateTime<Utc>>,
    /// Source size in bytes.
    pub size: u64,
    /// Manifest read from the source.
    pub manifest: Manifest,
}

/// Source-key → manifest store.
///
/// # Examples
///
/// ```
/// use tack_plugin::cache::DiscoveryCache;
/// use tack_core::manifest::Manifest;
///
/// let mut cache = DiscoveryCache::default();
/// let manifest = Manifest { name: "dns".into(), ..Manifest::default() };
///
/// cache.insert_bundled("bundled://plugins/dns.wasm", 42, manifest);
/// assert!(cache.is_dirty());
/// assert!(cache.bundled("bundled://plugins/dns.wasm", 42).is_some());
/// assert!(cache.bundled("bundled://plugins/dns.wasm", 43).is_none());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryCache {
    #[serde(default)]
    files: BTreeMap<String, CacheEntry>,
    #[serde(skip)]
    dirty: bool,
}

impl DiscoveryCache {
    /// Reads the cache at `path`.
    ///
    /// Never fails: a missing or malformed file yields an empty cache.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) => {
                tracing::debug!("No discovery cache at {}: {}", path.display(), e);
                return Self::default();
            }
        };

        match serde_json::from_slice::<Self>(&data) {
            Ok(cache) => {
                tracing::debug!(
                    "Loaded discovery cache with {} entries from {}",
                    cache.files.len(),
                    path.display()
                );
                cache
            }
            Err(e) => {
                tracing::debug!(
                    "Ignoring malformed discovery cache {}: {}",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Overwrites the cache file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let data = serde_json::to_vec_pretty(self)?;
        fs::write(path, data).map_err(|e| Error::io(path, e))?;
        tracing::debug!("Saved discovery cache to {}", path.display());
        Ok(())
    }

    /// Cached manifest for a bundled source if its size still matches.
    #[must_use]
    pub fn bundled(&self, key: &str, size: u64) -> Option<&Manifest> {
        self.files
            .get(key)
            .filter(|entry| entry.size == size)
            .map(|entry| &entry.manifest)
    }

    /// Cached manifest for a local file if both size and modification time
    /// still match.
    #[must_use]
    pub fn local(&self, key: &str, size: u64, mod_time: DateTime<Utc>) -> Option<&Manifest> {
        self.files
            .get(key)
            .filter(|entry| entry.size == size && entry.mod_time == Some(mod_time))
            .map(|entry| &entry.manifest)
    }

    /// Records the manifest of a bundled source.
    pub fn insert_bundled(&mut self, key: impl Into<String>, size: u64, manifest: Manifest) {
        self.insert(
            key.into(),
            CacheEntry {
                mod_time: None,
                size,
                manifest,
            },
        );
    }

    /// Records the manifest of a local file.
    pub fn insert_local(
        &mut self,
        key: impl Into<String>,
        size: u64,
        mod_time: DateTime<Utc>,
        manifest: Manifest,
    ) {
        self.insert(
            key.into(),
            CacheEntry {
                mod_time: Some(mod_time),
                size,
                manifest,
            },
        );
    }

    fn insert(&mut self, key: String, entry: CacheEntry) {
        self.files.insert(key, entry);
        self.dirty = true;
    }

    /// Returns `true` if any entry changed since load.
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns `true` if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Looks up an entry regardless of freshness.
    #[must_use]
    pub fn entry(&self, key: &str) -> Option<&CacheEntry> {
        self.files.get(key)
    }
}
