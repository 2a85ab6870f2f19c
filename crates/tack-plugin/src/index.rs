//! Plugin index search.
//!
//! An index is a JSON document listing installable plugins. Each index is
//! cached on disk and reused for up to an hour. When a fetch fails and a
//! cached copy exists, the stale copy is served with a warning; when no copy
//! exists the index is skipped. One unreachable index never fails a search.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tack_core::config::IndexSource;
use tack_core::{Error, Result};

/// Index used when none is configured.
pub const DEFAULT_INDEX_URL: &str =
    "https://raw.githubusercontent.com/tack-dev/tack-plugins/main/index.json";

/// How long a cached index is considered fresh.
pub const INDEX_MAX_AGE: Duration = Duration::from_secs(60 * 60);

/// Timeout for one index fetch.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// A plugin index document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginIndex {
    /// Source repository of the listed plugins.
    #[serde(default)]
    pub repository: String,
    /// Registry prefix to install from.
    #[serde(default)]
    pub registry: String,
    /// Last update timestamp, as published.
    #[serde(default)]
    pub updated: String,
    /// Listed plugins.
    #[serde(default)]
    pub plugins: Vec<PluginEntry>,
}

/// One plugin listed in an index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginEntry {
    /// Plugin name.
    pub name: String,
    /// Plugin description.
    #[serde(default)]
    pub description: String,
    /// Capability kinds the plugin requests.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Latest published version.
    #[serde(default)]
    pub latest: String,
}

impl PluginEntry {
    fn matches(&self, query: &str) -> bool {
        query.is_empty()
            || self.name.to_lowercase().contains(query)
            || self.description.to_lowercase().contains(query)
    }
}

/// A search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    /// The matching entry.
    #[serde(flatten)]
    pub entry: PluginEntry,
    /// Name of the index it came from.
    pub source: String,
    /// Registry prefix to install from.
    pub registry: String,
}

/// Searches indexes with an on-disk cache.
#[derive(Debug, Clone)]
pub struct IndexClient {
    client: reqwest::Client,
    cache_dir: PathBuf,
    max_age: Duration,
}

impl IndexClient {
    /// Creates a client caching indexes under `cache_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(concat!("tack/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::ConfigError {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            cache_dir: cache_dir.into(),
            max_age: INDEX_MAX_AGE,
        })
    }

    /// Ignores cached copies younger than the max age.
    #[must_use]
    pub const fn force_refresh(mut self, refresh: bool) -> Self {
        if refresh {
            self.max_age = Duration::ZERO;
        }
        self
    }

    /// Searches every source for `query` (case-insensitive, name or
    /// description). An empty query matches everything.
    pub async fn search(&self, sources: &[IndexSource], query: &str) -> Vec<SearchResult> {
        let query = query.to_lowercase();
        let mut results = Vec::new();

        for source in sources {
            let index = match self.cached_fetch(source).await {
                Ok(index) => index,
                Err(e) => {
                    tracing::warn!("Failed to fetch {} index: {}", source.name, e);
                    continue;
                }
            };

            results.extend(
                index
                    .plugins
                    .iter()
                    .filter(|entry| entry.matches(&query))
                    .map(|entry| SearchResult {
                        entry: entry.clone(),
                        source: source.name.clone(),
                        registry: index.registry.clone(),
                    }),
            );
        }

        results
    }

    async fn cached_fetch(&self, source: &IndexSource) -> Result<PluginIndex> {
        let path = self.cache_file(source);
        let cached = read_cached(&path);

        if let Some(index) = &cached {
            if self.max_age > Duration::ZERO && is_fresh(&path, self.max_age) {
                tracing::debug!("Using cached {} index", source.name);
                return Ok(index.clone());
            }
        }

        match self.fetch(&source.url).await {
            Ok(index) => {
                if let Err(e) = write_cached(&path, &index) {
                    tracing::debug!("Failed to cache {} index: {}", source.name, e);
                }
                Ok(index)
            }
            Err(e) => match cached {
                Some(index) => {
                    tracing::warn!("Using stale {} index (fetch failed: {})", source.name, e);
                    Ok(index)
                }
                None => Err(e),
            },
        }
    }

    /// Fetches and parses one index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RegistryFetch`] on transport errors, non-200
    /// responses, or unparseable bodies.
    pub async fn fetch(&self, url: &str) -> Result<PluginIndex> {
        let fetch_error = |message: String| Error::RegistryFetch {
            reference: url.to_string(),
            message,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        if !response.status().is_success() {
            return Err(fetch_error(format!("index returned {}", response.status())));
        }

        response
            .json::<PluginIndex>()
            .await
            .map_err(|e| fetch_error(format!("parsing index: {e}")))
    }

    fn cache_file(&self, source: &IndexSource) -> PathBuf {
        self.cache_dir.join(format!("{}.json", source.name))
    }
}

/// Configured sources, or the official index when none are configured.
#[must_use]
pub fn effective_sources(configured: &[IndexSource]) -> Vec<IndexSource> {
    if configured.is_empty() {
        vec![IndexSource {
            name: "official".to_string(),
            url: DEFAULT_INDEX_URL.to_string(),
        }]
    } else {
        configured.to_vec()
    }
}

fn read_cached(path: &Path) -> Option<PluginIndex> {
    let data = fs::read(path).ok()?;
    serde_json::from_slice(&data).ok()
}

fn write_cached(path: &Path, index: &PluginIndex) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    let data = serde_json::to_vec(index)?;
    fs::write(path, data).map_err(|e| Error::io(path, e))
}

fn is_fresh(path: &Path, max_age: Duration) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age < max_age)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_index() -> PluginIndex {
        PluginIndex {
            repository: "https://github.com/tack-dev/tack-plugins".to_string(),
            registry: "ghcr.io/tack-dev/tack-plugins".to_string(),
            updated: "2025-01-01".to_string(),
            plugins: vec![
                PluginEntry {
                    name: "dns".to_string(),
                    description: "Resolve DNS records".to_string(),
                    capabilities: vec!["network".to_string()],
                    latest: "1.0.0".to_string(),
                },
                PluginEntry {
                    name: "http".to_string(),
                    description: "Probe HTTP endpoints".to_string(),
                    capabilities: vec!["network".to_string()],
                    latest: "0.4.0".to_string(),
                },
            ],
        }
    }

    fn unreachable_source(name: &str) -> IndexSource {
        IndexSource {
            name: name.to_string(),
            url: "http://127.0.0.1:9/index.json".to_string(),
        }
    }

    #[test]
    fn test_entry_matching() {
        let index = sample_index();
        assert!(index.plugins[0].matches(""));
        assert!(index.plugins[0].matches("dns"));
        assert!(index.plugins[0].matches("records"));
        assert!(!index.plugins[0].matches("http"));
    }

    #[test]
    fn test_effective_sources_default() {
        let sources = effective_sources(&[]);
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].url, DEFAULT_INDEX_URL);

        let custom = vec![unreachable_source("mine")];
        assert_eq!(effective_sources(&custom), custom);
    }

    #[tokio::test]
    async fn test_fresh_cache_is_used_without_fetch() {
        let temp = TempDir::new().unwrap();
        let source = unreachable_source("local");
        write_cached(&temp.path().join("local.json"), &sample_index()).unwrap();

        let client = IndexClient::new(temp.path()).unwrap();
        let results = client.search(&[source], "DNS").await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entry.name, "dns");
        assert_eq!(results[0].source, "local");
        assert_eq!(results[0].registry, "ghcr.io/tack-dev/tack-plugins");
    }

    #[tokio::test]
    async fn test_stale_cache_served_when_fetch_fails() {
        let temp = TempDir::new().unwrap();
        let source = unreachable_source("local");
        write_cached(&temp.path().join("local.json"), &sample_index()).unwrap();

        let client = IndexClient::new(temp.path()).unwrap().force_refresh(true);
        let results = client.search(&[source], "").await;
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_cache_and_failed_fetch_skips_index() {
        let temp = TempDir::new().unwrap();
        let client = IndexClient::new(temp.path()).unwrap();
        let results = client.search(&[unreachable_source("gone")], "").await;
        assert!(results.is_empty());
    }

    #[test]
    fn test_search_result_serializes_flat() {
        let result = SearchResult {
            entry: sample_index().plugins[0].clone(),
            source: "official".to_string(),
            registry: "r".to_string(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["name"], "dns");
        assert_eq!(json["source"], "official");
    }
}
