//! User configuration.
//!
//! Configuration is stored in TOML format at:
//! - Linux: `~/.config/tack/config.toml`
//! - macOS: `~/Library/Application Support/tack/config.toml`
//! - Windows: `%APPDATA%\tack\config.toml`
//!
//! A missing file yields [`Config::default`]. Environment variables
//! (`TACK_OUTPUT`, `TACK_TIMEOUT`, `TACK_DEFAULT_REGISTRY`) take priority
//! over the file.
//!
//! # Examples
//!
//! ```toml
//! output = "json"
//! default_registry = "ghcr.io/acme/plugins"
//!
//! [aliases]
//! sg = "aws ec2 describe_security_groups"
//!
//! [plugin_defaults.aws]
//! region = "us-east-1"
//!
//! [groups.net]
//! description = "Network tools"
//! plugins = ["dns", "http"]
//! ```

use crate::groups::Groups;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Application directory and environment prefix.
pub const APP_NAME: &str = "tack";

/// Registry prefix used when none is configured.
pub const DEFAULT_REGISTRY: &str = "ghcr.io/tack-dev/tack-plugins";

/// Per-plugin flag defaults: plugin name → flag name → value.
pub type PluginDefaults = BTreeMap<String, BTreeMap<String, String>>;

/// A plugin index location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSource {
    /// Short name; also the index cache file name.
    pub name: String,
    /// URL of the index JSON document.
    pub url: String,
}

/// CLI configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default output format (table, json, yaml, quiet).
    pub output: String,
    /// Timeout in seconds for registry and index fetches.
    pub timeout_seconds: u64,
    /// Registry prefix for short plugin references.
    pub default_registry: String,
    /// Suppress all output except the exit code.
    pub quiet: bool,
    /// Overrides the local plugin directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugins_dir: Option<PathBuf>,
    /// Overrides the discovery cache location.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<PathBuf>,
    /// Short names for full command lines.
    pub aliases: BTreeMap<String, String>,
    /// Per-plugin flag defaults.
    pub plugin_defaults: PluginDefaults,
    /// Extra plugin search indexes.
    pub indexes: Vec<IndexSource>,
    /// Plugin groups.
    #[serde(skip_serializing_if = "Groups::is_empty")]
    pub groups: Groups,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output: "table".to_string(),
            timeout_seconds: 30,
            default_registry: DEFAULT_REGISTRY.to_string(),
            quiet: false,
            plugins_dir: None,
            cache_path: None,
            aliases: BTreeMap::new(),
            plugin_defaults: BTreeMap::new(),
            indexes: Vec::new(),
            groups: Groups::default(),
        }
    }
}

impl Config {
    /// Reads configuration from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the file exists but cannot be read
    /// or parsed. A missing file is not an error.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config file at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(Error::ConfigError {
                    message: format!("failed to read {}: {e}", path.display()),
                });
            }
        };

        toml::from_str(&content).map_err(|e| Error::ConfigError {
            message: format!("failed to parse {}: {e}", path.display()),
        })
    }

    /// Writes configuration to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| Error::ConfigError {
            message: format!("failed to serialize config: {e}"),
        })?;
        fs::write(path, content).map_err(|e| Error::io(path, e))
    }

    /// Applies `TACK_*` overrides read through `lookup`.
    ///
    /// Takes a lookup function so callers choose the source; pass
    /// `|key| std::env::var(key).ok()` for the process environment.
    ///
    /// # Examples
    ///
    /// ```
    /// use tack_core::config::Config;
    ///
    /// let mut config = Config::default();
    /// config.apply_env_overrides(|key| match key {
    ///     "TACK_OUTPUT" => Some("json".to_string()),
    ///     _ => None,
    /// });
    /// assert_eq!(config.output, "json");
    /// ```
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let prefix = APP_NAME.to_uppercase();
        let var = |suffix: &str| lookup(&format!("{prefix}_{suffix}")).filter(|v| !v.is_empty());

        if let Some(output) = var("OUTPUT") {
            self.output = output;
        }
        if let Some(timeout) = var("TIMEOUT") {
            match parse_timeout(&timeout) {
                Some(secs) => self.timeout_seconds = secs,
                None => debug!("Ignoring unparseable {prefix}_TIMEOUT value '{timeout}'"),
            }
        }
        if let Some(registry) = var("DEFAULT_REGISTRY") {
            self.default_registry = registry;
        }
    }

    /// Checks group names.
    ///
    /// # Errors
    ///
    /// Returns an error for empty or reserved group names.
    pub fn validate_groups(&self) -> Result<()> {
        self.groups.validate()
    }

    /// Timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Flag defaults configured for `plugin`.
    #[must_use]
    pub fn defaults_for(&self, plugin: &str) -> Option<&BTreeMap<String, String>> {
        self.plugin_defaults.get(plugin)
    }

    /// Local plugin directory: the configured override or `~/.tack/plugins`.
    #[must_use]
    pub fn plugins_dir(&self) -> PathBuf {
        self.plugins_dir
            .clone()
            .unwrap_or_else(|| data_dir().join("plugins"))
    }

    /// Discovery cache file: the configured override or
    /// `~/.tack/discovery_cache.json`.
    #[must_use]
    pub fn cache_path(&self) -> PathBuf {
        self.cache_path
            .clone()
            .unwrap_or_else(|| data_dir().join("discovery_cache.json"))
    }
}

/// Default config file path.
#[must_use]
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
        .join("config.toml")
}

/// Per-user data directory, `~/.tack`.
#[must_use]
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(format!(".{APP_NAME}"))
}

/// Accepts `30`, `30s`, `2m` and `1h`.
fn parse_timeout(value: &str) -> Option<u64> {
    let value = value.trim();
    let (digits, multiplier) = match value.chars().last()? {
        's' => (&value[..value.len() - 1], 1),
        'm' => (&value[..value.len() - 1], 60),
        'h' => (&value[..value.len() - 1], 3600),
        _ => (value, 1),
    };
    digits.parse::<u64>().ok().map(|n| n * multiplier)
}
