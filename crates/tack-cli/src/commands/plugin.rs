//! Plugin management command implementation.
//!
//! Lists, inspects, installs and removes plugins, clears the discovery
//! cache, and searches plugin indexes.

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tack_core::cli::{ExitCode, OutputFormat};
use tack_core::config::{Config, data_dir};
use tack_core::manifest::Manifest;
use tack_plugin::index::{IndexClient, effective_sources};
use tack_plugin::{DiscoveredPlugin, Loader};
use tracing::info;

/// Plugin management actions.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum PluginAction {
    /// List discovered plugins
    List,

    /// Show a plugin's services and operations
    Info {
        /// Plugin name
        name: String,
    },

    /// Install a plugin from a local .wasm file or a registry reference
    #[command(after_help = "Examples:
  tack plugin install ./custom.wasm
  tack plugin install dns
  tack plugin install dns@1.2.0
  tack plugin install ghcr.io/my-org/plugins/custom:1.0.0")]
    Install {
        /// Path to a .wasm file, or name[@version] / full registry reference
        reference: String,
    },

    /// Remove an installed plugin
    #[command(visible_aliases = ["uninstall", "rm"])]
    Remove {
        /// Plugin name
        name: String,

        /// Skip confirmation
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Delete the discovery cache so the next run rebuilds it
    Refresh,

    /// Search plugin indexes
    Search {
        /// Matches plugin names and descriptions; empty lists everything
        query: Option<String>,

        /// Ignore cached index copies
        #[arg(long)]
        refresh: bool,
    },
}

/// Result of listing plugins.
#[derive(Debug, Serialize)]
struct ListResult {
    /// Number of plugins found
    plugin_count: usize,
    /// Plugin summaries
    plugins: Vec<PluginSummary>,
}

/// One discovered plugin.
#[derive(Debug, Serialize)]
struct PluginSummary {
    name: String,
    version: String,
    source: String,
    path: String,
}

/// Result of showing plugin info.
#[derive(Debug, Serialize)]
struct InfoResult {
    name: String,
    version: String,
    description: String,
    source: String,
    path: String,
    /// Capability kinds the plugin requests
    capabilities: Vec<String>,
    /// One row per operation
    operations: Vec<OperationSummary>,
}

/// Operation row for info display.
#[derive(Debug, Serialize)]
struct OperationSummary {
    service: String,
    operation: String,
    description: String,
}

/// Result of installing a plugin.
#[derive(Debug, Serialize)]
struct InstallResult {
    name: String,
    version: String,
    path: String,
}

/// Result of removing a plugin.
#[derive(Debug, Serialize)]
struct RemoveResult {
    name: String,
    removed: Vec<String>,
}

/// Result of clearing the discovery cache.
#[derive(Debug, Serialize)]
struct RefreshResult {
    cache_path: String,
    cleared: bool,
}

/// Result of an index search.
#[derive(Debug, Serialize)]
struct SearchRow {
    name: String,
    latest: String,
    description: String,
    capabilities: String,
    index: String,
}

/// Runs the plugin management command.
///
/// # Errors
///
/// Returns an error if the plugin operation fails.
pub async fn run(
    action: PluginAction,
    loader: &Loader,
    discovered: &[DiscoveredPlugin],
    config: &Config,
    output_format: OutputFormat,
) -> Result<ExitCode> {
    match action {
        PluginAction::List => list_plugins(discovered, output_format),
        PluginAction::Info { name } => show_plugin_info(loader, &name, output_format).await,
        PluginAction::Install { reference } => install_plugin(loader, &reference, output_format).await,
        PluginAction::Remove { name, yes } => remove_plugin(loader, &name, yes, output_format),
        PluginAction::Refresh => refresh_cache(loader, config, output_format),
        PluginAction::Search { query, refresh } => {
            search_indexes(config, query.as_deref().unwrap_or_default(), refresh, output_format).await
        }
    }
}

fn list_plugins(discovered: &[DiscoveredPlugin], output_format: OutputFormat) -> Result<ExitCode> {
    let mut plugins: Vec<PluginSummary> = discovered
        .iter()
        .map(|p| PluginSummary {
            name: p.manifest.name.clone(),
            version: p.manifest.version.clone(),
            source: p.source.to_string(),
            path: p.source_path.clone(),
        })
        .collect();
    plugins.sort_by(|a, b| a.name.cmp(&b.name));

    let result = ListResult {
        plugin_count: plugins.len(),
        plugins,
    };

    let formatted = crate::formatters::format_output(&result, output_format)?;
    print(&formatted);

    info!("Found {} plugin(s)", result.plugin_count);
    Ok(ExitCode::SUCCESS)
}

async fn show_plugin_info(loader: &Loader, name: &str, output_format: OutputFormat) -> Result<ExitCode> {
    let plugin = loader
        .load_by_name(name)
        .await
        .with_context(|| format!("failed to load plugin '{name}'"))?;

    let result = info_result(&plugin);
    let formatted = crate::formatters::format_output(&result, output_format)?;
    print(&formatted);

    Ok(ExitCode::SUCCESS)
}

fn info_result(plugin: &DiscoveredPlugin) -> InfoResult {
    let manifest: &Manifest = &plugin.manifest;
    let operations = manifest
        .services
        .iter()
        .flat_map(|(key, service)| {
            let service_name = if service.name.is_empty() { key } else { &service.name };
            service.operations.iter().map(move |op| OperationSummary {
                service: service_name.clone(),
                operation: op.name.clone(),
                description: op.description.clone(),
            })
        })
        .collect();

    InfoResult {
        name: manifest.name.clone(),
        version: manifest.version.clone(),
        description: manifest.description.clone(),
        source: plugin.source.to_string(),
        path: plugin.source_path.clone(),
        capabilities: manifest.capabilities.kinds().into_iter().map(str::to_string).collect(),
        operations,
    }
}

/// Returns `true` if `target` names a local file rather than a registry
/// reference.
#[must_use]
pub fn is_local_target(target: &str) -> bool {
    Path::new(target)
        .extension()
        .is_some_and(|ext| ext == tack_plugin::loader::PLUGIN_EXTENSION)
        || target.starts_with("./")
        || target.starts_with("../")
        || Path::new(target).is_absolute()
}

async fn install_plugin(loader: &Loader, target: &str, output_format: OutputFormat) -> Result<ExitCode> {
    let source = if is_local_target(target) {
        info!("Installing from local file: {}", target);
        PathBuf::from(target)
    } else {
        let fetched = loader
            .fetch_from_registry(target)
            .await
            .with_context(|| format!("failed to fetch plugin '{target}'"))?;
        PathBuf::from(fetched.source_path)
    };

    let (manifest, path) = loader
        .install_file(&source)
        .with_context(|| format!("failed to install plugin from {}", source.display()))?;

    let result = InstallResult {
        name: manifest.name,
        version: manifest.version,
        path: path.display().to_string(),
    };
    let formatted = crate::formatters::format_output(&result, output_format)?;
    print(&formatted);

    Ok(ExitCode::SUCCESS)
}

fn remove_plugin(loader: &Loader, name: &str, yes: bool, output_format: OutputFormat) -> Result<ExitCode> {
    info!("Removing plugin: {}", name);

    if loader.installed_files(name).is_empty() {
        bail!(
            "plugin '{name}' is not installed in {}",
            loader.plugins_dir().display()
        );
    }

    if !yes {
        use dialoguer::Confirm;

        let confirmed = Confirm::new()
            .with_prompt(format!("Are you sure you want to remove plugin '{name}'?"))
            .default(false)
            .interact()
            .context("failed to read confirmation")?;

        if !confirmed {
            info!("Plugin removal cancelled by user");
            return Ok(ExitCode::SUCCESS);
        }
    }

    let removed = loader
        .remove(name)
        .with_context(|| format!("failed to remove plugin '{name}'"))?;

    let result = RemoveResult {
        name: name.to_string(),
        removed: removed.iter().map(|p| p.display().to_string()).collect(),
    };
    let formatted = crate::formatters::format_output(&result, output_format)?;
    print(&formatted);

    Ok(ExitCode::SUCCESS)
}

fn refresh_cache(loader: &Loader, config: &Config, output_format: OutputFormat) -> Result<ExitCode> {
    let cache_path = loader
        .cache_path()
        .map_or_else(|| config.cache_path(), Path::to_path_buf);

    if output_format == OutputFormat::Table {
        println!("Refreshing plugin cache...");
    }

    let cleared = match std::fs::remove_file(&cache_path) {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            return Err(e).with_context(|| format!("failed to delete {}", cache_path.display()));
        }
    };

    if output_format == OutputFormat::Table {
        println!("Discovery cache cleared. It is rebuilt on the next run.");
        return Ok(ExitCode::SUCCESS);
    }

    let result = RefreshResult {
        cache_path: cache_path.display().to_string(),
        cleared,
    };
    let formatted = crate::formatters::format_output(&result, output_format)?;
    print(&formatted);

    Ok(ExitCode::SUCCESS)
}

async fn search_indexes(
    config: &Config,
    query: &str,
    refresh: bool,
    output_format: OutputFormat,
) -> Result<ExitCode> {
    let client = IndexClient::new(data_dir().join("cache").join("indexes"))?.force_refresh(refresh);
    let hits = client.search(&effective_sources(&config.indexes), query).await;

    let rows: Vec<SearchRow> = hits
        .into_iter()
        .map(|hit| SearchRow {
            name: hit.entry.name,
            latest: hit.entry.latest,
            description: hit.entry.description,
            capabilities: hit.entry.capabilities.join(", "),
            index: hit.source,
        })
        .collect();

    if rows.is_empty() && output_format == OutputFormat::Table {
        println!("No plugins found.");
        return Ok(ExitCode::SUCCESS);
    }

    let formatted = crate::formatters::format_output(&rows, output_format)?;
    print(&formatted);

    Ok(ExitCode::SUCCESS)
}

fn print(formatted: &str) {
    if !formatted.is_empty() {
        println!("{formatted}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tack_plugin::{ByteLoader, SourceKind};

    #[test]
    fn test_local_target_detection() {
        assert!(is_local_target("custom.wasm"));
        assert!(is_local_target("./custom"));
        assert!(is_local_target("../plugins/custom"));
        assert!(is_local_target("/opt/plugins/custom"));
        assert!(!is_local_target("dns"));
        assert!(!is_local_target("dns@1.2.0"));
        assert!(!is_local_target("ghcr.io/my-org/plugins/custom:1.0.0"));
    }

    #[test]
    fn test_info_lists_every_operation() {
        let manifest: Manifest = serde_json::from_value(json!({
            "name": "aws",
            "version": "0.3.0",
            "capabilities": {"network": {"hosts": ["*.amazonaws.com"]}},
            "services": {
                "ec2": {"name": "ec2", "operations": [{"name": "describe_instances"}]},
                "iam": {"operations": [{"name": "get_account_summary", "description": "Account usage"}]}
            }
        }))
        .unwrap();
        let plugin = DiscoveredPlugin {
            manifest,
            source: SourceKind::Bundled,
            source_path: "bundled://plugins/aws.wasm".to_string(),
            loader: ByteLoader::from_fn(|| Ok(Vec::new())),
        };

        let info = info_result(&plugin);
        assert_eq!(info.source, "bundled");
        assert_eq!(info.capabilities, vec!["network"]);
        assert_eq!(info.operations.len(), 2);
        assert_eq!(info.operations[1].service, "iam");
        assert_eq!(info.operations[1].description, "Account usage");
    }

    #[test]
    fn test_list_result_serialization() {
        let result = ListResult {
            plugin_count: 1,
            plugins: vec![PluginSummary {
                name: "dns".to_string(),
                version: "1.0.0".to_string(),
                source: "local".to_string(),
                path: "/home/u/.tack/plugins/dns.wasm".to_string(),
            }],
        };

        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"plugin_count\":1"));
        assert!(json.contains("dns.wasm"));
    }
}
