//! Group management command implementation.
//!
//! Every mutation is applied to the in-memory config first and only saved
//! when it succeeds, so a rejected change never touches the config file.

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::Serialize;
use std::path::Path;
use tack_core::cli::{ExitCode, OutputFormat};
use tack_core::config::Config;
use tracing::info;

/// Group management actions.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum GroupAction {
    /// List all plugin groups
    List,

    /// Create a new plugin group
    Create {
        /// Group name
        name: String,

        /// Description for the group
        #[arg(long, default_value = "")]
        description: String,
    },

    /// Delete a plugin group
    #[command(visible_alias = "rm")]
    Delete {
        /// Group name
        name: String,
    },

    /// Add plugins to a group
    Add {
        /// Group name
        group: String,

        /// Plugin names
        #[arg(required = true)]
        plugins: Vec<String>,
    },

    /// Remove plugins from a group
    Remove {
        /// Group name
        group: String,

        /// Plugin names
        #[arg(required = true)]
        plugins: Vec<String>,
    },
}

/// One row of `group list`.
#[derive(Debug, Serialize)]
struct GroupRow {
    group: String,
    description: String,
    plugins: Vec<String>,
}

/// Result of a group mutation.
#[derive(Debug, Serialize)]
struct ChangeResult {
    group: String,
    action: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    plugins: Vec<String>,
}

/// Runs the group management command.
///
/// Mutations are saved to `config_path`.
///
/// # Errors
///
/// Returns an error if the change is rejected or the config cannot be
/// saved.
pub fn run(
    action: GroupAction,
    config: &mut Config,
    config_path: &Path,
    output_format: OutputFormat,
) -> Result<ExitCode> {
    let change = match action {
        GroupAction::List => return list_groups(config, output_format),
        GroupAction::Create { name, description } => {
            config.groups.create(&name, &description)?;
            ChangeResult {
                group: name,
                action: "created",
                plugins: Vec::new(),
            }
        }
        GroupAction::Delete { name } => {
            config.groups.delete(&name)?;
            ChangeResult {
                group: name,
                action: "deleted",
                plugins: Vec::new(),
            }
        }
        GroupAction::Add { group, plugins } => {
            let added = config.groups.add(&group, &plugins)?;
            if added.is_empty() {
                info!("Nothing to add to group {}", group);
                return Ok(ExitCode::SUCCESS);
            }
            ChangeResult {
                group,
                action: "added",
                plugins: added,
            }
        }
        GroupAction::Remove { group, plugins } => {
            config.groups.remove(&group, &plugins)?;
            ChangeResult {
                group,
                action: "removed",
                plugins,
            }
        }
    };

    config
        .save(config_path)
        .with_context(|| format!("failed to save {}", config_path.display()))?;
    info!("Group {} {}", change.group, change.action);

    let formatted = crate::formatters::format_output(&change, output_format)?;
    if !formatted.is_empty() {
        println!("{formatted}");
    }
    Ok(ExitCode::SUCCESS)
}

fn list_groups(config: &Config, output_format: OutputFormat) -> Result<ExitCode> {
    if config.groups.is_empty() && output_format == OutputFormat::Table {
        println!("No groups configured.");
        return Ok(ExitCode::SUCCESS);
    }

    let rows: Vec<GroupRow> = config
        .groups
        .iter()
        .map(|(name, group)| GroupRow {
            group: name.clone(),
            description: group.description.clone(),
            plugins: group.plugins.clone(),
        })
        .collect();

    let formatted = crate::formatters::format_output(&rows, output_format)?;
    if !formatted.is_empty() {
        println!("{formatted}");
    }
    Ok(ExitCode::SUCCESS)
}
