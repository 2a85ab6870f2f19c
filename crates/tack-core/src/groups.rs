//! User-defined plugin groups and the rules for changing them.
//!
//! Groups re-parent plugin commands under a named root command. The group
//! named [`TOP_GROUP`] is special: its members are promoted to the root and
//! the group itself never becomes a command.
//!
//! Mutations never touch disk. Callers persist the owning
//! [`Config`](crate::config::Config) after a successful change.
//!
//! # Examples
//!
//! ```
//! use tack_core::groups::Groups;
//!
//! let mut groups = Groups::default();
//! groups.create("top", "")?;
//! groups.create("net", "Network tools")?;
//! groups.add("net", &["dns".to_string()])?;
//! groups.add("top", &["dns".to_string()])?;
//!
//! // dns is still reachable through "net"
//! groups.remove("top", &["dns".to_string()])?;
//! # Ok::<(), tack_core::Error>(())
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Name of the group whose members are attached at the root.
pub const TOP_GROUP: &str = "top";

/// Built-in root command names. Groups, plugins and aliases may not use them.
pub const RESERVED_COMMANDS: &[&str] = &["completion", "version", "plugin", "group", "help"];

/// Returns `true` if `name` collides with a built-in command.
#[must_use]
pub fn is_reserved(name: &str) -> bool {
    RESERVED_COMMANDS.contains(&name)
}

/// Checks that `name` can be used as a group name.
///
/// # Errors
///
/// Returns [`Error::ValidationError`] if the name is empty or reserved.
pub fn validate_group_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::ValidationError {
            field: "group".to_string(),
            reason: "group name cannot be empty".to_string(),
        });
    }
    if is_reserved(name) {
        return Err(Error::ValidationError {
            field: "group".to_string(),
            reason: format!("group name '{name}' conflicts with built-in command"),
        });
    }
    Ok(())
}

/// A named plugin group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Help text for the group command.
    #[serde(default)]
    pub description: String,
    /// Member plugin names in user order.
    #[serde(default)]
    pub plugins: Vec<String>,
}

/// All configured groups, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Groups(BTreeMap<String, GroupConfig>);

impl Groups {
    /// Wraps an existing map.
    #[must_use]
    pub const fn new(groups: BTreeMap<String, GroupConfig>) -> Self {
        Self(groups)
    }

    /// Returns `true` if no group is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Looks up a group.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&GroupConfig> {
        self.0.get(name)
    }

    /// Iterates groups in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &GroupConfig)> {
        self.0.iter()
    }

    /// Members of the `top` group.
    #[must_use]
    pub fn top_members(&self) -> Vec<&str> {
        self.0
            .get(TOP_GROUP)
            .map(|g| g.plugins.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Returns `true` if `plugin` belongs to any group other than `top`.
    #[must_use]
    pub fn in_named_group(&self, plugin: &str) -> bool {
        self.0
            .iter()
            .filter(|(name, _)| name.as_str() != TOP_GROUP)
            .any(|(_, g)| g.plugins.iter().any(|p| p == plugin))
    }

    /// Checks every group name.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure.
    pub fn validate(&self) -> Result<()> {
        self.0.keys().try_for_each(|name| validate_group_name(name))
    }

    /// Creates an empty group.
    ///
    /// # Errors
    ///
    /// Fails if the name is invalid or already taken.
    pub fn create(&mut self, name: &str, description: &str) -> Result<()> {
        validate_group_name(name)?;
        if self.0.contains_key(name) {
            return Err(Error::ValidationError {
                field: "group".to_string(),
                reason: format!("group '{name}' already exists"),
            });
        }
        self.0.insert(
            name.to_string(),
            GroupConfig {
                description: description.to_string(),
                plugins: Vec::new(),
            },
        );
        Ok(())
    }

    /// Deletes a group.
    ///
    /// # Errors
    ///
    /// Fails for `top` and for unknown groups.
    pub fn delete(&mut self, name: &str) -> Result<GroupConfig> {
        if name == TOP_GROUP {
            return Err(Error::ValidationError {
                field: "group".to_string(),
                reason: "cannot delete the 'top' group: it controls which plugins appear at the root level"
                    .to_string(),
            });
        }
        self.0.remove(name).ok_or_else(|| group_not_found(name))
    }

    /// Appends plugins to a group and returns the names actually added.
    ///
    /// Plugins already in the group are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Fails if the group does not exist or a plugin name is blank; nothing
    /// is added in either case.
    pub fn add(&mut self, group: &str, plugins: &[String]) -> Result<Vec<String>> {
        let entry = self.0.get_mut(group).ok_or_else(|| group_not_found(group))?;
        if plugins.iter().any(|p| p.trim().is_empty()) {
            return Err(Error::ValidationError {
                field: "plugin".to_string(),
                reason: "plugin name cannot be empty".to_string(),
            });
        }
        let mut added = Vec::new();
        for plugin in plugins {
            if entry.plugins.contains(plugin) {
                warn!("'{plugin}' is already in group '{group}', skipping");
                continue;
            }
            entry.plugins.push(plugin.clone());
            added.push(plugin.clone());
        }
        Ok(added)
    }

    /// Removes plugins from a group.
    ///
    /// Nothing changes unless every listed plugin can be removed.
    ///
    /// # Errors
    ///
    /// Fails if the group does not exist, a plugin is not a member, or a
    /// plugin would be removed from `top` while belonging to no other group.
    pub fn remove(&mut self, group: &str, plugins: &[String]) -> Result<()> {
        let members = &self.0.get(group).ok_or_else(|| group_not_found(group))?.plugins;

        if let Some(missing) = plugins.iter().find(|p| !members.contains(p)) {
            return Err(Error::ValidationError {
                field: "plugin".to_string(),
                reason: format!("plugin '{missing}' is not in group '{group}'"),
            });
        }

        if group == TOP_GROUP {
            if let Some(orphan) = plugins.iter().find(|p| !self.in_named_group(p)) {
                return Err(Error::ValidationError {
                    field: "plugin".to_string(),
                    reason: format!(
                        "cannot remove '{orphan}' from 'top' group: it is not in any other group and would become inaccessible"
                    ),
                });
            }
        }

        if let Some(entry) = self.0.get_mut(group) {
            entry.plugins.retain(|p| !plugins.contains(p));
        }
        Ok(())
    }
}

fn group_not_found(name: &str) -> Error {
    Error::ValidationError {
        field: "group".to_string(),
        reason: format!("group '{name}' not found"),
    }
}
