//! Group overlay.
//!
//! Re-parents synthesized plugin subtrees under user-defined group commands.
//! The reserved `top` group never becomes a command: its members are
//! reported back so the caller attaches them at the root.

use crate::synth::CommandNode;
use std::collections::{BTreeMap, BTreeSet};
use tack_core::groups::{Groups, TOP_GROUP};
use tack_plugin::DiscoveredPlugin;

/// Result of laying groups over the discovered plugins.
#[derive(Debug, Default)]
pub struct Overlay {
    /// Group commands with at least one resolved plugin, in name order.
    pub groups: Vec<CommandNode>,
    /// Discovered plugins listed in `top`.
    pub top: BTreeSet<String>,
}

/// Builds group commands.
///
/// `build` synthesizes a fresh subtree for a plugin given its parent path;
/// it is called once per (group, plugin) pair so the same plugin under two
/// groups gets two independent subtrees. Plugins a group lists but that
/// were not discovered are skipped with a warning.
pub fn overlay<F>(
    groups: &Groups,
    discovered: &BTreeMap<&str, &DiscoveredPlugin>,
    mut build: F,
) -> Overlay
where
    F: FnMut(&DiscoveredPlugin, &[String]) -> CommandNode,
{
    let mut result = Overlay::default();

    for (group_name, group) in groups.iter() {
        if group_name == TOP_GROUP {
            for name in &group.plugins {
                if discovered.contains_key(name.as_str()) {
                    result.top.insert(name.clone());
                } else {
                    tracing::warn!(
                        "Group \"{}\" references plugin \"{}\" which is not installed",
                        group_name,
                        name
                    );
                }
            }
            continue;
        }

        let mut node = CommandNode::new(group_name.clone(), group.description.clone());
        let parent = [group_name.clone()];
        for name in &group.plugins {
            let Some(plugin) = discovered.get(name.as_str()) else {
                tracing::warn!(
                    "Group \"{}\" references plugin \"{}\" which is not installed",
                    group_name,
                    name
                );
                continue;
            };
            if node.child(name).is_some() {
                continue;
            }
            node.children.push(build(plugin, &parent));
        }

        if node.children.is_empty() {
            tracing::debug!("Group {} has no installed plugins; not adding it", group_name);
            continue;
        }

        let members: Vec<&str> = node.children.iter().map(|c| c.name.as_str()).collect();
        node.long_about = Some(format!("{}\n\nPlugins: {}", group.description, members.join(", ")));
        result.groups.push(node);
    }

    result
}
