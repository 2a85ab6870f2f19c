//! Root command assembly.
//!
//! The root is filled in a fixed order: built-in commands, group commands,
//! root-level plugins, then aliases. A name already taken by an earlier
//! entry is skipped with a warning.
//!
//! When no groups are configured every discovered plugin sits at the root.
//! Otherwise a plugin sits at the root if it is listed in `top` or belongs
//! to no group that became a command. A group skipped for its name leaves
//! its plugins at the root.

use crate::commands::group::GroupAction;
use crate::commands::plugin::PluginAction;
use crate::groups::overlay;
use crate::synth::{CommandNode, synthesize};
use anyhow::{Result, anyhow};
use clap::{Arg, ArgMatches, Args, Command, FromArgMatches, Subcommand};
use clap_complete::Shell;
use std::collections::{BTreeMap, BTreeSet};
use tack_core::cli::OutputFormat;
use tack_core::config::{APP_NAME, Config};
use tack_core::groups::{RESERVED_COMMANDS, validate_group_name};
use tack_plugin::DiscoveredPlugin;

/// Root help text.
pub const ABOUT: &str = "Infrastructure inspection tool powered by WASM plugins";

const LONG_ABOUT: &str = "Tack is a general-purpose infrastructure inspection tool. Its commands \
are generated from the WASM plugins it finds, so installing a plugin adds \
a command.";

/// Flags accepted by every command.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalArgs {
    /// Output format
    #[arg(long, global = true, value_parser = ["table", "json", "yaml", "quiet"])]
    pub output: Option<String>,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output; the exit code indicates the result
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Grant plugins every capability they request without asking
    #[arg(long, global = true)]
    pub trust_plugins: bool,
}

impl GlobalArgs {
    /// Resolves the output format. `--quiet` (or `quiet` in the config)
    /// wins over everything; `--output` wins over the configured format.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured format name is unknown.
    pub fn output_format(&self, config: &Config) -> Result<OutputFormat> {
        if self.quiet || config.quiet {
            return Ok(OutputFormat::Quiet);
        }
        let name = self.output.as_deref().unwrap_or(&config.output);
        name.parse::<OutputFormat>().map_err(|e| anyhow!("{e}"))
    }
}

/// Commands that exist regardless of installed plugins.
#[derive(Subcommand, Debug)]
pub enum Builtin {
    /// Generate shell completion scripts
    Completion {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Print version information
    Version,

    /// Manage plugins
    Plugin {
        /// Plugin action
        #[command(subcommand)]
        action: PluginAction,
    },

    /// Manage plugin groups
    Group {
        /// Group action
        #[command(subcommand)]
        action: GroupAction,
    },
}

/// What a parsed command line asks for.
#[derive(Debug)]
pub enum Invocation<'a> {
    /// A built-in command.
    Builtin(Builtin),
    /// A synthesized command with the matches that belong to it.
    Node(&'a CommandNode, &'a ArgMatches),
}

/// The assembled command surface.
#[derive(Debug, Default)]
pub struct RootTree {
    nodes: Vec<CommandNode>,
    aliases: BTreeMap<String, String>,
}

impl RootTree {
    /// Builds the root from discovered plugins and the user's groups,
    /// defaults and aliases.
    #[must_use]
    pub fn assemble(discovered: &[DiscoveredPlugin], config: &Config) -> Self {
        let mut taken: BTreeSet<String> = RESERVED_COMMANDS.iter().map(|s| (*s).to_string()).collect();
        let by_name: BTreeMap<&str, &DiscoveredPlugin> = discovered.iter().map(|p| (p.name(), p)).collect();

        let layered = overlay(&config.groups, &by_name, |plugin, parent| {
            synthesize(plugin, config.defaults_for(plugin.name()), parent)
        });

        // Plugins reachable through a group command that made it to the root.
        let mut placed = BTreeSet::new();
        let mut nodes = Vec::new();
        for group in layered.groups {
            if let Err(e) = validate_group_name(&group.name) {
                tracing::warn!("Skipping group \"{}\": {}", group.name, e);
                continue;
            }
            taken.insert(group.name.clone());
            placed.extend(group.children.iter().map(|c| c.name.clone()));
            nodes.push(group);
        }

        for (name, plugin) in &by_name {
            let at_root = layered.top.contains(*name) || !placed.contains(*name);
            if !at_root {
                continue;
            }
            if !taken.insert((*name).to_string()) {
                tracing::warn!("Plugin \"{}\" collides with an existing command; skipping", name);
                continue;
            }
            nodes.push(synthesize(plugin, config.defaults_for(name), &[]));
        }

        let mut aliases = BTreeMap::new();
        for (alias, target) in &config.aliases {
            if alias.trim().is_empty() || target.split_whitespace().next().is_none() {
                tracing::warn!("Alias \"{}\" has an empty name or target; skipping", alias);
                continue;
            }
            if !taken.insert(alias.clone()) {
                tracing::warn!("Alias \"{}\" collides with an existing command; skipping", alias);
                continue;
            }
            aliases.insert(alias.clone(), target.clone());
        }

        Self { nodes, aliases }
    }

    /// Group and plugin commands at the root, in assembly order.
    #[must_use]
    pub fn nodes(&self) -> &[CommandNode] {
        &self.nodes
    }

    /// Accepted aliases.
    #[must_use]
    pub const fn aliases(&self) -> &BTreeMap<String, String> {
        &self.aliases
    }

    /// Renders the whole tree into a clap command.
    #[must_use]
    pub fn command(&self) -> Command {
        let root = Command::new(APP_NAME)
            .about(ABOUT)
            .long_about(LONG_ABOUT)
            .version(env!("CARGO_PKG_VERSION"))
            .subcommand_required(true)
            .arg_required_else_help(true);
        let root = GlobalArgs::augment_args(root);
        let root = Builtin::augment_subcommands(root);

        root.subcommands(self.nodes.iter().map(CommandNode::to_command))
            .subcommands(self.aliases.iter().map(|(alias, target)| {
                Command::new(alias.clone())
                    .about(format!("Alias for: {target}"))
                    .arg(
                        Arg::new("args")
                            .num_args(0..)
                            .trailing_var_arg(true)
                            .allow_hyphen_values(true),
                    )
            }))
    }

    /// Rewrites an invocation whose command word is an alias into the
    /// alias target followed by the remaining arguments.
    ///
    /// `args` includes the program name. Expansion happens once, so an
    /// alias pointing at another alias is not expanded again.
    #[must_use]
    pub fn expand_aliases(&self, args: Vec<String>) -> Vec<String> {
        let Some(index) = command_word_index(&args) else {
            return args;
        };
        let Some(target) = self.aliases.get(&args[index]) else {
            return args;
        };

        tracing::debug!("Expanding alias {} to {}", args[index], target);
        let mut expanded = args[..index].to_vec();
        expanded.extend(target.split_whitespace().map(str::to_string));
        expanded.extend(args[index + 1..].iter().cloned());
        expanded
    }

    /// Returns the command word if it names nothing at the root.
    #[must_use]
    pub fn unknown_command<'a>(&self, args: &'a [String]) -> Option<&'a str> {
        let word = args.get(command_word_index(args)?)?.as_str();
        let known = word == "help"
            || Builtin::has_subcommand(word)
            || self.aliases.contains_key(word)
            || self.nodes.iter().any(|n| n.name == word);
        (!known).then_some(word)
    }

    /// Message printed for an unknown root command.
    #[must_use]
    pub fn not_found_message(&self, name: &str) -> String {
        let mut lines = vec![format!("Error: plugin \"{name}\" not found")];
        if !self.nodes.is_empty() {
            let installed: Vec<&str> = self.nodes.iter().map(|n| n.name.as_str()).collect();
            lines.push(format!("  Installed plugins: {}", installed.join(", ")));
        }
        lines.push(format!("  To install: {APP_NAME} plugin install {name}"));
        lines.join("\n")
    }

    /// Maps parsed root matches to what should run.
    ///
    /// # Errors
    ///
    /// Returns an error if no subcommand was given or the subcommand is
    /// not part of this tree.
    pub fn dispatch<'a>(&'a self, matches: &'a ArgMatches) -> Result<Invocation<'a>> {
        let (name, sub) = matches
            .subcommand()
            .ok_or_else(|| anyhow!("no command given"))?;

        if Builtin::has_subcommand(name) {
            return Ok(Invocation::Builtin(Builtin::from_arg_matches(matches)?));
        }

        let node = self
            .nodes
            .iter()
            .find(|n| n.name == name)
            .ok_or_else(|| anyhow!("unknown command '{name}'"))?;
        let (node, matches) = node.resolve(sub);
        Ok(Invocation::Node(node, matches))
    }
}

/// Index of the first argument that is neither a flag nor the value of
/// `--output`.
fn command_word_index(args: &[String]) -> Option<usize> {
    let mut skip_value = false;
    for (i, arg) in args.iter().enumerate().skip(1) {
        if skip_value {
            skip_value = false;
            continue;
        }
        if arg == "--" {
            return (i + 1 < args.len()).then_some(i + 1);
        }
        if arg == "--output" {
            skip_value = true;
            continue;
        }
        if arg.starts_with('-') {
            continue;
        }
        return Some(i);
    }
    None
}
