//! Command-tree synthesis from plugin manifests.
//!
//! A manifest with one service maps its operations directly under the
//! plugin command:
//!
//! ```text
//! tack dns resolve --hostname example.com
//! ```
//!
//! With two or more services each service becomes an intermediate command:
//!
//! ```text
//! tack aws ec2 describe_security_groups
//! tack aws iam get_account_summary
//! ```
//!
//! Nodes are plain data. [`CommandNode::to_command`] renders a node into a
//! clap command, and [`CommandNode::resolve`] walks parsed matches back to
//! the node that should run.

use crate::flags::{FlagSpec, ParsedSchema, display_value, field_to_flag, flag_specs};
use clap::{ArgMatches, Command};
use serde_json::Value;
use std::collections::BTreeMap;
use tack_core::config::APP_NAME;
use tack_core::manifest::{OperationManifest, ServiceManifest};
use tack_plugin::{ByteLoader, DiscoveredPlugin};

/// A synthesized command.
#[derive(Debug)]
pub struct CommandNode {
    /// Command name.
    pub name: String,
    /// One-line help.
    pub about: String,
    /// Extended help, shown with `--help`.
    pub long_about: Option<String>,
    /// Rendered example blocks.
    pub examples: Vec<String>,
    /// Child commands.
    pub children: Vec<CommandNode>,
    /// What runs when this node is the deepest matched command.
    pub action: Option<NodeAction>,
}

/// Terminal behavior of a node.
#[derive(Debug)]
pub enum NodeAction {
    /// Run a plugin operation.
    Operation(Box<Operation>),
    /// The plugin's schema is unusable; report this message when invoked.
    Invalid(String),
}

/// Everything needed to invoke one plugin operation.
#[derive(Debug)]
pub struct Operation {
    /// Plugin name.
    pub plugin: String,
    /// Service name placed in the input config.
    pub service: String,
    /// Operation name placed in the input config.
    pub operation: String,
    /// Flags bound to the command.
    pub flags: Vec<FlagSpec>,
    /// Declared output schema, handed to the formatter.
    pub output_schema: Value,
    /// Lazy access to the plugin bytes.
    pub loader: ByteLoader,
}

impl CommandNode {
    /// A node with no children and no action.
    #[must_use]
    pub fn new(name: impl Into<String>, about: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            about: about.into(),
            long_about: None,
            examples: Vec::new(),
            children: Vec::new(),
            action: None,
        }
    }

    /// Finds a direct child.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Self> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Attaches `child` unless its name is empty, `help`, or already taken
    /// by a sibling. Returns whether the child was attached.
    pub fn add_child(&mut self, child: Self) -> bool {
        if child.name.is_empty() || child.name == "help" || self.child(&child.name).is_some() {
            tracing::warn!(
                "Skipping command '{}' under '{}': name is empty, reserved or duplicated",
                child.name,
                self.name
            );
            return false;
        }
        self.children.push(child);
        true
    }

    /// Renders this node and its subtree into a clap command.
    #[must_use]
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(self.name.clone()).about(self.about.clone());

        if let Some(long) = &self.long_about {
            cmd = cmd.long_about(long.clone());
        }
        if !self.examples.is_empty() {
            cmd = cmd.after_help(format!("Examples:\n{}", self.examples.join("\n\n")));
        }
        if let Some(NodeAction::Operation(op)) = &self.action {
            cmd = cmd.args(op.flags.iter().map(FlagSpec::to_arg));
        }
        if !self.children.is_empty() {
            cmd = cmd
                .subcommand_required(true)
                .arg_required_else_help(true)
                .subcommands(self.children.iter().map(Self::to_command));
        }
        cmd
    }

    /// Follows the subcommand chain in `matches` (the matches of this node)
    /// to the deepest node and the matches that belong to it.
    #[must_use]
    pub fn resolve<'a>(&'a self, matches: &'a ArgMatches) -> (&'a Self, &'a ArgMatches) {
        if let Some((name, sub)) = matches.subcommand()
            && let Some(child) = self.child(name)
        {
            return child.resolve(sub);
        }
        (self, matches)
    }
}

/// Builds the command subtree for one plugin.
///
/// `parent_path` is the chain of commands above the plugin (empty at the
/// root, `[group]` under a group) and only affects rendered examples.
/// `defaults` are the user's per-plugin flag defaults, keyed by flag name.
///
/// Every call builds a fresh subtree; nothing is shared between two calls
/// for the same plugin except the byte loader, which is immutable.
#[must_use]
pub fn synthesize(
    plugin: &DiscoveredPlugin,
    defaults: Option<&BTreeMap<String, String>>,
    parent_path: &[String],
) -> CommandNode {
    let manifest = &plugin.manifest;
    let mut node = CommandNode::new(manifest.name.clone(), manifest.description.clone());

    let schema = match ParsedSchema::parse(&manifest.name, &manifest.config_schema) {
        Ok(schema) => schema,
        Err(e) => {
            tracing::debug!("Plugin {} has an unusable schema: {}", manifest.name, e);
            node.action = Some(NodeAction::Invalid(e.to_string()));
            return node;
        }
    };

    let ctx = SynthContext {
        plugin,
        schema: &schema,
        defaults,
        parent_path,
    };

    if manifest.services.len() == 1 {
        for (key, service) in &manifest.services {
            let service_name = if service.name.is_empty() { key } else { &service.name };
            for op in &service.operations {
                let child = ctx.operation(service_name, op, false);
                let examples = child.examples.clone();
                if node.add_child(child) {
                    node.examples.extend(examples);
                }
            }
        }
    } else {
        for (name, service) in &manifest.services {
            let service_node = ctx.service(name, service);
            let first = service_node.examples.first().cloned();
            if node.add_child(service_node) {
                node.examples.extend(first);
            }
        }
    }

    node
}

struct SynthContext<'a> {
    plugin: &'a DiscoveredPlugin,
    schema: &'a ParsedSchema,
    defaults: Option<&'a BTreeMap<String, String>>,
    parent_path: &'a [String],
}

impl SynthContext<'_> {
    fn service(&self, name: &str, service: &ServiceManifest) -> CommandNode {
        let mut node = CommandNode::new(name, service.description.clone());
        for op in &service.operations {
            let child = self.operation(name, op, true);
            let examples = child.examples.clone();
            if node.add_child(child) {
                node.examples.extend(examples);
            }
        }
        node
    }

    fn operation(&self, service: &str, op: &OperationManifest, nested: bool) -> CommandNode {
        let plugin_name = &self.plugin.manifest.name;
        let mut node = CommandNode::new(op.name.clone(), op.description.clone());

        let mut path: Vec<&str> = std::iter::once(APP_NAME)
            .chain(self.parent_path.iter().map(String::as_str))
            .chain(std::iter::once(plugin_name.as_str()))
            .collect();
        if nested {
            path.push(service);
        }
        path.push(&op.name);

        node.examples = render_examples(&path.join(" "), op);
        node.action = Some(NodeAction::Operation(Box::new(Operation {
            plugin: plugin_name.clone(),
            service: service.to_string(),
            operation: op.name.clone(),
            flags: flag_specs(self.schema, &op.input_fields, self.defaults),
            output_schema: op.output_schema.clone(),
            loader: self.plugin.loader.clone(),
        })));
        node
    }
}

/// Renders an operation's non-error examples as flag invocations.
///
/// # Examples
///
/// ```
/// use tack_cli::synth::render_examples;
/// use tack_core::manifest::{OperationExample, OperationManifest};
///
/// let op = OperationManifest {
///     name: "resolve".to_string(),
///     examples: vec![OperationExample {
///         description: "Look up MX records".to_string(),
///         input: serde_json::json!({"hostname": "example.com", "record_type": "MX"}),
///         ..OperationExample::default()
///     }],
///     ..OperationManifest::default()
/// };
///
/// assert_eq!(
///     render_examples("tack dns resolve", &op),
///     vec!["  # Look up MX records\n  tack dns resolve --hostname \"example.com\" --record-type \"MX\""],
/// );
/// ```
#[must_use]
pub fn render_examples(command_path: &str, op: &OperationManifest) -> Vec<String> {
    op.examples
        .iter()
        .filter(|ex| !ex.is_error_example())
        .map(|ex| {
            let mut block = String::new();
            if !ex.description.is_empty() {
                block.push_str(&format!("  # {}\n", ex.description));
            }
            block.push_str(&format!("  {command_path}"));
            if let Value::Object(fields) = &ex.input {
                for (field, value) in fields {
                    block.push_str(&format!(" --{} {:?}", field_to_flag(field), example_value(value)));
                }
            }
            block
        })
        .collect()
}

fn example_value(value: &Value) -> String {
    match value {
        Value::Array(items) => items.iter().map(display_value).collect::<Vec<_>>().join(","),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{k}={}", display_value(v)))
            .collect::<Vec<_>>()
            .join(","),
        other => display_value(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tack_core::manifest::Manifest;
    use tack_plugin::SourceKind;

    fn plugin(manifest: Value) -> DiscoveredPlugin {
        DiscoveredPlugin {
            manifest: serde_json::from_value::<Manifest>(manifest).unwrap(),
            source: SourceKind::Local,
            source_path: "/tmp/x.wasm".to_string(),
            loader: ByteLoader::from_fn(|| Ok(Vec::new())),
        }
    }

    fn dns() -> DiscoveredPlugin {
        plugin(json!({
            "name": "dns",
            "description": "DNS checks",
            "services": {
                "dns": {
                    "name": "dns",
                    "operations": [{
                        "name": "resolve",
                        "description": "Resolve a hostname",
                        "input_fields": ["hostname"],
                        "examples": [
                            { "description": "Basic lookup", "input": { "hostname": "example.com" } },
                            { "description": "Bad host", "input": { "hostname": "" }, "expected_error": "empty" }
                        ]
                    }]
                }
            },
            "config_schema": {
                "properties": { "hostname": { "type": "string" }, "unused": { "type": "string" } },
                "required": ["hostname"]
            }
        }))
    }

    fn aws() -> DiscoveredPlugin {
        plugin(json!({
            "name": "aws",
            "services": {
                "ec2": {
                    "name": "ec2",
                    "operations": [
                        { "name": "describe_instances", "examples": [{ "input": { "region": "us-east-1" } }] },
                        { "name": "describe_vpcs", "examples": [{ "input": { "region": "eu-west-1" } }] }
                    ]
                },
                "iam": {
                    "name": "iam",
                    "operations": [
                        { "name": "get_account_summary", "examples": [{ "input": {} }] }
                    ]
                }
            },
            "config_schema": { "properties": { "region": { "type": "string" } } }
        }))
    }

    fn names(node: &CommandNode) -> Vec<&str> {
        node.children.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_single_service_operations_are_direct_children() {
        let node = synthesize(&dns(), None, &[]);
        assert_eq!(node.name, "dns");
        assert_eq!(names(&node), vec!["resolve"]);
        assert!(node.children[0].children.is_empty());
    }

    #[test]
    fn test_multi_service_builds_service_nodes() {
        let node = synthesize(&aws(), None, &[]);
        assert_eq!(names(&node), vec!["ec2", "iam"]);
        assert_eq!(names(&node.children[0]), vec!["describe_instances", "describe_vpcs"]);
        assert_eq!(names(&node.children[1]), vec!["get_account_summary"]);
    }

    #[test]
    fn test_operation_binds_allowlisted_flags() {
        let node = synthesize(&dns(), None, &[]);
        let Some(NodeAction::Operation(op)) = &node.children[0].action else {
            panic!("resolve should run an operation");
        };
        assert_eq!(op.service, "dns");
        assert_eq!(op.operation, "resolve");
        let flags: Vec<&str> = op.flags.iter().map(|f| f.flag.as_str()).collect();
        assert_eq!(flags, vec!["hostname"]);
    }

    #[test]
    fn test_error_examples_are_not_rendered() {
        let node = synthesize(&dns(), None, &[]);
        assert_eq!(
            node.children[0].examples,
            vec!["  # Basic lookup\n  tack dns resolve --hostname \"example.com\""]
        );
    }

    #[test]
    fn test_single_service_examples_promote_to_plugin() {
        let node = synthesize(&dns(), None, &[]);
        assert_eq!(node.examples, node.children[0].examples);
    }

    #[test]
    fn test_multi_service_example_promotion() {
        let node = synthesize(&aws(), None, &[]);
        let ec2 = &node.children[0];
        assert_eq!(ec2.examples.len(), 2);
        assert_eq!(
            ec2.examples[0],
            "  tack aws ec2 describe_instances --region \"us-east-1\""
        );

        // First example of each service reaches the plugin node.
        assert_eq!(
            node.examples,
            vec![
                "  tack aws ec2 describe_instances --region \"us-east-1\"".to_string(),
                "  tack aws iam get_account_summary".to_string(),
            ]
        );
    }

    #[test]
    fn test_examples_include_parent_path() {
        let node = synthesize(&dns(), None, &["network".to_string()]);
        assert!(node.children[0].examples[0].contains("tack network dns resolve"));
    }

    #[test]
    fn test_invalid_schema_reports_on_invocation() {
        let broken = plugin(json!({
            "name": "broken",
            "services": { "s": { "name": "s", "operations": [{ "name": "op" }] } },
            "config_schema": { "properties": 42 }
        }));
        let node = synthesize(&broken, None, &[]);
        assert!(node.children.is_empty());
        match &node.action {
            Some(NodeAction::Invalid(message)) => assert!(message.contains("config schema")),
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn test_resolve_walks_to_leaf() {
        let node = synthesize(&aws(), None, &[]);
        let cmd = node.to_command();
        let matches = cmd
            .try_get_matches_from(["aws", "iam", "get_account_summary"])
            .unwrap();

        let (leaf, _) = node.resolve(&matches);
        assert_eq!(leaf.name, "get_account_summary");
    }

    #[test]
    fn test_subtrees_are_independent() {
        let shared = dns();
        let mut first = synthesize(&shared, None, &["a".to_string()]);
        let second = synthesize(&shared, None, &["b".to_string()]);

        first.children.clear();
        assert_eq!(second.children.len(), 1);
        assert!(second.children[0].examples[0].contains("tack b dns"));
    }

    #[test]
    fn test_duplicate_operation_names_are_skipped() {
        let dup = plugin(json!({
            "name": "dns",
            "services": {
                "dns": {
                    "name": "dns",
                    "operations": [
                        { "name": "resolve", "description": "first" },
                        { "name": "resolve", "description": "second" },
                        { "name": "help" },
                        { "name": "" }
                    ]
                }
            },
            "config_schema": { "properties": { "a_b": { "type": "string" }, "a-b": { "type": "string" } } }
        }));
        let node = synthesize(&dup, None, &[]);
        assert_eq!(names(&node), vec!["resolve"]);
        assert_eq!(node.children[0].about, "first");

        let matches = node.to_command().try_get_matches_from(["dns", "resolve", "--a-b", "x"]).unwrap();
        let (leaf, _) = node.resolve(&matches);
        assert_eq!(leaf.name, "resolve");
    }

    #[test]
    fn test_duplicate_operations_in_nested_service_are_skipped() {
        let dup = plugin(json!({
            "name": "aws",
            "services": {
                "ec2": { "name": "ec2", "operations": [{ "name": "list" }, { "name": "list" }] },
                "help": { "name": "help", "operations": [{ "name": "x" }] }
            }
        }));
        let node = synthesize(&dup, None, &[]);
        assert_eq!(names(&node), vec!["ec2"]);
        assert_eq!(names(&node.children[0]), vec!["list"]);
        assert!(node.to_command().try_get_matches_from(["aws", "ec2", "list"]).is_ok());
    }

    #[test]
    fn test_rendered_command_requires_subcommand() {
        let cmd = synthesize(&dns(), None, &[]).to_command();
        assert!(cmd.clone().try_get_matches_from(["dns"]).is_err());
        assert!(cmd.try_get_matches_from(["dns", "resolve"]).is_err());
    }
}
