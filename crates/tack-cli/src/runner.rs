//! Command execution.
//!
//! [`execute`] routes parsed matches to a built-in command or to a
//! synthesized operation. Running an operation loads the plugin's bytes,
//! instantiates it through the executor, builds the input config from the
//! parsed flags, and renders the result.

use crate::commands;
use crate::flags::build_input_config;
use crate::formatters::formatter_for;
use crate::root::{Builtin, Invocation, RootTree};
use crate::synth::{CommandNode, NodeAction, Operation};
use anyhow::{Context, Result, bail};
use clap::ArgMatches;
use std::io::{self, Write};
use std::path::PathBuf;
use tack_core::cli::{ExitCode, OutputFormat};
use tack_core::config::Config;
use tack_core::manifest::CheckResult;
use tack_core::traits::{OutputFormatter, PluginExecutor};
use tack_plugin::{DiscoveredPlugin, Loader};

/// State shared by every command of one invocation.
#[derive(Debug)]
pub struct Session<'a> {
    /// Effective configuration, environment overrides applied.
    pub config: Config,
    /// Where group changes are saved.
    pub config_path: PathBuf,
    /// Loader used for discovery.
    pub loader: &'a Loader,
    /// Plugins found at startup.
    pub discovered: &'a [DiscoveredPlugin],
    /// Executor for plugin calls, with the capability gate attached.
    pub executor: &'a dyn PluginExecutor,
    /// Resolved output format.
    pub output_format: OutputFormat,
}

/// Executes the command selected by `matches`.
///
/// # Errors
///
/// Returns an error if the selected command fails.
pub async fn execute(tree: &RootTree, matches: &ArgMatches, session: Session<'_>) -> Result<ExitCode> {
    let format = session.output_format;
    match tree.dispatch(matches)? {
        Invocation::Builtin(Builtin::Completion { shell }) => {
            commands::completions::run(shell, &mut tree.command())
        }
        Invocation::Builtin(Builtin::Version) => commands::version::run(format),
        Invocation::Builtin(Builtin::Plugin { action }) => {
            commands::plugin::run(action, session.loader, session.discovered, &session.config, format).await
        }
        Invocation::Builtin(Builtin::Group { action }) => {
            // Reload so environment overrides are never written back.
            let mut config = Config::load(&session.config_path)?;
            commands::group::run(action, &mut config, &session.config_path, format)
        }
        Invocation::Node(node, sub) => {
            let formatter = formatter_for(format);
            run_node(
                node,
                sub,
                session.executor,
                formatter.as_ref(),
                &mut io::stdout().lock(),
                &mut io::stderr().lock(),
            )
        }
    }
}

/// Runs the action attached to `node`.
///
/// # Errors
///
/// Returns an error if the node has no action, its plugin schema was
/// invalid, or the plugin could not be loaded or run.
pub fn run_node(
    node: &CommandNode,
    matches: &ArgMatches,
    executor: &dyn PluginExecutor,
    formatter: &dyn OutputFormatter,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<ExitCode> {
    match &node.action {
        Some(NodeAction::Operation(op)) => run_operation(op, matches, executor, formatter, out, err),
        Some(NodeAction::Invalid(message)) => bail!("{message}"),
        None => bail!("command '{}' requires a subcommand", node.name),
    }
}

/// Invokes one operation and writes its formatted result.
///
/// A result with status `error` is reported on `err` and yields
/// [`ExitCode::ERROR`]; a `failure` result is printed like any other and
/// also yields [`ExitCode::ERROR`].
///
/// # Errors
///
/// Returns an error if loading, instantiation, the call, or formatting
/// fails.
pub fn run_operation(
    op: &Operation,
    matches: &ArgMatches,
    executor: &dyn PluginExecutor,
    formatter: &dyn OutputFormatter,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> Result<ExitCode> {
    let bytes = op
        .loader
        .load()
        .with_context(|| format!("failed to read plugin '{}'", op.plugin))?;
    let mut instance = executor
        .load(&bytes)
        .with_context(|| format!("failed to load plugin '{}'", op.plugin))?;

    let config = build_input_config(matches, &op.flags, &op.service, &op.operation);
    tracing::debug!("Calling {}/{}/{}", op.plugin, op.service, op.operation);

    let result = instance
        .check(&config)
        .with_context(|| format!("plugin '{}' failed", op.plugin))?;

    if result.is_error() {
        write_error(&result, err)?;
        return Ok(ExitCode::ERROR);
    }

    let rendered = formatter.format(&result, &op.output_schema)?;
    if !rendered.is_empty() {
        writeln!(out, "{rendered}")?;
    }

    if result.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::ERROR)
    }
}

fn write_error(result: &CheckResult, err: &mut dyn Write) -> Result<()> {
    match &result.error {
        Some(error) => {
            writeln!(err, "Error: {}", error.message)?;
            if !error.kind.is_empty() {
                writeln!(err, "  Type: {}", error.kind)?;
            }
            if !error.code.is_empty() {
                writeln!(err, "  Code: {}", error.code)?;
            }
        }
        None if !result.message.is_empty() => writeln!(err, "Error: {}", result.message)?,
        None => writeln!(err, "Error: plugin reported an error")?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatters::json::JsonFormatter;
    use serde_json::{Map, Value, json};
    use std::sync::{Arc, Mutex};
    use tack_core::manifest::{CheckStatus, Manifest, ResultError};
    use tack_core::traits::PluginInstance;
    use tack_plugin::ByteLoader;

    #[derive(Debug)]
    struct Fixed {
        result: CheckResult,
        seen: Arc<Mutex<Vec<Map<String, Value>>>>,
    }

    #[derive(Debug)]
    struct FixedInstance {
        manifest: Manifest,
        result: CheckResult,
        seen: Arc<Mutex<Vec<Map<String, Value>>>>,
    }

    impl PluginInstance for FixedInstance {
        fn manifest(&self) -> &Manifest {
            &self.manifest
        }

        fn check(&mut self, config: &Map<String, Value>) -> tack_core::Result<CheckResult> {
            self.seen.lock().unwrap().push(config.clone());
            Ok(self.result.clone())
        }
    }

    impl PluginExecutor for Fixed {
        fn load(&self, _bytes: &[u8]) -> tack_core::Result<Box<dyn PluginInstance>> {
            Ok(Box::new(FixedInstance {
                manifest: Manifest::default(),
                result: self.result.clone(),
                seen: Arc::clone(&self.seen),
            }))
        }
    }

    fn operation() -> Operation {
        Operation {
            plugin: "dns".to_string(),
            service: "dns".to_string(),
            operation: "resolve".to_string(),
            flags: Vec::new(),
            output_schema: Value::Null,
            loader: ByteLoader::from_fn(|| Ok(b"\0asm".to_vec())),
        }
    }

    fn run(result: CheckResult) -> (ExitCode, String, String, Vec<Map<String, Value>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let executor = Fixed {
            result,
            seen: Arc::clone(&seen),
        };
        let matches = clap::Command::new("resolve").get_matches_from(["resolve"]);
        let (mut out, mut err) = (Vec::new(), Vec::new());
        let code = run_operation(&operation(), &matches, &executor, &JsonFormatter, &mut out, &mut err).unwrap();
        let seen = seen.lock().unwrap().clone();
        (
            code,
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
            seen,
        )
    }

    #[test]
    fn test_success_prints_data() {
        let (code, out, err, seen) = run(CheckResult {
            data: json!({"address": "1.2.3.4"}).as_object().cloned().unwrap(),
            ..CheckResult::default()
        });

        assert!(code.is_success());
        assert!(out.contains("\"address\": \"1.2.3.4\""));
        assert!(err.is_empty());
        assert_eq!(seen[0]["service"], "dns");
        assert_eq!(seen[0]["operation"], "resolve");
    }

    #[test]
    fn test_error_result_goes_to_stderr() {
        let (code, out, err, _) = run(CheckResult {
            status: CheckStatus::Error,
            error: Some(ResultError {
                message: "no such host".to_string(),
                kind: "network".to_string(),
                code: "NXDOMAIN".to_string(),
            }),
            ..CheckResult::default()
        });

        assert_eq!(code, ExitCode::ERROR);
        assert!(out.is_empty());
        assert_eq!(err, "Error: no such host\n  Type: network\n  Code: NXDOMAIN\n");
    }

    #[test]
    fn test_failure_is_printed_and_fails() {
        let (code, out, _, _) = run(CheckResult {
            status: CheckStatus::Failure,
            message: "certificate expires soon".to_string(),
            ..CheckResult::default()
        });

        assert_eq!(code, ExitCode::ERROR);
        assert!(out.contains("certificate expires soon"));
    }

    #[test]
    fn test_invalid_node_reports_schema_error() {
        let mut node = CommandNode::new("broken", "");
        node.action = Some(NodeAction::Invalid("invalid config schema".to_string()));
        let matches = clap::Command::new("broken").get_matches_from(["broken"]);
        let executor = Fixed {
            result: CheckResult::default(),
            seen: Arc::default(),
        };

        let err = run_node(&node, &matches, &executor, &JsonFormatter, &mut Vec::new(), &mut Vec::new())
            .unwrap_err();
        assert!(err.to_string().contains("invalid config schema"));
    }
}
