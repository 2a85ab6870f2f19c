//! Tack command-line entry point.
//!
//! # Examples
//!
//! ```bash
//! # Run a plugin operation
//! tack dns resolve --hostname example.com --record-type MX
//!
//! # Same, as JSON
//! tack --output json dns resolve --hostname example.com
//!
//! # Manage plugins and groups
//! tack plugin install ./custom.wasm
//! tack group create network --description "Network checks"
//! tack group add network dns tls
//! ```

use anyhow::Result;
use clap::FromArgMatches;
use std::path::Path;
use std::sync::Arc;
use tack_cli::{GlobalArgs, RootTree, Session, execute};
use tack_core::cli::ExitCode;
use tack_core::config::{Config, default_config_path};
use tack_core::traits::{CapabilityGate, PluginExecutor};
use tack_plugin::{BundledPlugins, Loader};
use tack_runtime::{AutoTrustGate, InteractiveGate, WasmExecutor};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const VERBOSE_FILTER: &str = "warn,tack_cli=debug,tack_core=debug,tack_plugin=debug,tack_runtime=debug";

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    // The plugin tree has to exist before clap can parse, so -v is read by hand.
    init_logging(args.iter().skip(1).any(|a| a == "-v" || a == "--verbose"));

    let config_path = default_config_path();
    let config = load_config(&config_path);

    let discovery: Arc<dyn PluginExecutor> = Arc::new(WasmExecutor::new()?);
    let loader = Loader::new(config.plugins_dir(), discovery)
        .with_bundled(BundledPlugins::builtin())
        .with_cache_path(config.cache_path())
        .with_default_registry(config.default_registry.clone())
        .with_registry_timeout(config.timeout());
    let discovered = loader.discover_all();
    tracing::debug!("Discovered {} plugin(s)", discovered.len());

    let tree = RootTree::assemble(&discovered, &config);
    let args = tree.expand_aliases(args);

    if let Some(name) = tree.unknown_command(&args) {
        eprintln!("{}", tree.not_found_message(name));
        std::process::exit(ExitCode::ERROR.as_i32());
    }

    let matches = tree
        .command()
        .try_get_matches_from(&args)
        .unwrap_or_else(|e| e.exit());
    let globals = GlobalArgs::from_arg_matches(&matches)?;
    let output_format = match globals.output_format(&config) {
        Ok(format) => format,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(ExitCode::INVALID_INPUT.as_i32());
        }
    };

    let gate: Arc<dyn CapabilityGate> = if globals.trust_plugins {
        Arc::new(AutoTrustGate)
    } else {
        Arc::new(InteractiveGate)
    };
    let executor = WasmExecutor::new()?.with_gate(gate);

    let session = Session {
        config,
        config_path,
        loader: &loader,
        discovered: &discovered,
        executor: &executor,
        output_format,
    };

    let exit_code = match execute(&tree, &matches, session).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::ERROR
        }
    };

    std::process::exit(exit_code.as_i32());
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Config file, then environment overrides. A broken file is reported and
/// replaced by defaults so plugins stay usable.
fn load_config(path: &Path) -> Config {
    let mut config = Config::load(path).unwrap_or_else(|e| {
        tracing::warn!("{}; using defaults", e);
        Config::default()
    });
    config.apply_env_overrides(|key| std::env::var(key).ok());

    if let Err(e) = config.validate_groups() {
        tracing::warn!("Invalid group configuration: {}", e);
    }
    config
}
