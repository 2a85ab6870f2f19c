//! Shell completion generation command.
//!
//! Completions are generated from the fully assembled command tree, so
//! plugin commands, their flags and enum values are all included.

use anyhow::Result;
use clap::Command;
use clap_complete::{Shell, generate};
use std::io::{self, Write};
use tack_core::cli::ExitCode;
use tracing::info;

/// Writes the completion script for `shell` to `out`.
///
/// # Examples
///
/// ```
/// use clap::Command;
/// use clap_complete::Shell;
/// use tack_cli::commands::completions;
///
/// let mut cmd = Command::new("tack").subcommand(Command::new("version"));
/// let mut out = Vec::new();
/// completions::generate_completions(Shell::Bash, &mut cmd, &mut out);
/// assert!(!out.is_empty());
/// ```
pub fn generate_completions(shell: Shell, cmd: &mut Command, out: &mut dyn Write) {
    info!("Generating {} completions", shell);
    let name = cmd.get_name().to_string();
    generate(shell, cmd, name, out);
}

/// Runs the completion command, printing the script to stdout.
///
/// # Errors
///
/// This function currently always succeeds.
pub fn run(shell: Shell, cmd: &mut Command) -> Result<ExitCode> {
    generate_completions(shell, cmd, &mut io::stdout());
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Arg;

    fn sample() -> Command {
        Command::new("tack").subcommand(
            Command::new("dns").subcommand(
                Command::new("resolve").arg(
                    Arg::new("record-type")
                        .long("record-type")
                        .value_parser(["A", "AAAA", "MX"]),
                ),
            ),
        )
    }

    fn script(shell: Shell) -> String {
        let mut out = Vec::new();
        generate_completions(shell, &mut sample(), &mut out);
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_bash_includes_plugin_commands() {
        let out = script(Shell::Bash);
        assert!(out.contains("resolve"));
        assert!(out.contains("--record-type"));
    }

    #[test]
    fn test_zsh_includes_enum_values() {
        let out = script(Shell::Zsh);
        assert!(out.contains("AAAA"));
    }

    #[test]
    fn test_fish_and_powershell() {
        assert!(script(Shell::Fish).contains("resolve"));
        assert!(script(Shell::PowerShell).contains("resolve"));
    }
}
