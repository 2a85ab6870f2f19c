//! Version command.

use anyhow::Result;
use serde::Serialize;
use tack_core::cli::{ExitCode, OutputFormat};
use tack_core::config::APP_NAME;

/// Build information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    /// Crate version
    pub version: String,
    /// Target operating system
    pub os: String,
    /// Target architecture
    pub arch: String,
}

impl VersionInfo {
    /// Information about this build.
    #[must_use]
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }
}

/// Prints version information.
///
/// # Errors
///
/// Returns an error if formatting fails.
pub fn run(output_format: OutputFormat) -> Result<ExitCode> {
    let info = VersionInfo::current();
    match output_format {
        OutputFormat::Table => println!("{APP_NAME} version {} {}/{}", info.version, info.os, info.arch),
        OutputFormat::Quiet => {}
        other => println!("{}", crate::formatters::format_output(&info, other)?),
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_matches_build() {
        let info = VersionInfo::current();
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(info.os, std::env::consts::OS);
    }
}
