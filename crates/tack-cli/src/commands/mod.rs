//! Built-in commands.
//!
//! Each module owns its clap action type and a `run` function that formats
//! a serializable report with [`crate::formatters::format_output`].

pub mod completions;
pub mod group;
pub mod plugin;
pub mod version;
