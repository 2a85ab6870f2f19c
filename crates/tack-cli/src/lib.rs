//! Tack CLI library.
//!
//! Turns plugin manifests into a command tree:
//!
//! - [`flags`] maps a config schema to typed flags and back to an input config
//! - [`synth`] builds one subtree per plugin
//! - [`groups`] re-parents subtrees under user-defined groups
//! - [`root`] assembles built-ins, groups, plugins and aliases
//! - [`runner`] executes whatever the parsed command line selects
//!
//! The binary in `main.rs` wires these to the wasmtime executor and the
//! on-disk config.

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

pub mod commands;
pub mod flags;
pub mod formatters;
pub mod groups;
pub mod root;
pub mod runner;
pub mod synth;

pub use root::{GlobalArgs, RootTree};
pub use runner::{Session, execute};
