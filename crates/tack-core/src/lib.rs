//! Core types, traits, and errors for tack.
//!
//! This crate provides the foundational types shared by the plugin loader,
//! the WASM runtime, and the CLI.
//!
//! # Architecture
//!
//! - Plugin manifest and check-result model ([`manifest`])
//! - Error hierarchy scoped to plugins and source tiers ([`Error`])
//! - Collaborator traits for execution, grants, formatting and registry
//!   fetches ([`traits`])
//! - User configuration and plugin groups ([`config`], [`groups`])

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

mod error;

pub mod cli;
pub mod config;
pub mod groups;
pub mod manifest;
pub mod traits;

pub use error::{Error, Result};
