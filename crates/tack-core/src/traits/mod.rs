//! Collaborator traits.
//!
//! Discovery and command synthesis depend on these seams rather than on a
//! concrete runtime, formatter, or registry client.
//!
//! # Module Structure
//!
//! - `executor` - plugin loading and invocation
//! - `grant` - capability grants
//! - `formatter` - result rendering
//! - `registry` - remote plugin fetch

mod executor;
mod formatter;
mod grant;
mod registry;

pub use executor::{PluginExecutor, PluginInstance};
pub use formatter::OutputFormatter;
pub use grant::CapabilityGate;
pub use registry::RegistryResolver;
