//! Capability grant trait.

use crate::Result;
use crate::manifest::Capabilities;

/// Decides which requested capabilities a plugin receives.
///
/// Called once when a plugin is loaded for execution. Implementations may
/// prompt the user or grant everything.
///
/// # Examples
///
/// ```
/// use tack_core::traits::CapabilityGate;
/// use tack_core::manifest::Capabilities;
/// use tack_core::{Error, Result};
///
/// #[derive(Debug)]
/// struct DenyAll;
///
/// impl CapabilityGate for DenyAll {
///     fn grant(&self, plugin: &str, required: &Capabilities) -> Result<Capabilities> {
///         if required.is_empty() {
///             return Ok(Capabilities::default());
///         }
///         Err(Error::CapabilityDenied { plugin: plugin.to_string() })
///     }
/// }
///
/// assert!(DenyAll.grant("dns", &Capabilities::default()).is_ok());
/// ```
pub trait CapabilityGate: Send + Sync + std::fmt::Debug {
    /// Returns the granted subset of `required`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapabilityDenied`](crate::Error::CapabilityDenied)
    /// when the plugin may not run.
    fn grant(&self, plugin: &str, required: &Capabilities) -> Result<Capabilities>;
}
