//! Plugin execution traits.
//!
//! The execution collaborator turns raw plugin bytes into a running
//! instance. Discovery only needs [`PluginInstance::manifest`]; command
//! invocation also calls [`PluginInstance::check`].

use crate::Result;
use crate::manifest::{CheckResult, Manifest};
use serde_json::{Map, Value};

/// Loads plugin binaries.
///
/// Implementations must be `Send + Sync`: one executor is shared by the
/// loader and every synthesized command.
///
/// # Examples
///
/// ```
/// use tack_core::traits::{PluginExecutor, PluginInstance};
/// use tack_core::manifest::{CheckResult, Manifest};
/// use tack_core::Result;
/// use serde_json::{Map, Value};
///
/// #[derive(Debug)]
/// struct JsonExecutor;
///
/// #[derive(Debug)]
/// struct JsonInstance(Manifest);
///
/// impl PluginInstance for JsonInstance {
///     fn manifest(&self) -> &Manifest {
///         &self.0
///     }
///
///     fn check(&mut self, config: &Map<String, Value>) -> Result<CheckResult> {
///         Ok(CheckResult { data: config.clone(), ..CheckResult::default() })
///     }
/// }
///
/// impl PluginExecutor for JsonExecutor {
///     fn load(&self, bytes: &[u8]) -> Result<Box<dyn PluginInstance>> {
///         Ok(Box::new(JsonInstance(serde_json::from_slice(bytes)?)))
///     }
/// }
///
/// let instance = JsonExecutor.load(br#"{"name": "dns"}"#)?;
/// assert_eq!(instance.manifest().name, "dns");
/// # Ok::<(), tack_core::Error>(())
/// ```
pub trait PluginExecutor: Send + Sync + std::fmt::Debug {
    /// Loads a plugin and reads its manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid plugin, the manifest
    /// cannot be read, or the requested capabilities are refused.
    fn load(&self, bytes: &[u8]) -> Result<Box<dyn PluginInstance>>;
}

/// A loaded plugin.
///
/// Dropping the instance releases its runtime resources.
pub trait PluginInstance: Send + std::fmt::Debug {
    /// The manifest read at load time.
    fn manifest(&self) -> &Manifest;

    /// Runs one operation.
    ///
    /// `config` always carries `service` and `operation` plus the fields the
    /// user supplied.
    ///
    /// # Errors
    ///
    /// Returns an error if the plugin traps or returns an unreadable result.
    /// A plugin-reported failure is a successful call with a non-success
    /// [`CheckResult`].
    fn check(&mut self, config: &Map<String, Value>) -> Result<CheckResult>;
}
