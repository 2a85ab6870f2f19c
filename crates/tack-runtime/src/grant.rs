//! Capability gates.
//!
//! [`AutoTrustGate`] grants everything a plugin asks for (`--trust-plugins`).
//! [`InteractiveGate`] shows the request and asks the user once per load.

use dialoguer::Confirm;
use tack_core::manifest::Capabilities;
use tack_core::traits::CapabilityGate;
use tack_core::{Error, Result};

/// Grants every requested capability.
///
/// # Examples
///
/// ```
/// use tack_runtime::AutoTrustGate;
/// use tack_core::traits::CapabilityGate;
/// use tack_core::manifest::Capabilities;
///
/// let caps: Capabilities = serde_json::from_str(r#"{"network": {"hosts": ["*"]}}"#).unwrap();
/// assert_eq!(AutoTrustGate.grant("dns", &caps).unwrap(), caps);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoTrustGate;

impl CapabilityGate for AutoTrustGate {
    fn grant(&self, plugin: &str, required: &Capabilities) -> Result<Capabilities> {
        tracing::debug!(
            "Auto-granting {:?} to plugin {}",
            required.kinds(),
            plugin
        );
        Ok(required.clone())
    }
}

/// Asks the user on the terminal before granting.
///
/// A declined prompt, or a prompt that cannot be shown because stdin is not
/// a terminal, denies the plugin.
#[derive(Debug, Clone, Copy, Default)]
pub struct InteractiveGate;

impl InteractiveGate {
    fn describe(plugin: &str, required: &Capabilities) -> String {
        let detail = serde_json::to_string(&required.0).unwrap_or_default();
        format!(
            "Plugin '{plugin}' requests {} access: {detail}. Allow?",
            required.kinds().join(", ")
        )
    }
}

impl CapabilityGate for InteractiveGate {
    fn grant(&self, plugin: &str, required: &Capabilities) -> Result<Capabilities> {
        if required.is_empty() {
            return Ok(Capabilities::default());
        }

        let confirmed = Confirm::new()
            .with_prompt(Self::describe(plugin, required))
            .default(false)
            .interact()
            .unwrap_or_else(|e| {
                tracing::warn!("Cannot prompt for capability grant: {}", e);
                false
            });

        if confirmed {
            Ok(required.clone())
        } else {
            Err(Error::CapabilityDenied {
                plugin: plugin.to_string(),
            })
        }
    }
}
