//! Plugin manifest and check-result types.
//!
//! A manifest is the declarative description a plugin returns from its
//! `manifest` export. It is untrusted input: every collection defaults to
//! empty so a sparse manifest still deserializes.
//!
//! # Examples
//!
//! ```
//! use tack_core::manifest::Manifest;
//!
//! let manifest: Manifest = serde_json::from_str(r#"{
//!     "name": "dns",
//!     "version": "1.0.0",
//!     "services": {
//!         "dns": {
//!             "name": "dns",
//!             "operations": [{ "name": "resolve", "input_fields": ["hostname"] }]
//!         }
//!     }
//! }"#)?;
//!
//! assert_eq!(manifest.name, "dns");
//! assert_eq!(manifest.operation_count(), 1);
//! # Ok::<(), serde_json::Error>(())
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Declarative description of a plugin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Plugin name; becomes the plugin's command name.
    pub name: String,
    /// Plugin version string.
    #[serde(default)]
    pub version: String,
    /// One-line description shown in help.
    #[serde(default)]
    pub description: String,
    /// Services keyed by name.
    #[serde(default)]
    pub services: BTreeMap<String, ServiceManifest>,
    /// JSON Schema describing every input field the plugin accepts.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub config_schema: Value,
    /// Capabilities the plugin requests from the host.
    #[serde(default, skip_serializing_if = "Capabilities::is_empty")]
    pub capabilities: Capabilities,
}

impl Manifest {
    /// Total number of operations across all services.
    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.services.values().map(|s| s.operations.len()).sum()
    }
}

/// A named grouping of operations inside a plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceManifest {
    /// Service name.
    #[serde(default)]
    pub name: String,
    /// Service description.
    #[serde(default)]
    pub description: String,
    /// Operations in declaration order.
    #[serde(default)]
    pub operations: Vec<OperationManifest>,
}

/// A single invocable action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationManifest {
    /// Operation name; becomes the leaf command name.
    pub name: String,
    /// Operation description.
    #[serde(default)]
    pub description: String,
    /// Schema properties this operation accepts. Empty means all of them.
    #[serde(default)]
    pub input_fields: Vec<String>,
    /// Schema of the `data` object in a successful result.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub output_schema: Value,
    /// Example invocations rendered into help text.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<OperationExample>,
}

/// Example input for an operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationExample {
    /// Short example name.
    #[serde(default)]
    pub name: String,
    /// What the example demonstrates.
    #[serde(default)]
    pub description: String,
    /// Input object; keys are schema field names.
    #[serde(default)]
    pub input: Value,
    /// Set when the example demonstrates a failure. Such examples are
    /// excluded from help.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_error: Option<String>,
}

impl OperationExample {
    /// Returns `true` if this example demonstrates an error.
    #[must_use]
    pub fn is_error_example(&self) -> bool {
        self.expected_error.as_deref().is_some_and(|e| !e.is_empty())
    }
}

/// Capabilities requested by a plugin.
///
/// Opaque to discovery and synthesis. Only the grant collaborator looks
/// inside.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capabilities(pub Map<String, Value>);

impl Capabilities {
    /// Returns `true` if no capability is requested.
    ///
    /// Keys whose value is `null` or an empty container do not count.
    ///
    /// # Examples
    ///
    /// ```
    /// use tack_core::manifest::Capabilities;
    ///
    /// let caps: Capabilities = serde_json::from_str(r#"{"network": null}"#).unwrap();
    /// assert!(caps.is_empty());
    ///
    /// let caps: Capabilities = serde_json::from_str(r#"{"network": {"hosts": ["*"]}}"#).unwrap();
    /// assert!(!caps.is_empty());
    /// ```
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.values().all(|v| match v {
            Value::Null => true,
            Value::Object(m) => m.is_empty(),
            Value::Array(a) => a.is_empty(),
            _ => false,
        })
    }

    /// Names of the requested capability kinds, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self
            .0
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, _)| k.as_str())
            .collect();
        kinds.sort_unstable();
        kinds
    }
}

/// Outcome status reported by a plugin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    /// The operation succeeded.
    #[default]
    Success,
    /// The operation ran but its check did not pass.
    Failure,
    /// The operation could not run.
    Error,
}

impl CheckStatus {
    /// Lowercase name of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Error => "error",
        }
    }
}

/// Result returned by a plugin's `check` export.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Outcome status.
    #[serde(default)]
    pub status: CheckStatus,
    /// Optional human-readable message.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    /// Operation-specific output.
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Structured error details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResultError>,
}

impl CheckResult {
    /// Returns `true` if the status is success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == CheckStatus::Success
    }

    /// Returns `true` if the status is error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status == CheckStatus::Error
    }
}

/// Structured error details inside a [`CheckResult`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultError {
    /// Error message.
    pub message: String,
    /// Error category.
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub kind: String,
    /// Machine-readable error code.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub code: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sparse_manifest_deserializes() {
        let manifest: Manifest = serde_json::from_value(json!({ "name": "bare" })).unwrap();
        assert_eq!(manifest.name, "bare");
        assert!(manifest.services.is_empty());
        assert!(manifest.config_schema.is_null());
        assert!(manifest.capabilities.is_empty());
    }

    #[test]
    fn test_services_are_ordered() {
        let manifest: Manifest = serde_json::from_value(json!({
            "name": "aws",
            "services": { "s3": {"name": "s3"}, "ec2": {"name": "ec2"} }
        }))
        .unwrap();
        let names: Vec<_> = manifest.services.keys().cloned().collect();
        assert_eq!(names, vec!["ec2", "s3"]);
    }

    #[test]
    fn test_error_example_detection() {
        let ok = OperationExample::default();
        assert!(!ok.is_error_example());

        let empty = OperationExample {
            expected_error: Some(String::new()),
            ..Default::default()
        };
        assert!(!empty.is_error_example());

        let err = OperationExample {
            expected_error: Some("timeout".to_string()),
            ..Default::default()
        };
        assert!(err.is_error_example());
    }

    #[test]
    fn test_check_result_status() {
        let result: CheckResult = serde_json::from_value(json!({
            "status": "error",
            "error": { "message": "boom", "type": "network", "code": "E1" }
        }))
        .unwrap();
        assert!(result.is_error());
        assert!(!result.is_success());
        let err = result.error.unwrap();
        assert_eq!(err.kind, "network");
        assert_eq!(err.code, "E1");
    }

    #[test]
    fn test_capability_kinds_sorted() {
        let caps: Capabilities = serde_json::from_value(json!({
            "network": {"hosts": ["*"]},
            "fs": {"read": ["/tmp"]},
            "env": null
        }))
        .unwrap();
        assert_eq!(caps.kinds(), vec!["fs", "network"]);
    }
}
