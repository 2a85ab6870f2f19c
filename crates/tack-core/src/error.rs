//! Error types for tack.
//!
//! A single error hierarchy shared by every library crate in the workspace.
//! The variants follow how failures are scoped: a failure tied to one plugin
//! or one source tier is reported through its own variant so callers can log
//! and skip it without aborting the rest of discovery.
//!
//! # Examples
//!
//! ```
//! use tack_core::{Error, Result};
//!
//! fn find(name: &str) -> Result<()> {
//!     Err(Error::NotFound {
//!         name: name.to_string(),
//!     })
//! }
//!
//! let err = find("dns").unwrap_err();
//! assert!(err.is_not_found());
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for tack.
#[derive(Error, Debug)]
pub enum Error {
    /// A plugin name resolved in no source tier.
    ///
    /// Fatal to the command that asked for the plugin, never to discovery.
    #[error("plugin not found: {name}")]
    NotFound {
        /// Name that was looked up
        name: String,
    },

    /// A manifest's config schema could not be interpreted.
    ///
    /// The plugin's command is still created; the error is reported when
    /// the command is invoked.
    #[error("invalid config schema for plugin '{plugin}': {message}")]
    SchemaError {
        /// Plugin whose schema failed to parse
        plugin: String,
        /// Description of the problem
        message: String,
    },

    /// The runtime failed to read a manifest from a candidate source.
    #[error("failed to load plugin from {}: {message}", source_path.display())]
    LoadError {
        /// Path or key of the candidate
        source_path: PathBuf,
        /// Description of the failure
        message: String,
    },

    /// A remote registry or index could not be reached or returned garbage.
    #[error("registry fetch failed for '{reference}': {message}")]
    RegistryFetch {
        /// Registry reference or index URL
        reference: String,
        /// Description of the failure
        message: String,
    },

    /// The plugin was loaded but its execution failed.
    #[error("plugin execution failed: {message}")]
    ExecutionError {
        /// Description of the failure
        message: String,
        /// Underlying error cause
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The grant collaborator refused the capabilities a plugin requested.
    #[error("capabilities denied for plugin '{plugin}'")]
    CapabilityDenied {
        /// Plugin that requested the capabilities
        plugin: String,
    },

    /// Configuration is invalid.
    #[error("configuration error: {message}")]
    ConfigError {
        /// Description of the configuration problem
        message: String,
    },

    /// Timeout error.
    #[error("operation timed out after {duration_secs}s: {operation}")]
    Timeout {
        /// Name of the operation that timed out
        operation: String,
        /// Duration in seconds before timeout occurred
        duration_secs: u64,
    },

    /// JSON or TOML conversion failed.
    #[error("serialization error: {message}")]
    SerializationError {
        /// Description of the serialization failure
        message: String,
        /// Underlying serde error
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Filesystem error.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Path involved in the failed operation
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Invalid argument error.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A user-supplied value failed validation.
    #[error("validation error in {field}: {reason}")]
    ValidationError {
        /// The field that failed validation
        field: String,
        /// Detailed reason for the validation failure
        reason: String,
    },
}

impl Error {
    /// Builds an [`Error::Io`] for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns `true` if this is a not-found error.
    ///
    /// # Examples
    ///
    /// ```
    /// use tack_core::Error;
    ///
    /// let err = Error::NotFound { name: "dns".to_string() };
    /// assert!(err.is_not_found());
    /// ```
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this is a schema error.
    #[must_use]
    pub const fn is_schema_error(&self) -> bool {
        matches!(self, Self::SchemaError { .. })
    }

    /// Returns `true` if this is a load error.
    #[must_use]
    pub const fn is_load_error(&self) -> bool {
        matches!(self, Self::LoadError { .. })
    }

    /// Returns `true` if this is a registry fetch error.
    #[must_use]
    pub const fn is_registry_error(&self) -> bool {
        matches!(self, Self::RegistryFetch { .. })
    }

    /// Returns `true` if this is a configuration error.
    ///
    /// # Examples
    ///
    /// ```
    /// use tack_core::Error;
    ///
    /// let err = Error::ConfigError {
    ///     message: "bad toml".to_string(),
    /// };
    /// assert!(err.is_config_error());
    /// ```
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigError { .. })
    }

    /// Returns `true` if this is a timeout error.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if this is a validation error.
    #[must_use]
    pub const fn is_validation_error(&self) -> bool {
        matches!(self, Self::ValidationError { .. })
    }

    /// Returns `true` if the grant collaborator refused the plugin.
    #[must_use]
    pub const fn is_capability_denied(&self) -> bool {
        matches!(self, Self::CapabilityDenied { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

/// Result type alias for tack operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = Error::NotFound {
            name: "dns".to_string(),
        };
        assert_eq!(err.to_string(), "plugin not found: dns");
        assert!(err.is_not_found());
        assert!(!err.is_load_error());
    }

    #[test]
    fn test_load_error_display_includes_path() {
        let err = Error::LoadError {
            source_path: PathBuf::from("/plugins/dns.wasm"),
            message: "bad magic".to_string(),
        };
        assert!(err.to_string().contains("/plugins/dns.wasm"));
        assert!(err.is_load_error());
    }

    #[test]
    fn test_from_serde_json() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = parse_err.into();
        assert!(matches!(err, Error::SerializationError { source: Some(_), .. }));
    }

    #[test]
    fn test_io_helper() {
        let err = Error::io(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("/tmp/x"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
