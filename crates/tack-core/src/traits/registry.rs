//! Remote registry trait.

use crate::Result;
use async_trait::async_trait;
use std::path::PathBuf;

/// Fetches plugins that exist in no local tier.
///
/// Transport and signature verification are the implementation's concern.
/// Callers bound the call with their own timeout.
///
/// # Examples
///
/// ```
/// use tack_core::traits::RegistryResolver;
/// use tack_core::{Error, Result};
/// use async_trait::async_trait;
/// use std::path::PathBuf;
///
/// #[derive(Debug)]
/// struct Offline;
///
/// #[async_trait]
/// impl RegistryResolver for Offline {
///     async fn resolve(&self, reference: &str) -> Result<PathBuf> {
///         Err(Error::RegistryFetch {
///             reference: reference.to_string(),
///             message: "offline".to_string(),
///         })
///     }
/// }
/// ```
#[async_trait]
pub trait RegistryResolver: Send + Sync + std::fmt::Debug {
    /// Fetches `reference` (e.g. `ghcr.io/org/plugins/dns:1.2.0`) and
    /// returns the local path of the fetched plugin binary.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RegistryFetch`](crate::Error::RegistryFetch) if the
    /// reference cannot be fetched.
    async fn resolve(&self, reference: &str) -> Result<PathBuf>;
}
