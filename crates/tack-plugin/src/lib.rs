//! Plugin discovery and resolution for tack.
//!
//! Finds plugins across the bundled, local-directory and registry tiers,
//! caches their manifests between runs, and hands out lazy byte loaders so
//! listing hundreds of plugins never keeps their binaries in memory.
//!
//! # Architecture
//!
//! ```text
//! BundledPlugins ─┐
//!                 ├─> Loader::discover_all ──> Vec<DiscoveredPlugin>
//! plugins dir ────┘        │
//!                          └─ DiscoveryCache (~/.tack/discovery_cache.json)
//!
//! Loader::load_by_name: local > local@version > bundled > registry
//! ```
//!
//! # Examples
//!
//! ```
//! use tack_plugin::cache::DiscoveryCache;
//!
//! let cache = DiscoveryCache::load(std::path::Path::new("/nonexistent/cache.json"));
//! assert!(cache.is_empty());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

pub mod bundled;
pub mod cache;
pub mod index;
pub mod loader;
pub mod source;

pub use bundled::BundledPlugins;
pub use cache::{CacheEntry, DiscoveryCache};
pub use loader::Loader;
pub use source::{ByteLoader, DiscoveredPlugin, SourceKind};
