//! Plugins compiled into the binary.
//!
//! Bundled content is fixed at build time, so the discovery cache checks
//! bundled entries by size only.

use std::sync::Arc;

/// Key prefix for bundled sources in the discovery cache.
pub const BUNDLED_PREFIX: &str = "bundled://plugins/";

/// Plugins shipped inside the `tack` binary.
///
/// Release builds embed files with `include_bytes!` here; the default
/// build ships none.
const BUILTIN: &[(&str, &[u8])] = &[];

/// A set of bundled `.wasm` files keyed by file name.
///
/// # Examples
///
/// ```
/// use tack_plugin::BundledPlugins;
///
/// let bundled = BundledPlugins::default().with_file("dns.wasm", b"\0asm".to_vec());
/// assert!(bundled.get("dns.wasm").is_some());
/// assert_eq!(BundledPlugins::key("dns.wasm"), "bundled://plugins/dns.wasm");
/// ```
#[derive(Debug, Clone, Default)]
pub struct BundledPlugins {
    files: Vec<(String, Arc<[u8]>)>,
}

impl BundledPlugins {
    /// Plugins embedded at build time.
    #[must_use]
    pub fn builtin() -> Self {
        BUILTIN
            .iter()
            .fold(Self::default(), |set, (name, bytes)| set.with_file(*name, bytes.to_vec()))
    }

    /// Adds a file, replacing any with the same name.
    #[must_use]
    pub fn with_file(mut self, name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        self.files.retain(|(existing, _)| *existing != name);
        self.files.push((name, Arc::from(bytes)));
        self.files.sort_by(|a, b| a.0.cmp(&b.0));
        self
    }

    /// Bytes of `file_name`, if bundled.
    #[must_use]
    pub fn get(&self, file_name: &str) -> Option<Arc<[u8]>> {
        self.files
            .iter()
            .find(|(name, _)| name == file_name)
            .map(|(_, bytes)| Arc::clone(bytes))
    }

    /// Bundled `.wasm` files in file-name order.
    pub fn wasm_files(&self) -> impl Iterator<Item = (&str, &Arc<[u8]>)> {
        self.files
            .iter()
            .filter(|(name, _)| name.ends_with(".wasm"))
            .map(|(name, bytes)| (name.as_str(), bytes))
    }

    /// Cache key of a bundled file.
    #[must_use]
    pub fn key(file_name: &str) -> String {
        format!("{BUNDLED_PREFIX}{file_name}")
    }

    /// Returns `true` if nothing is bundled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_is_consistent() {
        let builtin = BundledPlugins::builtin();
        assert_eq!(builtin.wasm_files().count(), BUILTIN.len());
    }

    #[test]
    fn test_files_are_sorted_and_filtered() {
        let bundled = BundledPlugins::default()
            .with_file("zeta.wasm", vec![1])
            .with_file("README.md", vec![2])
            .with_file("alpha.wasm", vec![3]);
        let names: Vec<_> = bundled.wasm_files().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["alpha.wasm", "zeta.wasm"]);
    }

    #[test]
    fn test_with_file_replaces() {
        let bundled = BundledPlugins::default()
            .with_file("dns.wasm", vec![1])
            .with_file("dns.wasm", vec![1, 2]);
        assert_eq!(bundled.get("dns.wasm").unwrap().len(), 2);
        assert_eq!(bundled.wasm_files().count(), 1);
    }
}
