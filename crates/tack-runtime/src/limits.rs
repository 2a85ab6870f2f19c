//! Resource limits for plugin instances.
//!
//! # Examples
//!
//! ```
//! use tack_runtime::limits::RunnerOptions;
//!
//! let options = RunnerOptions::default().memory_limit_mb(32).max_fuel(1_000_000);
//! assert_eq!(options.memory_limit_bytes(), 32 * 1024 * 1024);
//! assert_eq!(options.fuel(), 1_000_000);
//! ```

/// Default linear memory cap per plugin instance.
pub const DEFAULT_MEMORY_LIMIT_MB: usize = 64;

/// Default fuel budget per plugin call.
pub const DEFAULT_MAX_FUEL: u64 = 5_000_000_000;

/// Limits applied to every plugin instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerOptions {
    memory_limit_mb: usize,
    max_fuel: u64,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            memory_limit_mb: DEFAULT_MEMORY_LIMIT_MB,
            max_fuel: DEFAULT_MAX_FUEL,
        }
    }
}

impl RunnerOptions {
    /// Sets the memory cap in MiB.
    #[must_use]
    pub const fn memory_limit_mb(mut self, mb: usize) -> Self {
        self.memory_limit_mb = mb;
        self
    }

    /// Sets the fuel budget granted before each call.
    #[must_use]
    pub const fn max_fuel(mut self, fuel: u64) -> Self {
        self.max_fuel = fuel;
        self
    }

    /// Memory cap in bytes.
    #[must_use]
    pub const fn memory_limit_bytes(&self) -> usize {
        self.memory_limit_mb * 1024 * 1024
    }

    /// Fuel budget per call.
    #[must_use]
    pub const fn fuel(&self) -> u64 {
        self.max_fuel
    }
}

/// Memory limiter for a plugin store.
#[derive(Debug)]
pub(crate) struct MemoryLimiter {
    pub(crate) max_memory_bytes: usize,
}

impl wasmtime::ResourceLimiter for MemoryLimiter {
    fn memory_growing(
        &mut self,
        current: usize,
        desired: usize,
        _maximum: Option<usize>,
    ) -> wasmtime::Result<bool> {
        if desired > self.max_memory_bytes {
            tracing::warn!(
                "Plugin memory limit exceeded: {} > {}",
                desired,
                self.max_memory_bytes
            );
            Ok(false)
        } else {
            tracing::trace!("Plugin memory growing: {} -> {} bytes", current, desired);
            Ok(true)
        }
    }

    fn table_growing(
        &mut self,
        _current: usize,
        _desired: usize,
        _maximum: Option<usize>,
    ) -> wasmtime::Result<bool> {
        Ok(true)
    }
}
