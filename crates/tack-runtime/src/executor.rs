//! Wasmtime plugin executor.
//!
//! # Plugin ABI
//!
//! A plugin is a core WebAssembly module exporting:
//!
//! | export     | signature              | purpose                               |
//! |------------|------------------------|---------------------------------------|
//! | `memory`   | linear memory          | shared buffer for JSON documents      |
//! | `alloc`    | `(len: i32) -> i32`    | reserve `len` bytes for host input    |
//! | `manifest` | `() -> i64`            | manifest JSON                         |
//! | `check`    | `(ptr, len: i32) -> i64` | run one operation on a config JSON  |
//!
//! Returned `i64` values pack a guest pointer and a length as
//! `(ptr << 32) | len`. Plugins may import `env.host_log(ptr, len)` to emit
//! a UTF-8 log line through the host's tracing subscriber.
//!
//! # Examples
//!
//! ```no_run
//! use tack_runtime::{AutoTrustGate, WasmExecutor};
//! use tack_core::traits::PluginExecutor;
//! use std::sync::Arc;
//!
//! # fn example(bytes: &[u8]) -> tack_core::Result<()> {
//! let executor = WasmExecutor::new()?.with_gate(Arc::new(AutoTrustGate));
//! let mut instance = executor.load(bytes)?;
//! println!("{}", instance.manifest().name);
//! # Ok(())
//! # }
//! ```

use crate::limits::{MemoryLimiter, RunnerOptions};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tack_core::manifest::{Capabilities, CheckResult, Manifest};
use tack_core::traits::{CapabilityGate, PluginExecutor, PluginInstance};
use tack_core::{Error, Result};
use wasmtime::{Caller, Config, Engine, Extern, Instance, Linker, Memory, Module, Store, TypedFunc};

/// Store data for one plugin instance.
struct StoreData {
    limiter: MemoryLimiter,
}

/// Loads plugins into fresh wasmtime stores.
///
/// Each [`PluginExecutor::load`] compiles the module, instantiates it in its
/// own store, reads the manifest, and asks the configured
/// [`CapabilityGate`] for the requested capabilities. Without a gate no
/// grant is requested, which is how discovery reads manifests silently.
#[derive(Clone)]
pub struct WasmExecutor {
    engine: Engine,
    options: RunnerOptions,
    gate: Option<Arc<dyn CapabilityGate>>,
}

impl fmt::Debug for WasmExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WasmExecutor")
            .field("options", &self.options)
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

impl WasmExecutor {
    /// Creates an executor with default limits and no gate.
    ///
    /// # Errors
    ///
    /// Returns an error if the wasmtime engine cannot be created.
    pub fn new() -> Result<Self> {
        Self::with_options(RunnerOptions::default())
    }

    /// Creates an executor with explicit limits.
    ///
    /// # Errors
    ///
    /// Returns an error if the wasmtime engine cannot be created.
    pub fn with_options(options: RunnerOptions) -> Result<Self> {
        let mut config = Config::new();
        config.consume_fuel(true);

        let engine = Engine::new(&config).map_err(|e| execution_error("failed to create WASM engine", &e))?;

        Ok(Self {
            engine,
            options,
            gate: None,
        })
    }

    /// Requests capability grants through `gate` on every load.
    #[must_use]
    pub fn with_gate(mut self, gate: Arc<dyn CapabilityGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    fn new_store(&self) -> Result<Store<StoreData>> {
        let mut store = Store::new(
            &self.engine,
            StoreData {
                limiter: MemoryLimiter {
                    max_memory_bytes: self.options.memory_limit_bytes(),
                },
            },
        );
        store.limiter(|data| &mut data.limiter);
        refuel(&mut store, self.options.fuel())?;
        Ok(store)
    }

    fn link_host_functions(&self) -> Result<Linker<StoreData>> {
        let mut linker = Linker::new(&self.engine);

        linker
            .func_wrap(
                "env",
                "host_log",
                |mut caller: Caller<'_, StoreData>, ptr: i32, len: i32| {
                    let Some(Extern::Memory(mem)) = caller.get_export("memory") else {
                        tracing::error!("Plugin has no memory export");
                        return;
                    };
                    match read_guest(mem.data(&caller), ptr, len) {
                        Ok(bytes) => match std::str::from_utf8(bytes) {
                            Ok(s) => tracing::info!("[plugin] {}", s),
                            Err(e) => tracing::error!("Invalid UTF-8 from plugin: {}", e),
                        },
                        Err(e) => tracing::error!("{}", e),
                    }
                },
            )
            .map_err(|e| execution_error("failed to link host_log", &e))?;

        Ok(linker)
    }
}

impl PluginExecutor for WasmExecutor {
    fn load(&self, bytes: &[u8]) -> Result<Box<dyn PluginInstance>> {
        tracing::debug!("Compiling plugin module ({} bytes)", bytes.len());
        let module = Module::new(&self.engine, bytes)
            .map_err(|e| execution_error("failed to compile plugin", &e))?;

        let mut store = self.new_store()?;
        let linker = self.link_host_functions()?;
        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(|e| execution_error("failed to instantiate plugin", &e))?;

        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| Error::ExecutionError {
                message: "plugin does not export memory".to_string(),
                source: None,
            })?;
        let manifest_fn: TypedFunc<(), i64> = typed_export(&instance, &mut store, "manifest")?;

        let packed = manifest_fn
            .call(&mut store, ())
            .map_err(|e| execution_error("manifest call failed", &e))?;
        let manifest: Manifest = serde_json::from_slice(read_packed(&memory, &store, packed)?)?;

        let granted = match &self.gate {
            Some(gate) if !manifest.capabilities.is_empty() => {
                gate.grant(&manifest.name, &manifest.capabilities)?
            }
            _ => Capabilities::default(),
        };

        tracing::debug!(
            "Loaded plugin {} v{} ({} operations)",
            manifest.name,
            manifest.version,
            manifest.operation_count()
        );

        Ok(Box::new(WasmInstance {
            store,
            instance,
            memory,
            manifest,
            granted,
            fuel: self.options.fuel(),
        }))
    }
}

/// A loaded plugin; dropping it releases the store.
pub struct WasmInstance {
    store: Store<StoreData>,
    instance: Instance,
    memory: Memory,
    manifest: Manifest,
    granted: Capabilities,
    fuel: u64,
}

impl fmt::Debug for WasmInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WasmInstance")
            .field("plugin", &self.manifest.name)
            .field("granted", &self.granted)
            .finish_non_exhaustive()
    }
}

impl WasmInstance {
    /// Capabilities granted at load time.
    #[must_use]
    pub const fn granted(&self) -> &Capabilities {
        &self.granted
    }
}

impl PluginInstance for WasmInstance {
    fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    fn check(&mut self, config: &Map<String, Value>) -> Result<CheckResult> {
        let input = serde_json::to_vec(config)?;
        let len = i32::try_from(input.len())
            .map_err(|_| Error::InvalidArgument("plugin config too large".to_string()))?;

        refuel(&mut self.store, self.fuel)?;

        let alloc: TypedFunc<i32, i32> = typed_export(&self.instance, &mut self.store, "alloc")?;
        let check: TypedFunc<(i32, i32), i64> = typed_export(&self.instance, &mut self.store, "check")?;

        let ptr = alloc
            .call(&mut self.store, len)
            .map_err(|e| execution_error("alloc call failed", &e))?;
        let offset = usize::try_from(ptr).map_err(|_| Error::ExecutionError {
            message: format!("plugin returned invalid pointer {ptr}"),
            source: None,
        })?;
        self.memory
            .write(&mut self.store, offset, &input)
            .map_err(|e| execution_error("failed to write plugin config", &e))?;

        tracing::debug!(
            "Calling {}.check with {} bytes of config",
            self.manifest.name,
            input.len()
        );
        let packed = check
            .call(&mut self.store, (ptr, len))
            .map_err(|e| execution_error("check call failed", &e))?;

        let result = serde_json::from_slice(read_packed(&self.memory, &self.store, packed)?)?;
        Ok(result)
    }
}

fn typed_export<Params, Results>(
    instance: &Instance,
    store: &mut Store<StoreData>,
    name: &str,
) -> Result<TypedFunc<Params, Results>>
where
    Params: wasmtime::WasmParams,
    Results: wasmtime::WasmResults,
{
    instance
        .get_typed_func::<Params, Results>(store, name)
        .map_err(|e| execution_error(&format!("plugin export '{name}' missing or mistyped"), &e))
}

fn refuel(store: &mut Store<StoreData>, fuel: u64) -> Result<()> {
    store
        .set_fuel(fuel)
        .map_err(|e| execution_error("failed to set fuel", &e))
}

/// Splits `(ptr << 32) | len` and borrows that range of guest memory.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]
fn read_packed<'a>(memory: &Memory, store: &'a Store<StoreData>, packed: i64) -> Result<&'a [u8]> {
    let bits = packed as u64;
    let (ptr, len) = ((bits >> 32) as u32, (bits & 0xffff_ffff) as u32);
    read_guest(memory.data(store), ptr as i32, len as i32)
}

fn read_guest(data: &[u8], ptr: i32, len: i32) -> Result<&[u8]> {
    let out_of_bounds = || Error::ExecutionError {
        message: format!("invalid plugin memory access: ptr={ptr}, len={len}"),
        source: None,
    };
    let start = u32::try_from(ptr).map_err(|_| out_of_bounds())? as usize;
    let len = u32::try_from(len).map_err(|_| out_of_bounds())? as usize;
    let end = start.checked_add(len).ok_or_else(out_of_bounds)?;
    data.get(start..end).ok_or_else(out_of_bounds)
}

fn execution_error(context: &str, err: &dyn fmt::Display) -> Error {
    Error::ExecutionError {
        message: format!("{context}: {err}"),
        source: None,
    }
}
