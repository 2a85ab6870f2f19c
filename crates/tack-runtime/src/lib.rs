//! WASM plugin runtime for tack.
//!
//! Implements the execution collaborator on top of wasmtime: plugins are
//! compiled, instantiated in an isolated store with a memory cap and a fuel
//! budget, and driven through a small JSON-over-linear-memory ABI (see
//! [`executor`]). Capability requests are routed to a [`CapabilityGate`].
//!
//! [`CapabilityGate`]: tack_core::traits::CapabilityGate

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

pub mod executor;
pub mod grant;
pub mod limits;

pub use executor::{WasmExecutor, WasmInstance};
pub use grant::{AutoTrustGate, InteractiveGate};
pub use limits::RunnerOptions;
