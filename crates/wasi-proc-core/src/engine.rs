//! Wasmtime engine configuration and creation.
//!
//! The [`WasmEngine`] is the foundation of the processor. It is:
//! - Thread-safe and shared across all invocations
//! - Configured for synchronous execution (each invocation blocks its
//!   thread until the guest terminates)
//! - Optionally set up with fuel metering for deterministic CPU limiting

use tracing::info;
use wasmtime::{Config, Engine, OptLevel};

use wasi_proc_common::{EngineConfig, ProcessorError};

/// Thread-safe WebAssembly engine wrapper.
///
/// This struct wraps a Wasmtime [`Engine`] shared by every invocation of
/// one processor. The engine holds compilation settings only; all
/// per-invocation state lives in a fresh [`wasmtime::Store`].
#[derive(Clone)]
pub struct WasmEngine {
    engine: Engine,
    config: EngineConfig,
}

impl WasmEngine {
    /// Create a new WebAssembly engine with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the Wasmtime configuration is invalid.
    pub fn new(config: &EngineConfig) -> Result<Self, ProcessorError> {
        let mut wasmtime_config = Config::new();

        // Fuel metering gives a deterministic per-invocation CPU bound
        wasmtime_config.consume_fuel(config.fuel_metering);

        // Bound the guest stack
        wasmtime_config.max_wasm_stack(config.max_stack_bytes);

        wasmtime_config.cranelift_opt_level(OptLevel::Speed);

        let engine = Engine::new(&wasmtime_config).map_err(|e| {
            ProcessorError::invalid_config(format!("Failed to create Wasmtime engine: {e}"))
        })?;

        info!(
            fuel_metering = config.fuel_metering,
            max_stack_bytes = config.max_stack_bytes,
            "Wasmtime engine initialized"
        );

        Ok(Self {
            engine,
            config: config.clone(),
        })
    }

    /// Get a reference to the inner Wasmtime engine.
    pub fn inner(&self) -> &Engine {
        &self.engine
    }

    /// Get the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl std::fmt::Debug for WasmEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmEngine")
            .field("fuel_metering", &self.config.fuel_metering)
            .field("max_stack_bytes", &self.config.max_stack_bytes)
            .finish_non_exhaustive()
    }
}
