//! Processor lifecycle and per-payload execution.
//!
//! This module provides [`WasiProcessor`], which handles the complete
//! lifecycle of transforming payloads through a WASI module:
//!
//! 1. Compile the module and link the WASI imports once, at construction
//! 2. Per payload: build an isolated sandbox and a fresh store
//! 3. Instantiate and call the `_start` entry point exactly once
//! 4. Map the termination outcome and drain the captured stdout
//!
//! Instances are never pooled or reused across calls — isolation is
//! call-scoped, so no guest state leaks between payloads.

use std::path::Path;
use std::time::Instant;

use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;
use wasmtime::{Linker, Trap};
use wasmtime_wasi::I32Exit;
use wasmtime_wasi::preview1::{self, WasiP1Ctx};

use crate::capture::CaptureBackend;
use crate::sandbox::{InvocationSandbox, create_store};
use crate::{CompiledModule, WasmEngine};
use wasi_proc_common::{ProcessorConfig, ProcessorError};

/// Conventional WASI command entry point.
const ENTRY_POINT: &str = "_start";

/// Per-message WASI module processor.
///
/// Construction compiles the module and links the WASI imports exactly
/// once; every [`process`](Self::process) call then instantiates the
/// compiled artifact against a fresh, isolated store.
///
/// # Thread Safety
///
/// The processor is cheap to clone and safe to share across threads:
/// the engine, compiled module, and linker are read-only, and each
/// invocation owns its sinks (the file strategy allocates a unique
/// scratch path per call).
#[derive(Clone)]
pub struct WasiProcessor {
    engine: WasmEngine,
    module: CompiledModule,
    linker: Linker<WasiP1Ctx>,
    config: ProcessorConfig,
    capture: CaptureBackend,
}

impl WasiProcessor {
    /// Build a processor from raw module bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError::Compilation`] if the bytes are not a
    /// valid module; this is fatal to construction.
    pub fn new(wasm_bytes: &[u8], config: ProcessorConfig) -> Result<Self, ProcessorError> {
        let engine = WasmEngine::new(&config.engine)?;
        let module = CompiledModule::from_bytes(&engine, wasm_bytes)?;
        Self::with_module(engine, module, config)
    }

    /// Build a processor from a module file on disk.
    pub fn from_file(
        path: impl AsRef<Path>,
        config: ProcessorConfig,
    ) -> Result<Self, ProcessorError> {
        let engine = WasmEngine::new(&config.engine)?;
        let module = CompiledModule::from_file(&engine, path)?;
        Self::with_module(engine, module, config)
    }

    /// Build a processor from WAT text. Primarily for tests.
    pub fn from_wat(wat: &str, config: ProcessorConfig) -> Result<Self, ProcessorError> {
        let engine = WasmEngine::new(&config.engine)?;
        let module = CompiledModule::from_wat(&engine, wat)?;
        Self::with_module(engine, module, config)
    }

    fn with_module(
        engine: WasmEngine,
        module: CompiledModule,
        config: ProcessorConfig,
    ) -> Result<Self, ProcessorError> {
        let mut linker = Linker::new(engine.inner());
        preview1::add_to_linker_sync(&mut linker, |ctx: &mut WasiP1Ctx| ctx).map_err(|e| {
            ProcessorError::instantiation(format!("Failed to link WASI imports: {e}"))
        })?;

        let capture = CaptureBackend::from_config(&config.capture)?;

        info!(content_hash = %module.content_hash(), "Processor ready");

        Ok(Self {
            engine,
            module,
            linker,
            config,
            capture,
        })
    }

    /// Run the module once over `payload` and return the captured stdout.
    ///
    /// The blocking run is moved onto a dedicated worker thread. When
    /// `execution.timeout_ms` is set, the call returns
    /// [`ProcessorError::ExecutionTimeout`] after the deadline and
    /// detaches from the run — the guest is not interrupted; bound its
    /// CPU with fuel metering instead.
    ///
    /// Non-UTF-8 payload bytes are carried into `argv[1]` lossily.
    pub async fn process(&self, payload: &[u8]) -> Result<Vec<u8>, ProcessorError> {
        let this = self.clone();
        let payload = payload.to_vec();
        let handle = tokio::task::spawn_blocking(move || this.process_blocking(&payload));

        match self.config.execution.timeout() {
            Some(deadline) => match tokio::time::timeout(deadline, handle).await {
                Ok(joined) => joined.unwrap_or_else(|e| {
                    Err(ProcessorError::trapped(format!(
                        "Execution task failed: {e}"
                    )))
                }),
                Err(_) => {
                    let duration_ms = deadline.as_millis() as u64;
                    warn!(duration_ms, "Execution deadline elapsed, detaching from the run");
                    Err(ProcessorError::ExecutionTimeout { duration_ms })
                }
            },
            None => handle.await.unwrap_or_else(|e| {
                Err(ProcessorError::trapped(format!(
                    "Execution task failed: {e}"
                )))
            }),
        }
    }

    /// Synchronous variant of [`process`](Self::process); blocks the
    /// calling thread until the guest terminates.
    #[instrument(
        skip(self, payload),
        fields(invocation_id = %Uuid::new_v4(), payload_len = payload.len())
    )]
    pub fn process_blocking(&self, payload: &[u8]) -> Result<Vec<u8>, ProcessorError> {
        let start = Instant::now();

        let sandbox = InvocationSandbox::build(payload, &self.config.capture, &self.capture)?;
        let mut store = create_store(&self.engine, &self.config.execution, sandbox.wasi)?;

        let instance = self
            .linker
            .instantiate(&mut store, self.module.inner())
            .map_err(|e| {
                ProcessorError::instantiation(format!("Failed to instantiate module: {e}"))
            })?;

        let entry = instance
            .get_typed_func::<(), ()>(&mut store, ENTRY_POINT)
            .map_err(|e| {
                ProcessorError::instantiation(format!("Entry point '{ENTRY_POINT}' not found: {e}"))
            })?;

        match entry.call(&mut store, ()) {
            Ok(()) => {}
            Err(e) => {
                // Most guests leave _start through proc_exit rather than
                // returning; exit code 0 is a success
                if let Some(exit) = e.downcast_ref::<I32Exit>() {
                    if exit.0 != 0 {
                        debug!(code = exit.0, "Guest exited with failure code");
                        return Err(ProcessorError::NonZeroExit { code: exit.0 });
                    }
                } else if e
                    .downcast_ref::<Trap>()
                    .is_some_and(|t| *t == Trap::OutOfFuel)
                {
                    warn!(
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Execution terminated: fuel exhausted"
                    );
                    return Err(ProcessorError::FuelExhausted);
                } else {
                    error!(trap = %e, "Guest execution trapped");
                    return Err(ProcessorError::trapped(e.to_string()));
                }
            }
        }

        // Guest diagnostics on stderr fail the call even on a clean exit
        let err_bytes = sandbox.stderr.contents();
        if !err_bytes.is_empty() {
            return Err(ProcessorError::guest_error(
                String::from_utf8_lossy(&err_bytes).into_owned(),
            ));
        }

        let out = sandbox.stdout.drain()?;

        debug!(
            duration_us = start.elapsed().as_micros() as u64,
            output_len = out.len(),
            "Invocation complete"
        );

        Ok(out)
    }

    /// Release scratch resources held for the processor's lifetime.
    ///
    /// Idempotent: closing an already-closed processor is a no-op. The
    /// engine, module, and linker are released when the processor is
    /// dropped.
    pub fn close(&self) -> Result<(), ProcessorError> {
        self.capture.close()
    }

    /// Content hash of the compiled module, for logging and correlation.
    pub fn content_hash(&self) -> &str {
        self.module.content_hash()
    }
}

impl std::fmt::Debug for WasiProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasiProcessor")
            .field("content_hash", &self.module.content_hash())
            .field("capture", &self.config.capture.mode)
            .finish_non_exhaustive()
    }
}
