//! Per-invocation sandbox construction.
//!
//! Each invocation gets a fresh, isolated execution context: a
//! two-element argument vector carrying the payload, standard-stream
//! sinks, and a new [`Store`]. The guest is granted no filesystem or
//! network capability; argv and the standard streams are its entire
//! surface.

use wasmtime::Store;
use wasmtime_wasi::WasiCtxBuilder;
use wasmtime_wasi::pipe::MemoryOutputPipe;
use wasmtime_wasi::preview1::WasiP1Ctx;

use crate::WasmEngine;
use crate::capture::{CaptureBackend, FileCapture, OutputSink};
use wasi_proc_common::{CaptureConfig, ExecutionConfig, ProcessorError};

/// Fixed `argv[0]` handed to every guest invocation.
pub const PROGRAM_NAME: &str = "wasi_proc";

/// Per-invocation execution context.
///
/// Owns the WASI context, the stdout sink, and the stderr pipe for
/// exactly one run. Never shared or reused across invocations.
pub(crate) struct InvocationSandbox {
    pub wasi: WasiP1Ctx,
    pub stdout: OutputSink,
    pub stderr: MemoryOutputPipe,
}

impl InvocationSandbox {
    /// Build the isolated context for one payload.
    ///
    /// The payload is encoded as text and becomes `argv[1]`; malformed
    /// UTF-8 is carried through lossily. The guest, not the host,
    /// decides how to interpret it.
    pub fn build(
        payload: &[u8],
        config: &CaptureConfig,
        backend: &CaptureBackend,
    ) -> Result<Self, ProcessorError> {
        let payload_text = String::from_utf8_lossy(payload);
        let stderr = MemoryOutputPipe::new(config.max_stderr_bytes);

        let mut builder = WasiCtxBuilder::new();
        builder.args(&[PROGRAM_NAME, payload_text.as_ref()]);
        builder.stderr(stderr.clone());

        let stdout = match backend {
            CaptureBackend::Buffered => {
                let pipe = MemoryOutputPipe::new(config.max_output_bytes);
                builder.stdout(pipe.clone());
                OutputSink::Buffered(pipe)
            }
            CaptureBackend::File(state) => {
                let scratch = state.allocate();
                builder.stdout(FileCapture::new(scratch.truncate()?));
                OutputSink::File(scratch)
            }
        };

        Ok(Self {
            wasi: builder.build_p1(),
            stdout,
            stderr,
        })
    }
}

/// Create a fresh store bound to one invocation's WASI context.
///
/// Fuel is set only when the engine was built with metering enabled.
pub(crate) fn create_store(
    engine: &WasmEngine,
    config: &ExecutionConfig,
    wasi: WasiP1Ctx,
) -> Result<Store<WasiP1Ctx>, ProcessorError> {
    let mut store = Store::new(engine.inner(), wasi);

    if engine.config().fuel_metering {
        store
            .set_fuel(config.max_fuel)
            .map_err(|e| ProcessorError::invalid_config(format!("Failed to set fuel: {e}")))?;
    }

    Ok(store)
}
