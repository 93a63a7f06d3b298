//! WebAssembly module compilation.
//!
//! This module provides [`CompiledModule`], a wrapper around Wasmtime's
//! [`Module`] that validates and compiles raw module bytes exactly once.
//! The resulting artifact is immutable and shared read-only across every
//! subsequent invocation — compilation is far more expensive than
//! instantiation, so compiling once per processor is the dominant
//! performance lever.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::Path;
use std::time::Instant;

use tracing::{debug, info, instrument};
use wasmtime::Module;

use crate::WasmEngine;
use wasi_proc_common::ProcessorError;

/// A compiled WebAssembly module.
///
/// # Thread Safety
///
/// `CompiledModule` is thread-safe and shared by all invocations of one
/// processor. The underlying Wasmtime module is also thread-safe.
#[derive(Clone)]
pub struct CompiledModule {
    inner: Module,
    content_hash: String,
}

impl CompiledModule {
    /// Compile a module from raw WebAssembly bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError::Compilation`] if the bytes are not a
    /// valid module for the engine.
    #[instrument(skip(engine, bytes), fields(bytes_len = bytes.len()))]
    pub fn from_bytes(engine: &WasmEngine, bytes: &[u8]) -> Result<Self, ProcessorError> {
        let start = Instant::now();

        Self::validate_wasm_header(bytes)?;

        let module = Module::new(engine.inner(), bytes)
            .map_err(|e| ProcessorError::compilation(format!("Module compilation failed: {e}")))?;

        let content_hash = compute_hash(bytes);

        info!(
            content_hash = %content_hash,
            duration_ms = start.elapsed().as_millis() as u64,
            "Module compiled"
        );

        Ok(Self {
            inner: module,
            content_hash,
        })
    }

    /// Compile a module loaded from a file on disk.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError::Io`] if the file cannot be read, or
    /// [`ProcessorError::Compilation`] if its contents are not a valid
    /// module.
    pub fn from_file(engine: &WasmEngine, path: impl AsRef<Path>) -> Result<Self, ProcessorError> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_bytes(engine, &bytes)
    }

    /// Compile a module from WAT (WebAssembly Text Format).
    ///
    /// This is primarily for testing purposes.
    #[instrument(skip(engine, wat))]
    pub fn from_wat(engine: &WasmEngine, wat: &str) -> Result<Self, ProcessorError> {
        let module = Module::new(engine.inner(), wat)
            .map_err(|e| ProcessorError::compilation(format!("WAT compilation failed: {e}")))?;

        let content_hash = compute_hash(wat.as_bytes());

        debug!(content_hash = %content_hash, "WAT module compiled");

        Ok(Self {
            inner: module,
            content_hash,
        })
    }

    /// Get the content hash of the original module bytes.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Get the inner Wasmtime module.
    pub(crate) fn inner(&self) -> &Module {
        &self.inner
    }

    /// Validate WebAssembly header (magic number).
    fn validate_wasm_header(bytes: &[u8]) -> Result<(), ProcessorError> {
        if bytes.len() < 8 {
            return Err(ProcessorError::compilation("Invalid Wasm: file too small"));
        }

        // Check magic number: \0asm
        if &bytes[0..4] != b"\0asm" {
            return Err(ProcessorError::compilation("Invalid Wasm: bad magic number"));
        }

        Ok(())
    }
}

impl std::fmt::Debug for CompiledModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledModule")
            .field("content_hash", &self.content_hash)
            .finish_non_exhaustive()
    }
}

/// Compute a hash of the given bytes.
fn compute_hash(bytes: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
