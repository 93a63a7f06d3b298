//! Error types for the WASI processor.
//!
//! This module defines the failure taxonomy using `thiserror`:
//! - [`ProcessorError`]: every failure an invocation or the processor
//!   lifecycle can surface
//!
//! All variants except [`ProcessorError::Compilation`] are per-call: the
//! compiled module and engine remain valid and reusable after them. No
//! variant is retried internally; retry policy belongs to the embedding
//! host.

use std::io;

use thiserror::Error;

/// Failures surfaced by the processor.
#[derive(Error, Debug)]
pub enum ProcessorError {
    /// The module bytes are not a valid WebAssembly module.
    ///
    /// Fatal to construction; there is nothing to retry.
    #[error("Compilation failed: {reason}")]
    Compilation {
        /// Description of the compilation failure.
        reason: String,
    },

    /// The module could not be instantiated, e.g. it declares imports
    /// the sandbox does not provide.
    #[error("Instantiation failed: {reason}")]
    Instantiation {
        /// Description of the instantiation failure.
        reason: String,
    },

    /// Guest execution hit a runtime fault (out-of-bounds access,
    /// unreachable instruction, ...).
    #[error("Wasm trap: {message}")]
    Trapped {
        /// Description of the trap.
        message: String,
    },

    /// The guest explicitly exited with a failure code.
    #[error("Module exited with code {code}")]
    NonZeroExit {
        /// The exit code reported by the guest.
        code: i32,
    },

    /// The guest wrote to its stderr stream even though it terminated
    /// cleanly. Diagnostic output is a hard failure signal, not logging.
    #[error("Module wrote to stderr: {message}")]
    GuestError {
        /// The captured stderr contents.
        message: String,
    },

    /// Execution exhausted the configured fuel limit.
    #[error("Fuel exhausted: CPU limit exceeded")]
    FuelExhausted,

    /// Execution exceeded the configured timeout.
    #[error("Execution timeout after {duration_ms}ms")]
    ExecutionTimeout {
        /// The timeout duration in milliseconds.
        duration_ms: u64,
    },

    /// Invalid engine or processor configuration.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// Scratch-file or teardown I/O failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ProcessorError {
    /// Create a new `Compilation` error.
    pub fn compilation(reason: impl Into<String>) -> Self {
        Self::Compilation {
            reason: reason.into(),
        }
    }

    /// Create a new `Instantiation` error.
    pub fn instantiation(reason: impl Into<String>) -> Self {
        Self::Instantiation {
            reason: reason.into(),
        }
    }

    /// Create a new `Trapped` error.
    pub fn trapped(message: impl Into<String>) -> Self {
        Self::Trapped {
            message: message.into(),
        }
    }

    /// Create a new `GuestError` error.
    pub fn guest_error(message: impl Into<String>) -> Self {
        Self::GuestError {
            message: message.into(),
        }
    }

    /// Create a new `InvalidConfig` error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Returns `true` if the failure was signalled by the guest itself
    /// rather than by the host side of the sandbox.
    pub fn is_guest_failure(&self) -> bool {
        matches!(
            self,
            Self::Trapped { .. } | Self::NonZeroExit { .. } | Self::GuestError { .. }
        )
    }

    /// Returns `true` if this error aborts processor construction
    /// entirely. Every other variant leaves the processor reusable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Compilation { .. })
    }

    /// Returns `true` if a configured resource bound was hit.
    pub fn is_resource_limit(&self) -> bool {
        matches!(self, Self::FuelExhausted | Self::ExecutionTimeout { .. })
    }
}
