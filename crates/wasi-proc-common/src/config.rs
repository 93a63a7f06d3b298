//! Configuration structures for the WASI processor.
//!
//! This module defines configuration options for the processor components:
//! - [`ProcessorConfig`]: Top-level configuration containing all settings
//! - [`EngineConfig`]: Wasmtime engine settings (fuel metering, stack cap)
//! - [`ExecutionConfig`]: Per-invocation limits (fuel budget, timeout)
//! - [`CaptureConfig`]: Output capture strategy and its bounds

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level processor configuration.
///
/// This structure contains all configuration options for one processor
/// instance. It can be loaded from files (TOML) or built in code.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProcessorConfig {
    /// Wasmtime engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Per-invocation execution configuration.
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Output capture configuration.
    #[serde(default)]
    pub capture: CaptureConfig,
}

/// Wasmtime engine configuration.
///
/// These settings affect the shared engine and are fixed for the life of
/// the processor.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Enable fuel metering.
    ///
    /// When enabled, each invocation is limited to
    /// [`ExecutionConfig::max_fuel`] instructions; exceeding the budget
    /// fails the call. Disabled by default: the guest runs to completion
    /// or trap.
    #[serde(default = "defaults::fuel_metering")]
    pub fuel_metering: bool,

    /// Maximum Wasm stack size in bytes.
    #[serde(default = "defaults::max_stack_bytes")]
    pub max_stack_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fuel_metering: defaults::fuel_metering(),
            max_stack_bytes: defaults::max_stack_bytes(),
        }
    }
}

/// Per-invocation execution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// Maximum fuel (instructions) per invocation.
    ///
    /// Only effective when [`EngineConfig::fuel_metering`] is enabled.
    #[serde(default = "defaults::max_fuel")]
    pub max_fuel: u64,

    /// Optional host-enforced timeout in milliseconds.
    ///
    /// When set, an async `process` call returns a timeout error after
    /// this duration and detaches from the run; the guest itself is not
    /// interrupted. Use fuel metering to bound guest CPU.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_fuel: defaults::max_fuel(),
            timeout_ms: None,
        }
    }
}

impl ExecutionConfig {
    /// Get the timeout as a `Duration`, if one is configured.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Stdout capture strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// In-memory capture; a fresh buffer per invocation. Default.
    #[default]
    Buffered,
    /// File-redirected capture; one scratch file per invocation inside
    /// the scratch directory.
    File,
}

/// Output capture configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptureConfig {
    /// Capture strategy, selected at construction time.
    #[serde(default)]
    pub mode: CaptureMode,

    /// Scratch directory for file-redirected capture.
    ///
    /// When omitted, a fresh temporary directory is created and removed
    /// at close. A caller-supplied directory is never deleted and must
    /// remain a valid writable directory for the processor's lifetime.
    #[serde(default)]
    pub io_dir: Option<PathBuf>,

    /// Maximum bytes of stdout captured per invocation (buffered mode).
    #[serde(default = "defaults::max_output_bytes")]
    pub max_output_bytes: usize,

    /// Maximum bytes of stderr captured per invocation.
    #[serde(default = "defaults::max_stderr_bytes")]
    pub max_stderr_bytes: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            mode: CaptureMode::default(),
            io_dir: None,
            max_output_bytes: defaults::max_output_bytes(),
            max_stderr_bytes: defaults::max_stderr_bytes(),
        }
    }
}

/// Default value functions for serde.
mod defaults {
    pub const fn fuel_metering() -> bool {
        false
    }

    pub const fn max_stack_bytes() -> usize {
        1024 * 1024
    }

    pub const fn max_fuel() -> u64 {
        10_000_000
    }

    pub const fn max_output_bytes() -> usize {
        4 * 1024 * 1024
    }

    pub const fn max_stderr_bytes() -> usize {
        256 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProcessorConfig::default();

        assert!(!config.engine.fuel_metering);
        assert_eq!(config.engine.max_stack_bytes, 1024 * 1024);

        assert_eq!(config.execution.max_fuel, 10_000_000);
        assert!(config.execution.timeout_ms.is_none());

        assert_eq!(config.capture.mode, CaptureMode::Buffered);
        assert!(config.capture.io_dir.is_none());
        assert_eq!(config.capture.max_output_bytes, 4 * 1024 * 1024);
        assert_eq!(config.capture.max_stderr_bytes, 256 * 1024);
    }

    #[test]
    fn test_config_serialization() {
        let config = ProcessorConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: ProcessorConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(config.execution.max_fuel, deserialized.execution.max_fuel);
        assert_eq!(config.capture.mode, deserialized.capture.mode);
    }

    #[test]
    fn test_capture_mode_names() {
        let mode: CaptureMode = serde_json::from_str(r#""buffered""#).unwrap();
        assert_eq!(mode, CaptureMode::Buffered);

        let mode: CaptureMode = serde_json::from_str(r#""file""#).unwrap();
        assert_eq!(mode, CaptureMode::File);
    }

    #[test]
    fn test_execution_timeout() {
        let config = ExecutionConfig {
            timeout_ms: Some(500),
            ..Default::default()
        };
        assert_eq!(config.timeout(), Some(Duration::from_millis(500)));

        let config = ExecutionConfig::default();
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn test_partial_deserialization() {
        let json = r#"{"capture": {"mode": "file"}}"#;
        let config: ProcessorConfig = serde_json::from_str(json).unwrap();

        // Explicitly set value
        assert_eq!(config.capture.mode, CaptureMode::File);
        // Default values for unspecified fields
        assert_eq!(config.capture.max_output_bytes, 4 * 1024 * 1024);
        assert_eq!(config.execution.max_fuel, 10_000_000);
    }
}
