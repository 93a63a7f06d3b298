//! Common types, errors, and configuration for wasi-proc.
//!
//! This crate provides shared functionality used across the wasi-proc
//! workspace:
//! - Error types using `thiserror` for type-safe error handling
//! - Configuration structures for processor settings
//! - TOML configuration file loading

pub mod config;
pub mod config_file;
pub mod error;

pub use config::{CaptureConfig, CaptureMode, EngineConfig, ExecutionConfig, ProcessorConfig};
pub use config_file::{ConfigFile, ConfigFileError, ModuleSource};
pub use error::ProcessorError;
