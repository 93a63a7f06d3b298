//! Core Wasmtime execution engine for wasi-proc.
//!
//! This crate provides the fundamental per-message WASI execution
//! capabilities:
//! - [`WasmEngine`]: Configured Wasmtime engine shared across invocations
//! - [`CompiledModule`]: Compiled WebAssembly module wrapper
//! - [`WasiProcessor`]: Per-payload execution with call-scoped isolation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │               WasmEngine + CompiledModule               │
//! │  (Compiled once, shared read-only, thread-safe)         │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │          InvocationSandbox + Store<WasiP1Ctx>           │
//! │  (Per payload, isolated)                                │
//! │  - argv = [program-name, payload]                       │
//! │  - fresh stdout/stderr sinks                            │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                    OutputSink::drain                    │
//! │  (Captured stdout becomes the result payload)           │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod capture;
pub mod engine;
pub mod module;
pub mod processor;
pub mod sandbox;

pub use capture::ScratchState;
pub use engine::WasmEngine;
pub use module::CompiledModule;
pub use processor::WasiProcessor;
pub use sandbox::PROGRAM_NAME;
