//! Configuration file structures for the WASI processor.
//!
//! This module defines structures for TOML configuration files:
//! - [`ConfigFile`]: Top-level configuration file structure
//! - [`ModuleSource`]: Where to load the WASI module from

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ProcessorConfig;

/// Top-level configuration file structure.
///
/// # Example
///
/// ```toml
/// [module]
/// path = "./transform.wasm"
///
/// [processor.engine]
/// fuel_metering = true
///
/// [processor.execution]
/// max_fuel = 10_000_000
///
/// [processor.capture]
/// mode = "file"
/// io_dir = "./scratch"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    /// Processor configuration (engine + execution + capture settings).
    #[serde(default)]
    pub processor: ProcessorConfig,

    /// The WASI module to execute.
    #[serde(default)]
    pub module: Option<ModuleSource>,
}

impl ConfigFile {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigFileError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed as TOML.
    pub fn from_toml(content: &str) -> Result<Self, ConfigFileError> {
        toml::from_str(content).map_err(|e| ConfigFileError::Parse {
            message: e.to_string(),
        })
    }
}

/// Where to load the WASI module from.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModuleSource {
    /// Path to the WebAssembly module file.
    pub path: String,
}

/// Configuration file errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("Failed to parse config file: {message}")]
    Parse { message: String },
}
