//! WASI processor CLI entry point.
//!
//! Reads one payload from stdin, runs it through the configured WASI
//! module, and writes the transformed payload to stdout. Logs go to
//! stderr so the result stream stays clean.

use std::io::{Read, Write};

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wasi_proc_common::ConfigFile;
use wasi_proc_core::WasiProcessor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,wasi_proc=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting WASI processor");

    // Load configuration
    let config = match std::env::args().nth(1) {
        Some(path) => ConfigFile::from_file(&path)
            .with_context(|| format!("Failed to load config from '{path}'"))?,
        None => ConfigFile::default(),
    };

    let module_path = config
        .module
        .as_ref()
        .map(|m| m.path.clone())
        .or_else(|| std::env::var("WASI_PROC_MODULE").ok())
        .context(
            "No module configured. Set [module] path in the config file or WASI_PROC_MODULE",
        )?;

    info!(module = %module_path, "Loading WASI module");

    let processor = WasiProcessor::from_file(&module_path, config.processor)?;

    let mut payload = Vec::new();
    std::io::stdin()
        .read_to_end(&mut payload)
        .context("Failed to read payload from stdin")?;

    let result = processor.process(&payload).await?;

    std::io::stdout().write_all(&result)?;
    processor.close()?;

    Ok(())
}
