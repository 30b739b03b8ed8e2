//! idscan - Identity document field extraction service
//!
//! Enhances a document photo, sends it to a vision-capable language model
//! and returns a fixed set of normalized fields over HTTP.

mod config;
mod extraction;
mod logging;
mod server;
mod storage;
mod vision;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::extraction::{ExtractionClient, ExtractionOrchestrator, InstructionTemplate, VisionModelClient};
use crate::server::AppState;
use crate::storage::ScratchDir;
use crate::vision::ImageEnhancer;

/// idscan - identity document extraction API
#[derive(Parser, Debug)]
#[command(name = "idscan")]
#[command(about = "Extract structured fields from identity document images")]
struct Args {
    /// Configuration file (defaults to <config dir>/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen address, e.g. 127.0.0.1:8080
    #[arg(short, long)]
    bind: Option<String>,

    /// Write the default configuration to this path and exit
    #[arg(long, value_name = "PATH")]
    write_default_config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(path) = &args.write_default_config {
        config::save_config(&AppConfig::default(), path)?;
        println!("Default configuration written to {}", path.display());
        return Ok(());
    }

    let (mut config, source, config_warning) = load_or_default_config(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    let _log_guard = logging::init(&config.logging)?;
    info!("idscan {} starting...", env!("CARGO_PKG_VERSION"));
    match source {
        Some(path) => info!("Loaded configuration from {:?}", path),
        None => info!("Using default configuration"),
    }
    if let Some(warning) = config_warning {
        warn!("{}", warning);
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(run(config))?;

    info!("idscan shutdown complete");
    Ok(())
}

async fn run(config: AppConfig) -> Result<()> {
    let scratch = ScratchDir::new(&config.storage.scratch_dir)?;
    info!("Scratch directory: {:?}", scratch.path());
    let template = InstructionTemplate::load(config.extraction.prompt_path.as_deref())?;
    info!("Instruction template: {}", template.version());

    let extractor = VisionModelClient::from_config(&config.extraction)
        .map(|client| Arc::new(client) as Arc<dyn ExtractionClient>);
    match &extractor {
        Ok(_) => info!("System initialization complete"),
        Err(e) => error!("Initialization failed: {} - extraction requests will be rejected", e),
    }

    let orchestrator = ExtractionOrchestrator::new(
        extractor,
        ImageEnhancer::new(config.enhancement.clone()),
        template,
        scratch,
    );

    server::serve(AppState::new(orchestrator, config.server)).await
}

type LoadedConfig = (AppConfig, Option<PathBuf>, Option<String>);

/// An explicit path must load. The default location falls back to defaults,
/// returning the reason so it can be logged once logging is up.
fn load_or_default_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let config = config::load_config(path)?;
        return Ok((config, Some(path.to_path_buf()), None));
    }

    let mut warning = None;
    if let Ok(config_dir) = storage::get_config_dir() {
        let config_path = config_dir.join("config.toml");
        if config_path.exists() {
            match config::load_config(&config_path) {
                Ok(config) => return Ok((config, Some(config_path), None)),
                Err(e) => warning = Some(format!("Ignoring unreadable config: {:#}", e)),
            }
        }
    }
    Ok((AppConfig::default(), None, warning))
}
