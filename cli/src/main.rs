//! `cmbridge` drives the cm compiler for an editor over JSON lines.
//!
//! stdin carries requests and stdout carries responses and events, so logs
//! only ever go to a file.

mod bridge;
mod protocol;

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Result;
use tokio::io::BufReader;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use cmbridge_config::{BridgeConfig, ConfigError, bridge_home};

fn init_tracing(default_level: Option<&str>) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level.unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // No log file: stay silent rather than corrupt the protocol stream.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.cmbridge/logs/cmbridge.log
    if let Some(home) = bridge_home() {
        candidates.push(home.join("logs").join("cmbridge.log"));
    }

    // Fallback: ./.cmbridge/logs/cmbridge.log
    candidates.push(PathBuf::from(".cmbridge").join("logs").join("cmbridge.log"));

    candidates
}

fn load_config() -> (BridgeConfig, Option<ConfigError>) {
    match BridgeConfig::load() {
        Ok(Some(config)) => (config, None),
        Ok(None) => (BridgeConfig::default(), None),
        Err(e) => (BridgeConfig::default(), Some(e)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let (config, config_error) = load_config();
    init_tracing(config.log_level());

    if let Some(e) = &config_error {
        tracing::warn!(path = %e.path().display(), "{e}; using defaults");
    }

    let compiler = config.compiler();
    tracing::info!(
        program = %compiler.program,
        cm_root = %compiler.cm_root.display(),
        "cmbridge starting"
    );

    let input = BufReader::new(tokio::io::stdin());
    bridge::serve(compiler, input, tokio::io::stdout()).await?;

    tracing::info!("cmbridge exiting");
    Ok(())
}
