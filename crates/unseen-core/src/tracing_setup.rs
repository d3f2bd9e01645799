use std::fs::OpenOptions;
use std::str::FromStr;

use anyhow::{Context, Result};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer};

const SERVICE_NAME: &str = "unseen";

/// Stderr logging at `UNSEEN_LOG` (default INFO), plus a DEBUG file layer
/// when `UNSEEN_LOG_FILE` names a path.
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing() -> Result<()> {
    let level = std::env::var("UNSEEN_LOG")
        .ok()
        .and_then(|raw| LevelFilter::from_str(&raw).ok())
        .unwrap_or(LevelFilter::INFO);
    let file_logging = std::env::var("UNSEEN_LOG_FILE").ok();

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(level);

    let registry = tracing_subscriber::registry().with(stderr_layer);

    if let Some(log_path) = file_logging {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("Failed to open log file: {}", log_path))?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_filter(LevelFilter::DEBUG);

        registry
            .with(file_layer)
            .try_init()
            .context("Failed to install tracing subscriber")?;
        tracing::info!(service = SERVICE_NAME, path = %log_path, "file logging enabled");
    } else {
        registry
            .try_init()
            .context("Failed to install tracing subscriber")?;
    }

    tracing::debug!(service = SERVICE_NAME, %level, "tracing initialised");
    Ok(())
}
