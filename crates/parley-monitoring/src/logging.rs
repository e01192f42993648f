//! Structured logging through `tracing`.

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

use crate::{LogFormat, MonitoringConfig};

/// Filter from `RUST_LOG`, falling back to the configured directives
fn env_filter(fallback: &str) -> anyhow::Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(fallback)
            .with_context(|| format!("Invalid log filter: {}", fallback)),
    }
}

/// Install the global subscriber for a node process
pub fn init_logging(config: &MonitoringConfig) -> anyhow::Result<()> {
    let output = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_thread_ids(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter(&config.log_filter)?)
        .with(output)
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    info!(node = %config.node, format = ?config.log_format, "Logging initialized");
    Ok(())
}

/// Compact output captured by the test harness. Later calls are no-ops.
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_test_writer()
        .try_init();
}
