//! Monitoring for Parley nodes: structured logging and node metrics.

use serde::{Deserialize, Serialize};
use tracing::info;

use parley_core::NodeConfig;

pub mod logging;
pub mod metrics;

/// Output format of the log subscriber
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Multi-line human readable output
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Configuration for initializing the monitoring system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Node name attached to log output and metric labels
    pub node: String,
    /// Export domain events as counters through the `metrics` facade
    pub enable_metrics: bool,
    /// Log filter used when `RUST_LOG` is not set (e.g., "info,parley_core=debug")
    pub log_filter: String,
    /// Log output format
    pub log_format: LogFormat,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            node: "parley".to_string(),
            enable_metrics: true,
            log_filter: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl MonitoringConfig {
    /// Monitoring defaults for a node, using its configured log level
    pub fn for_node(config: &NodeConfig) -> Self {
        Self {
            node: config.peer_name.to_string(),
            log_filter: config.log_level.clone(),
            ..Self::default()
        }
    }
}

/// Install logging and build the node's metrics handler
pub fn init(config: &MonitoringConfig) -> anyhow::Result<MetricsEventHandler> {
    logging::init_logging(config)?;
    let handler = MetricsEventHandler::from_config(config);
    info!(
        node = %config.node,
        metrics = config.enable_metrics,
        "Monitoring initialized"
    );
    Ok(handler)
}

pub use crate::logging::{init_logging, init_test_tracing};
pub use crate::metrics::{MetricsEventHandler, NodeStats, NodeStatsSnapshot};
