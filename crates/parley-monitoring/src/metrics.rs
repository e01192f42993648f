//! Node metrics derived from domain events.

use metrics::Label;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use parley_core::{DomainEvent, DomainEventHandler};

use crate::MonitoringConfig;

/// Running counters for one node
#[derive(Debug, Default)]
pub struct NodeStats {
    flows_started: AtomicU64,
    flows_completed: AtomicU64,
    flows_failed: AtomicU64,
    flows_killed: AtomicU64,
    sessions_opened: AtomicU64,
    sessions_accepted: AtomicU64,
    sessions_rejected: AtomicU64,
    sessions_ended: AtomicU64,
}

/// Point-in-time copy of [`NodeStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatsSnapshot {
    /// Flow instances started, initiator and responder
    pub flows_started: u64,
    /// Flow instances that returned a result
    pub flows_completed: u64,
    /// Flow instances that failed
    pub flows_failed: u64,
    /// Flow instances killed or timed out
    pub flows_killed: u64,
    /// Sessions opened by local flows
    pub sessions_opened: u64,
    /// Inbound session-opens accepted
    pub sessions_accepted: u64,
    /// Inbound session-opens rejected during resolution
    pub sessions_rejected: u64,
    /// Sessions ended, either side
    pub sessions_ended: u64,
}

impl NodeStats {
    /// Take a snapshot of the counters
    pub fn snapshot(&self) -> NodeStatsSnapshot {
        NodeStatsSnapshot {
            flows_started: self.flows_started.load(Ordering::Relaxed),
            flows_completed: self.flows_completed.load(Ordering::Relaxed),
            flows_failed: self.flows_failed.load(Ordering::Relaxed),
            flows_killed: self.flows_killed.load(Ordering::Relaxed),
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            sessions_accepted: self.sessions_accepted.load(Ordering::Relaxed),
            sessions_rejected: self.sessions_rejected.load(Ordering::Relaxed),
            sessions_ended: self.sessions_ended.load(Ordering::Relaxed),
        }
    }

    fn counter(&self, event_type: &str) -> Option<&AtomicU64> {
        match event_type {
            "flow.started" => Some(&self.flows_started),
            "flow.completed" => Some(&self.flows_completed),
            "flow.failed" => Some(&self.flows_failed),
            "flow.killed" => Some(&self.flows_killed),
            "session.opened" => Some(&self.sessions_opened),
            "session.accepted" => Some(&self.sessions_accepted),
            "session.rejected" => Some(&self.sessions_rejected),
            "session.ended" => Some(&self.sessions_ended),
            _ => None,
        }
    }
}

/// Counts every domain event in [`NodeStats`] and, when exporting, as a
/// `parley_<event>_total` counter on the installed `metrics` recorder
#[derive(Debug, Clone)]
pub struct MetricsEventHandler {
    node: String,
    export: bool,
    stats: Arc<NodeStats>,
}

impl MetricsEventHandler {
    /// Create an exporting handler labelling metrics with `node`
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            export: true,
            stats: Arc::new(NodeStats::default()),
        }
    }

    /// Handler for a monitoring config; `enable_metrics` decides export
    pub fn from_config(config: &MonitoringConfig) -> Self {
        Self {
            export: config.enable_metrics,
            ..Self::new(config.node.clone())
        }
    }

    /// Whether events reach the `metrics` facade
    pub fn exports(&self) -> bool {
        self.export
    }

    /// Counters accumulated so far
    pub fn stats(&self) -> Arc<NodeStats> {
        self.stats.clone()
    }
}

/// Metric name for an event type, e.g. `flow.started` -> `parley_flow_started_total`
pub fn metric_name(event_type: &str) -> String {
    format!("parley_{}_total", event_type.replace('.', "_"))
}

impl DomainEventHandler for MetricsEventHandler {
    fn handle_event(&self, event: Box<dyn DomainEvent>) {
        let event_type = event.event_type();
        if let Some(counter) = self.stats.counter(event_type) {
            counter.fetch_add(1, Ordering::Relaxed);
        }

        if self.export {
            let mut labels = vec![Label::new("node", self.node.clone())];
            labels.extend(
                event
                    .labels()
                    .into_iter()
                    .map(|(key, value)| Label::new(key, value)),
            );
            metrics::register_counter!(metric_name(event_type), labels).increment(1);
        }

        debug!(
            node = %self.node,
            event_type,
            timestamp = %event.timestamp(),
            "Recorded domain event"
        );
    }
}
