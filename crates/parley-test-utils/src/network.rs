//! Multi-node harness over the in-memory network.

use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

use parley_core::{FlowBundle, FlowInstanceId, FlowStatus, Node, NodeConfig, PeerId};
use parley_monitoring::{MetricsEventHandler, MonitoringConfig, NodeStatsSnapshot};
use parley_transport_inmemory::InMemoryNetwork;

use crate::error::TestError;
use crate::events::RecordingEventHandler;

/// A node attached to a [`TestNetwork`], with its recorded events
pub struct TestNode {
    node: Node,
    events: Arc<RecordingEventHandler>,
    pump: JoinHandle<()>,
}

impl TestNode {
    /// The underlying node
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Domain events this node emitted
    pub fn events(&self) -> &Arc<RecordingEventHandler> {
        &self.events
    }

    /// Wait until the flow instance `id` is gone from the node's flow list
    pub async fn wait_until_finished(
        &self,
        id: FlowInstanceId,
        timeout: Duration,
    ) -> Result<(), TestError> {
        wait_until(timeout, || {
            !self.node.list_flows().iter().any(|flow| flow.id == id)
        })
        .await
    }

    /// Wait until some flow on this node reaches `status`
    pub async fn wait_for_status(
        &self,
        status: FlowStatus,
        timeout: Duration,
    ) -> Result<FlowInstanceId, TestError> {
        let find = || {
            self.node
                .list_flows()
                .into_iter()
                .find(|flow| flow.status == status)
                .map(|flow| flow.id)
        };
        wait_until(timeout, || find().is_some()).await?;
        find().ok_or_else(|| TestError::Timeout(format!("no flow reached {:?}", status)))
    }
}

impl Deref for TestNode {
    type Target = Node;

    fn deref(&self) -> &Node {
        &self.node
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        self.node.shutdown();
        self.pump.abort();
    }
}

/// Several nodes sharing one in-memory network
#[derive(Default)]
pub struct TestNetwork {
    network: InMemoryNetwork,
}

impl TestNetwork {
    /// Create an empty network
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared network, for partition tests
    pub fn network(&self) -> &InMemoryNetwork {
        &self.network
    }

    /// Start a node named `peer` with default configuration
    pub fn spawn(&self, peer: &str, bundle: FlowBundle) -> Result<TestNode, TestError> {
        self.spawn_with_config(NodeConfig::new(peer), bundle)
    }

    /// Start a node from `config`, attached as `config.peer_name`
    pub fn spawn_with_config(
        &self,
        config: NodeConfig,
        bundle: FlowBundle,
    ) -> Result<TestNode, TestError> {
        let (transport, inbox) = self.network.join(config.peer_name.clone())?;
        let events = Arc::new(RecordingEventHandler::new());

        let node = Node::builder(config)
            .bundle(bundle)
            .transport(Arc::new(transport))
            .event_handler(events.clone())
            .build();
        let node = match node {
            Ok(node) => node,
            Err(e) => {
                self.network.leave(inbox.peer());
                return Err(e.into());
            }
        };

        let pump = inbox.run(node.message_handler());
        debug!(peer = %node.peer(), "Test node started");
        Ok(TestNode { node, events, pump })
    }

    /// Start a node that records metrics instead of events
    pub fn spawn_with_metrics(
        &self,
        peer: &str,
        bundle: FlowBundle,
    ) -> Result<(Node, MetricsHandle), TestError> {
        let (transport, inbox) = self.network.join(peer)?;
        let config = NodeConfig::new(peer);
        let metrics = MetricsEventHandler::from_config(&MonitoringConfig::for_node(&config));
        let node = Node::builder(config)
            .bundle(bundle)
            .transport(Arc::new(transport))
            .event_handler(Arc::new(metrics.clone()))
            .build()?;
        inbox.run(node.message_handler());
        Ok((node, MetricsHandle(metrics)))
    }

    /// Names of attached nodes
    pub fn peers(&self) -> Vec<PeerId> {
        self.network.peers()
    }
}

/// Read access to a node's metrics
pub struct MetricsHandle(MetricsEventHandler);

impl MetricsHandle {
    /// Current counters
    pub fn snapshot(&self) -> NodeStatsSnapshot {
        self.0.stats().snapshot()
    }
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> Result<(), TestError>
where
    F: FnMut() -> bool,
{
    let poll = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(timeout, poll)
        .await
        .map_err(|_| TestError::Timeout(format!("condition not met within {:?}", timeout)))
}
