//! Node assembly.
//!
//! A node wires the registry, override table, resolver, session manager and
//! flow runtime together from a [`NodeConfig`], a [`FlowBundle`] and a
//! transport. Overrides are validated while building, so a node never runs
//! with an override that cannot be honoured.

use std::sync::Arc;
use tracing::info;

use crate::application::bundle::FlowBundle;
use crate::application::flow_runtime::{FlowHandle, FlowLogic, FlowRuntime};
use crate::application::session_manager::SessionManager;
use crate::application::worker_pool::{WorkerPool, WorkerPoolStats};
use crate::config::NodeConfig;
use crate::domain::events::{DomainEventHandler, NoopEventHandler};
use crate::domain::flow_instance::{FlowInstanceId, FlowInstanceSummary};
use crate::domain::identity::FlowName;
use crate::domain::overrides::OverrideTable;
use crate::domain::registry::Registry;
use crate::domain::resolver::Resolver;
use crate::domain::session::PeerId;
use crate::error::{ConfigurationError, FlowError, NodeError};
use crate::transport::{MessageHandler, Transport};

/// Builder for [`Node`]
pub struct NodeBuilder {
    config: NodeConfig,
    bundle: FlowBundle,
    transport: Option<Arc<dyn Transport>>,
    events: Arc<dyn DomainEventHandler>,
}

impl NodeBuilder {
    /// Start building a node from its configuration
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            bundle: FlowBundle::new(),
            transport: None,
            events: Arc::new(NoopEventHandler),
        }
    }

    /// Flows deployed to the node
    pub fn bundle(mut self, bundle: FlowBundle) -> Self {
        self.bundle = bundle;
        self
    }

    /// Transport the node sends through
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Receiver of domain events
    pub fn event_handler(mut self, events: Arc<dyn DomainEventHandler>) -> Self {
        self.events = events;
        self
    }

    /// Validate the configuration and assemble the node.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Result<Node, NodeError> {
        let Self {
            config,
            bundle,
            transport,
            events,
        } = self;

        config.validate()?;
        let transport = transport.ok_or(NodeError::MissingComponent("transport"))?;
        if transport.local_peer() != &config.peer_name {
            return Err(ConfigurationError::InvalidValue {
                key: "peer_name".to_string(),
                message: format!(
                    "transport is attached as {} but the node is configured as {}",
                    transport.local_peer(),
                    config.peer_name
                ),
            }
            .into());
        }

        let registry = Arc::new(Registry::new());
        let catalog = bundle.install(&registry)?;

        let overrides = Arc::new(OverrideTable::new());
        overrides.load(&registry, &config.flow_overrides)?;

        let resolver = Resolver::new(registry.clone(), overrides.clone());
        let (sessions, accepted) = SessionManager::new(transport, resolver, events.clone());
        let sessions = Arc::new(sessions);

        let runtime = FlowRuntime::start(
            registry.clone(),
            sessions.clone(),
            catalog,
            WorkerPool::new(config.max_concurrent_flows),
            config.flow_timeout(),
            events,
            accepted,
        );

        info!(
            peer = %config.peer_name,
            flows = registry.len(),
            overrides = overrides.len(),
            max_concurrent_flows = config.max_concurrent_flows,
            "Node started"
        );

        Ok(Node {
            config,
            registry,
            overrides,
            sessions,
            runtime,
        })
    }
}

/// A running node
#[derive(Clone)]
pub struct Node {
    config: NodeConfig,
    registry: Arc<Registry>,
    overrides: Arc<OverrideTable>,
    sessions: Arc<SessionManager>,
    runtime: FlowRuntime,
}

impl Node {
    /// Shorthand for [`NodeBuilder::new`]
    pub fn builder(config: NodeConfig) -> NodeBuilder {
        NodeBuilder::new(config)
    }

    /// This node's name
    pub fn peer(&self) -> &PeerId {
        &self.config.peer_name
    }

    /// Configuration the node was built with
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Declared flows and bindings
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Installed overrides
    pub fn overrides(&self) -> &Arc<OverrideTable> {
        &self.overrides
    }

    /// Handler the transport must deliver inbound envelopes to
    pub fn message_handler(&self) -> Arc<dyn MessageHandler> {
        self.sessions.clone()
    }

    /// Start a declared flow as an initiator
    pub fn start_flow<L>(
        &self,
        name: impl Into<FlowName>,
        logic: L,
    ) -> Result<FlowHandle, FlowError>
    where
        L: FlowLogic + 'static,
    {
        self.runtime.start_flow(name, logic)
    }

    /// Kill a running flow
    pub fn kill_flow(&self, id: FlowInstanceId) -> Result<(), NodeError> {
        self.runtime.kill_flow(id)
    }

    /// Snapshot of running flows
    pub fn list_flows(&self) -> Vec<FlowInstanceSummary> {
        self.runtime.list_flows()
    }

    /// Worker pool statistics
    pub fn pool_stats(&self) -> WorkerPoolStats {
        self.runtime.pool_stats()
    }

    /// Number of sessions currently routable
    pub fn session_count(&self) -> usize {
        self.sessions.session_count()
    }

    /// Install or replace an override.
    ///
    /// Applies to session-opens received after the call returns.
    pub fn set_override(
        &self,
        initiator: impl Into<FlowName>,
        responder: impl Into<FlowName>,
    ) -> Result<(), ConfigurationError> {
        self.overrides
            .set(&self.registry, initiator.into(), &responder.into())
    }

    /// Stop accepting sessions and kill every running flow
    pub fn shutdown(&self) {
        self.runtime.shutdown();
        info!(peer = %self.config.peer_name, "Node stopped");
    }
}
