//!
//! Parley Core - flow sessions and responder resolution
//!
//! This crate defines the domain model and runtime of a parley node: flow
//! identities and their lineage, the responder registry and override table,
//! the resolver that picks one responder for an inbound session-open, the
//! session manager, and the flow runtime that runs flow logic as suspendable
//! tasks.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Domain layer - identities, registry, resolution, sessions and events
pub mod domain;

/// Application services - session manager, flow runtime and node assembly
pub mod application;

/// Node configuration
pub mod config;

/// Error types
pub mod error;

/// Transport seam
pub mod transport;

/// Core types
pub mod types;

/// Wire contract between nodes
pub mod wire;

// Re-export key types
pub use config::NodeConfig;
pub use error::{ConfigurationError, FlowError, NodeError, ResolutionError, TransportError};
pub use types::Payload;
pub use wire::{Envelope, SessionMessage, WireError};

pub use domain::events::{DomainEvent, DomainEventHandler, NoopEventHandler};
pub use domain::flow_instance::{FlowInstanceId, FlowInstanceSummary, FlowStatus};
pub use domain::identity::{FlowIdentity, FlowName};
pub use domain::overrides::OverrideTable;
pub use domain::registry::{InitiationBinding, Registry};
pub use domain::resolver::Resolver;
pub use domain::session::{
    CloseReason, FlowSession, PeerId, SessionId, SessionLifecycle, SessionRole,
};

pub use application::bundle::{FlowBundle, FlowDeclaration};
pub use application::context::FlowContext;
pub use application::flow_runtime::{
    responder_factory, FlowCatalog, FlowHandle, FlowLogic, FlowResult, ResponderFactory,
};
pub use application::node::{Node, NodeBuilder};
pub use application::worker_pool::WorkerPoolStats;
pub use transport::{MessageHandler, Transport};

// Re-exported so flow implementations don't need a direct dependency
pub use async_trait::async_trait;
