use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::flow_instance::FlowInstanceId;
use crate::domain::identity::FlowName;
use crate::domain::session::{PeerId, SessionId};
use crate::wire::WireError;

/// Failure to select a responder for an inbound session-open.
///
/// These travel back to the initiating node inside a session rejection, so
/// they are serializable.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionError {
    /// No responder declares itself initiated by this flow
    #[error("No responder registered for initiating flow {initiator}")]
    NoResponderRegistered {
        /// The initiating flow that could not be matched
        initiator: FlowName,
    },

    /// Several responders tie at the highest specificity depth
    #[error(
        "Ambiguous responders for initiating flow {initiator}: {} (configure a flow override)",
        join_names(.candidates)
    )]
    AmbiguousResponder {
        /// The initiating flow that could not be matched
        initiator: FlowName,
        /// Every candidate tied at the maximum depth, sorted by name
        candidates: Vec<FlowName>,
    },
}

fn join_names(names: &[FlowName]) -> String {
    names
        .iter()
        .map(FlowName::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Node configuration errors. These are fatal at startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// An override names a responder that cannot answer the initiator
    #[error("Invalid flow override {initiator} -> {responder}: {reason}")]
    InvalidOverride {
        /// Initiating flow the override targets
        initiator: FlowName,
        /// Responder the override names
        responder: FlowName,
        /// Why the override was refused
        reason: String,
    },

    /// The same flow name was declared with two different lineages
    #[error("Flow {0} declared twice with different lineages")]
    ConflictingDeclaration(FlowName),

    /// A responder binding was declared without logic to run
    #[error("Responder {0} has no flow logic installed")]
    MissingResponderLogic(FlowName),

    /// A referenced flow was never declared
    #[error("Unknown flow: {0}")]
    UnknownFlow(FlowName),

    /// A configuration value is out of range or malformed
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue {
        /// Configuration key
        key: String,
        /// Problem description
        message: String,
    },

    /// The configuration document could not be parsed
    #[error("Configuration parse error: {0}")]
    Parse(String),
}

impl From<serde_yaml::Error> for ConfigurationError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigurationError::Parse(err.to_string())
    }
}

/// Errors raised by the transport seam
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The destination peer is not known to the transport
    #[error("Unknown peer: {0}")]
    UnknownPeer(PeerId),

    /// The destination peer exists but cannot accept messages
    #[error("Peer {0} is unreachable")]
    Unreachable(PeerId),

    /// The envelope could not be encoded or decoded
    #[error("Wire error: {0}")]
    Wire(#[from] WireError),
}

/// Flow-level failures. These fail one flow instance, never the node.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// Operation attempted on a session that is no longer active
    #[error("Session {session_id} is closed")]
    SessionClosed {
        /// Local id of the session
        session_id: SessionId,
    },

    /// The counterparty could not resolve a responder for our session-open
    #[error("Session {session_id} was rejected by the counterparty: {reason}")]
    SessionRejected {
        /// Local id of the session
        session_id: SessionId,
        /// Resolution failure reported by the counterparty
        reason: ResolutionError,
    },

    /// The counterparty flow ended with an error
    #[error("Counterparty flow on session {session_id} failed: {message}")]
    CounterpartyFailed {
        /// Local id of the session
        session_id: SessionId,
        /// Failure message reported by the counterparty
        message: String,
    },

    /// A received payload did not decode to the expected type
    #[error("Unexpected payload type on session {session_id}: expected {expected} ({detail})")]
    UnexpectedPayloadType {
        /// Local id of the session
        session_id: SessionId,
        /// Rust type name the receiver asked for
        expected: String,
        /// Decoder message
        detail: String,
    },

    /// The flow was not declared on this node
    #[error("Unknown flow: {0}")]
    UnknownFlow(FlowName),

    /// The flow was killed externally
    #[error("Flow was killed")]
    Killed,

    /// The flow exceeded the node's flow timeout
    #[error("Flow timed out after {after_secs}s")]
    TimedOut {
        /// Configured timeout in seconds
        after_secs: u64,
    },

    /// The transport refused an outbound message
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A payload could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Application-level failure raised by flow logic
    #[error("{0}")]
    Application(String),

    /// Invariant violation inside the runtime
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FlowError {
    /// Shorthand for an application-level failure
    pub fn application(message: impl Into<String>) -> Self {
        FlowError::Application(message.into())
    }

    /// Whether this failure originated on the counterparty rather than in local logic
    pub fn is_remote_failure(&self) -> bool {
        matches!(
            self,
            FlowError::SessionRejected { .. } | FlowError::CounterpartyFailed { .. }
        )
    }
}

impl From<serde_json::Error> for FlowError {
    fn from(err: serde_json::Error) -> Self {
        FlowError::Serialization(err.to_string())
    }
}

/// Node-level errors surfaced by the node facade
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// Configuration was rejected
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Flow failure
    #[error(transparent)]
    Flow(#[from] FlowError),

    /// No running flow instance has this id
    #[error("Flow instance not found: {0}")]
    FlowInstanceNotFound(FlowInstanceId),

    /// The node is missing a required collaborator
    #[error("Node is missing {0}")]
    MissingComponent(&'static str),
}
