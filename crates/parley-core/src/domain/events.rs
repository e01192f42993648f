use chrono::{DateTime, Utc};
use std::fmt::Debug;

use crate::domain::flow_instance::FlowInstanceId;
use crate::domain::identity::{FlowIdentity, FlowName};
use crate::domain::session::{CloseReason, PeerId, SessionId, SessionRole};
use crate::error::ResolutionError;

/// Domain event trait for all events raised by a node
pub trait DomainEvent: Debug + Send + Sync {
    /// Returns the type of the event as a string
    fn event_type(&self) -> &'static str;

    /// Returns the timestamp when the event occurred
    fn timestamp(&self) -> DateTime<Utc>;

    /// Low-cardinality labels describing the event, for metrics
    fn labels(&self) -> Vec<(&'static str, String)>;
}

/// Receives domain events from the runtime and session manager.
///
/// Called inline on the emitting path, so implementations must not block.
pub trait DomainEventHandler: Send + Sync {
    /// Handle a domain event
    fn handle_event(&self, event: Box<dyn DomainEvent>);
}

/// Handler that discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventHandler;

impl DomainEventHandler for NoopEventHandler {
    fn handle_event(&self, _event: Box<dyn DomainEvent>) {}
}

fn role_label(role: SessionRole) -> String {
    match role {
        SessionRole::Initiator => "initiator".to_string(),
        SessionRole::Responder => "responder".to_string(),
    }
}

/// Event: flow instance started
#[derive(Debug)]
pub struct FlowStarted {
    /// Instance id
    pub flow_instance_id: FlowInstanceId,
    /// Flow being executed
    pub identity: FlowIdentity,
    /// Initiator or responder
    pub role: SessionRole,
    /// When the instance started
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for FlowStarted {
    fn event_type(&self) -> &'static str {
        "flow.started"
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn labels(&self) -> Vec<(&'static str, String)> {
        vec![
            ("flow", self.identity.name().to_string()),
            ("role", role_label(self.role)),
        ]
    }
}

/// Event: flow instance returned a result
#[derive(Debug)]
pub struct FlowCompleted {
    /// Instance id
    pub flow_instance_id: FlowInstanceId,
    /// Flow that completed
    pub identity: FlowIdentity,
    /// When the flow completed
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for FlowCompleted {
    fn event_type(&self) -> &'static str {
        "flow.completed"
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn labels(&self) -> Vec<(&'static str, String)> {
        vec![("flow", self.identity.name().to_string())]
    }
}

/// Event: flow instance failed
#[derive(Debug)]
pub struct FlowFailed {
    /// Instance id
    pub flow_instance_id: FlowInstanceId,
    /// Flow that failed
    pub identity: FlowIdentity,
    /// Failure message
    pub error: String,
    /// Whether the failure came from the counterparty
    pub remote: bool,
    /// When the flow failed
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for FlowFailed {
    fn event_type(&self) -> &'static str {
        "flow.failed"
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn labels(&self) -> Vec<(&'static str, String)> {
        vec![
            ("flow", self.identity.name().to_string()),
            ("remote", self.remote.to_string()),
        ]
    }
}

/// Event: flow instance killed or timed out
#[derive(Debug)]
pub struct FlowKilled {
    /// Instance id
    pub flow_instance_id: FlowInstanceId,
    /// Flow that was killed
    pub identity: FlowIdentity,
    /// When the flow was killed
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for FlowKilled {
    fn event_type(&self) -> &'static str {
        "flow.killed"
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn labels(&self) -> Vec<(&'static str, String)> {
        vec![("flow", self.identity.name().to_string())]
    }
}

/// Event: a session-open was sent to a peer
#[derive(Debug)]
pub struct SessionOpened {
    /// Local session id
    pub session_id: SessionId,
    /// Target peer
    pub peer: PeerId,
    /// Initiating flow
    pub initiator: FlowIdentity,
    /// When the session-open was sent
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for SessionOpened {
    fn event_type(&self) -> &'static str {
        "session.opened"
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn labels(&self) -> Vec<(&'static str, String)> {
        vec![("initiator", self.initiator.name().to_string())]
    }
}

/// Event: an inbound session-open was resolved and accepted
#[derive(Debug)]
pub struct SessionAccepted {
    /// Local session id
    pub session_id: SessionId,
    /// Peer that opened the session
    pub peer: PeerId,
    /// Initiating flow on the peer
    pub initiator: FlowIdentity,
    /// Responder chosen by resolution
    pub responder: FlowIdentity,
    /// When the session was accepted
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for SessionAccepted {
    fn event_type(&self) -> &'static str {
        "session.accepted"
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn labels(&self) -> Vec<(&'static str, String)> {
        vec![
            ("initiator", self.initiator.name().to_string()),
            ("responder", self.responder.name().to_string()),
        ]
    }
}

/// Event: an inbound session-open could not be resolved
#[derive(Debug)]
pub struct SessionRejected {
    /// Peer that opened the session
    pub peer: PeerId,
    /// Initiating flow on the peer
    pub initiator: FlowName,
    /// Resolution failure
    pub error: ResolutionError,
    /// When the session-open was rejected
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for SessionRejected {
    fn event_type(&self) -> &'static str {
        "session.rejected"
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn labels(&self) -> Vec<(&'static str, String)> {
        let reason = match self.error {
            ResolutionError::NoResponderRegistered { .. } => "no_responder",
            ResolutionError::AmbiguousResponder { .. } => "ambiguous",
        };
        vec![
            ("initiator", self.initiator.to_string()),
            ("reason", reason.to_string()),
        ]
    }
}

/// Event: a session ended, locally or by the counterparty
#[derive(Debug)]
pub struct SessionEnded {
    /// Local session id
    pub session_id: SessionId,
    /// Counterparty
    pub peer: PeerId,
    /// Why the session ended
    pub reason: CloseReason,
    /// When the session ended
    pub timestamp: DateTime<Utc>,
}

impl DomainEvent for SessionEnded {
    fn event_type(&self) -> &'static str {
        "session.ended"
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn labels(&self) -> Vec<(&'static str, String)> {
        let reason = match self.reason {
            CloseReason::Completed => "completed",
            CloseReason::Failed { .. } => "failed",
            CloseReason::Killed => "killed",
            CloseReason::Rejected { .. } => "rejected",
            CloseReason::Closed => "closed",
        };
        vec![("reason", reason.to_string())]
    }
}
