//! Session state owned by flow instances.
//!
//! A [`FlowSession`] is the owning handle a flow uses to talk to one
//! counterparty. The session manager only ever holds a weak reference to the
//! shared [`SessionCore`] for routing inbound messages, so a session dropped
//! by its flow becomes unreachable.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::identity::FlowIdentity;
use crate::error::{FlowError, ResolutionError};
use crate::types::Payload;

/// Value object: Session ID, allocated independently by each side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Allocate a fresh random session id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Value object: name of a node on the network
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub String);

impl PeerId {
    /// Create a new peer id
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the peer name
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for PeerId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<&PeerId> for PeerId {
    fn from(peer: &PeerId) -> Self {
        peer.clone()
    }
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionLifecycle {
    /// Session-open sent, counterparty has not confirmed yet
    Pending,

    /// Both sides are bound and payloads flow
    Active,

    /// Session ended locally or by the counterparty
    Closed,
}

/// Which end of the session this node holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionRole {
    /// This node opened the session
    Initiator,

    /// This node accepted the session-open
    Responder,
}

/// Why a session ended, as carried by the session-close message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CloseReason {
    /// The counterparty flow returned normally
    Completed,

    /// The counterparty flow failed
    Failed {
        /// Failure message
        message: String,
    },

    /// The counterparty flow was killed or timed out
    Killed,

    /// The session-open was refused during responder resolution
    Rejected {
        /// Resolution failure
        error: ResolutionError,
    },

    /// The session was closed explicitly
    Closed,
}

impl CloseReason {
    /// Translate the close reason into the error a pending `receive` reports
    pub fn into_flow_error(self, session_id: SessionId) -> FlowError {
        match self {
            CloseReason::Failed { message } => FlowError::CounterpartyFailed {
                session_id,
                message,
            },
            CloseReason::Rejected { error } => FlowError::SessionRejected {
                session_id,
                reason: error,
            },
            CloseReason::Completed | CloseReason::Killed | CloseReason::Closed => {
                FlowError::SessionClosed { session_id }
            }
        }
    }
}

/// Events queued for the owning flow, in arrival order
#[derive(Debug)]
pub(crate) enum SessionEvent {
    Data(Payload),
    Ended(CloseReason),
}

/// Mutable state guarded by the session lock
#[derive(Debug)]
pub(crate) struct SessionState {
    pub(crate) lifecycle: SessionLifecycle,
    pub(crate) counterparty_session: Option<SessionId>,
    pub(crate) responder: Option<FlowIdentity>,
    /// Payloads sent while the session was still pending
    pub(crate) buffered: Vec<Payload>,
    /// Set when the session is closed before the counterparty confirmed
    pub(crate) close_on_confirm: Option<CloseReason>,
}

/// State shared between the owning flow and the session manager's routing table
#[derive(Debug)]
pub(crate) struct SessionCore {
    pub(crate) id: SessionId,
    pub(crate) peer: PeerId,
    pub(crate) role: SessionRole,
    pub(crate) initiator: FlowIdentity,
    pub(crate) state: Mutex<SessionState>,
    pub(crate) inbound: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionCore {
    /// Queue an event for the owner. A dropped owner is not an error.
    pub(crate) fn push(&self, event: SessionEvent) {
        let _ = self.inbound.send(event);
    }

    pub(crate) fn lifecycle(&self) -> SessionLifecycle {
        self.state.lock().lifecycle
    }
}

/// Owning handle to one side of a session.
///
/// Only the flow instance that opened or accepted the session holds this
/// handle; all sends and receives go through its [`FlowContext`].
///
/// [`FlowContext`]: crate::application::context::FlowContext
#[derive(Debug)]
pub struct FlowSession {
    core: Arc<SessionCore>,
    inbound: mpsc::UnboundedReceiver<SessionEvent>,
    ended: Option<CloseReason>,
}

impl FlowSession {
    pub(crate) fn new(
        peer: PeerId,
        role: SessionRole,
        initiator: FlowIdentity,
        state: SessionState,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let core = Arc::new(SessionCore {
            id: SessionId::new(),
            peer,
            role,
            initiator,
            state: Mutex::new(state),
            inbound: tx,
        });
        Self {
            core,
            inbound: rx,
            ended: None,
        }
    }

    /// Local id of this session
    #[inline]
    pub fn id(&self) -> SessionId {
        self.core.id
    }

    /// The node on the other end
    #[inline]
    pub fn counterparty(&self) -> &PeerId {
        &self.core.peer
    }

    /// Which end of the session this handle represents
    #[inline]
    pub fn role(&self) -> SessionRole {
        self.core.role
    }

    /// Identity of the flow that opened the session
    #[inline]
    pub fn initiator(&self) -> &FlowIdentity {
        &self.core.initiator
    }

    /// Responder bound to the session; `None` until the counterparty confirms
    pub fn responder(&self) -> Option<FlowIdentity> {
        self.core.state.lock().responder.clone()
    }

    /// Current lifecycle state
    pub fn lifecycle(&self) -> SessionLifecycle {
        self.core.lifecycle()
    }

    pub(crate) fn core(&self) -> &Arc<SessionCore> {
        &self.core
    }

    /// Record a local close so later receives fail fast
    pub(crate) fn mark_ended(&mut self, reason: CloseReason) {
        if self.ended.is_none() {
            self.ended = Some(reason);
        }
    }

    /// Wait for the next payload from the counterparty.
    ///
    /// Payloads are yielded in the order the counterparty sent them. Once the
    /// session has ended every call fails with the error derived from the
    /// close reason.
    pub(crate) async fn next_payload(&mut self) -> Result<Payload, FlowError> {
        if let Some(reason) = &self.ended {
            return Err(reason.clone().into_flow_error(self.id()));
        }
        match self.inbound.recv().await {
            Some(SessionEvent::Data(payload)) => Ok(payload),
            Some(SessionEvent::Ended(reason)) => {
                self.ended = Some(reason.clone());
                Err(reason.into_flow_error(self.id()))
            }
            None => Err(FlowError::SessionClosed {
                session_id: self.id(),
            }),
        }
    }
}
