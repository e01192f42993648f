//! Messages exchanged between the session managers of two nodes.
//!
//! The session-open carries the initiator's own session id; the confirm pairs
//! it with the responder's. Every later message is addressed by the
//! recipient's session id.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::identity::FlowIdentity;
use crate::domain::session::{CloseReason, PeerId, SessionId};
use crate::error::ResolutionError;
use crate::types::Payload;

/// Codec failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// The message could not be encoded
    #[error("Failed to encode envelope: {0}")]
    Encode(String),

    /// The bytes were not a valid envelope
    #[error("Failed to decode envelope: {0}")]
    Decode(String),
}

/// Session-level protocol message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionMessage {
    /// Session-open from an initiating flow
    Init {
        /// Session id allocated by the initiator
        initiator_session_id: SessionId,
        /// Identity of the initiating flow, lineage included
        initiator: FlowIdentity,
    },

    /// The responder accepted the session-open
    Confirm {
        /// Session id allocated by the initiator
        initiator_session_id: SessionId,
        /// Session id allocated by the responder
        responder_session_id: SessionId,
        /// Responder chosen by resolution
        responder: FlowIdentity,
    },

    /// No responder could be resolved for the session-open
    Reject {
        /// Session id allocated by the initiator
        initiator_session_id: SessionId,
        /// Why resolution failed
        error: ResolutionError,
    },

    /// Application payload
    Data {
        /// Recipient's session id
        session_id: SessionId,
        /// Opaque payload
        payload: Payload,
    },

    /// Session end
    End {
        /// Recipient's session id
        session_id: SessionId,
        /// Why the sender ended the session
        reason: CloseReason,
    },
}

impl SessionMessage {
    /// The recipient-side session this message addresses.
    ///
    /// `Init` addresses no existing session on the recipient.
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            SessionMessage::Init { .. } => None,
            SessionMessage::Confirm {
                initiator_session_id,
                ..
            }
            | SessionMessage::Reject {
                initiator_session_id,
                ..
            } => Some(*initiator_session_id),
            SessionMessage::Data { session_id, .. } | SessionMessage::End { session_id, .. } => {
                Some(*session_id)
            }
        }
    }

    /// Short name used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            SessionMessage::Init { .. } => "init",
            SessionMessage::Confirm { .. } => "confirm",
            SessionMessage::Reject { .. } => "reject",
            SessionMessage::Data { .. } => "data",
            SessionMessage::End { .. } => "end",
        }
    }
}

/// A session message stamped with its sender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Sending node
    pub from: PeerId,

    /// Message body
    pub message: SessionMessage,
}

impl Envelope {
    /// Wrap a message from `from`
    pub fn new(from: PeerId, message: SessionMessage) -> Self {
        Self { from, message }
    }
}

/// Encode an envelope to JSON bytes
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, WireError> {
    serde_json::to_vec(envelope).map_err(|e| WireError::Encode(e.to_string()))
}

/// Decode an envelope from JSON bytes
pub fn decode(bytes: &[u8]) -> Result<Envelope, WireError> {
    serde_json::from_slice(bytes).map_err(|e| WireError::Decode(e.to_string()))
}
