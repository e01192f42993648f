//! Seam between the session manager and the network.

use crate::domain::session::PeerId;
use crate::error::TransportError;
use crate::wire::{Envelope, SessionMessage};

/// Outbound half of a node's network attachment.
///
/// `send` must not block: it hands the message to the network and returns.
/// Messages sent to the same peer must arrive in the order they were sent.
pub trait Transport: Send + Sync {
    /// The peer this transport sends as
    fn local_peer(&self) -> &PeerId;

    /// Send a message to `to`, stamped with the local peer
    fn send(&self, to: &PeerId, message: SessionMessage) -> Result<(), TransportError>;
}

/// Inbound half: the transport pump hands every received envelope here
pub trait MessageHandler: Send + Sync {
    /// Handle one received envelope
    fn handle(&self, envelope: Envelope);
}
