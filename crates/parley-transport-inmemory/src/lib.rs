//! In-process network for Parley nodes
//!
//! Every node that joins the network gets a mailbox. Envelopes are encoded
//! with the core wire codec on send and decoded by the receiving node's pump,
//! so nodes in one process exchange exactly the bytes they would exchange
//! over a real link. Messages between two nodes are delivered in send order.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use parley_core::transport::{MessageHandler, Transport};
use parley_core::wire::{self, Envelope, SessionMessage};
use parley_core::{PeerId, TransportError};

/// Network membership errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// A node with this name is already attached
    #[error("Peer {0} already joined the network")]
    PeerAlreadyJoined(PeerId),
}

#[derive(Default)]
struct NetworkState {
    mailboxes: RwLock<HashMap<PeerId, mpsc::UnboundedSender<Vec<u8>>>>,
    disconnected: RwLock<HashSet<PeerId>>,
}

/// A shared in-process network
#[derive(Clone, Default)]
pub struct InMemoryNetwork {
    state: Arc<NetworkState>,
}

impl InMemoryNetwork {
    /// Create an empty network
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a node to the network
    pub fn join(
        &self,
        peer: impl Into<PeerId>,
    ) -> Result<(InMemoryTransport, InMemoryInbox), NetworkError> {
        let peer = peer.into();
        let mut mailboxes = self.state.mailboxes.write();
        if mailboxes.contains_key(&peer) {
            return Err(NetworkError::PeerAlreadyJoined(peer));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        mailboxes.insert(peer.clone(), tx);
        debug!(%peer, "Peer joined in-memory network");

        let transport = InMemoryTransport {
            local: peer.clone(),
            network: self.state.clone(),
        };
        let inbox = InMemoryInbox { peer, rx };
        Ok((transport, inbox))
    }

    /// Detach a node. Its pump stops once queued messages are drained.
    pub fn leave(&self, peer: &PeerId) -> bool {
        let removed = self.state.mailboxes.write().remove(peer).is_some();
        if removed {
            debug!(%peer, "Peer left in-memory network");
        }
        removed
    }

    /// Make a node unreachable without detaching it
    pub fn disconnect(&self, peer: &PeerId) {
        self.state.disconnected.write().insert(peer.clone());
    }

    /// Make a disconnected node reachable again
    pub fn reconnect(&self, peer: &PeerId) {
        self.state.disconnected.write().remove(peer);
    }

    /// Attached nodes, sorted by name
    pub fn peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<_> = self.state.mailboxes.read().keys().cloned().collect();
        peers.sort();
        peers
    }
}

/// Sending half of a node's attachment
#[derive(Clone)]
pub struct InMemoryTransport {
    local: PeerId,
    network: Arc<NetworkState>,
}

impl Transport for InMemoryTransport {
    fn local_peer(&self) -> &PeerId {
        &self.local
    }

    fn send(&self, to: &PeerId, message: SessionMessage) -> Result<(), TransportError> {
        if self.network.disconnected.read().contains(to) {
            return Err(TransportError::Unreachable(to.clone()));
        }

        let kind = message.kind();
        let bytes = wire::encode(&Envelope::new(self.local.clone(), message))?;
        let mailboxes = self.network.mailboxes.read();
        let mailbox = mailboxes
            .get(to)
            .ok_or_else(|| TransportError::UnknownPeer(to.clone()))?;
        mailbox
            .send(bytes)
            .map_err(|_| TransportError::Unreachable(to.clone()))?;
        trace!(from = %self.local, to = %to, kind, "Queued message");
        Ok(())
    }
}

/// Receiving half of a node's attachment
pub struct InMemoryInbox {
    peer: PeerId,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl InMemoryInbox {
    /// The node this inbox belongs to
    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    /// Wait for the next decodable envelope
    pub async fn next(&mut self) -> Option<Envelope> {
        while let Some(bytes) = self.rx.recv().await {
            match wire::decode(&bytes) {
                Ok(envelope) => return Some(envelope),
                Err(e) => warn!(peer = %self.peer, error = %e, "Dropping undecodable message"),
            }
        }
        None
    }

    /// Deliver every inbound envelope to `handler` until the node leaves
    pub fn run(mut self, handler: Arc<dyn MessageHandler>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(envelope) = self.next().await {
                handler.handle(envelope);
            }
            debug!(peer = %self.peer, "Inbox pump stopped");
        })
    }
}
