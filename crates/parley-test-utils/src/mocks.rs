//! Mock implementations of the core seams.

use mockall::mock;

use parley_core::{PeerId, SessionMessage, Transport, TransportError};

mock! {
    /// Mock of the transport seam
    pub Transport {}

    impl Transport for Transport {
        fn local_peer(&self) -> &PeerId;
        fn send(&self, to: &PeerId, message: SessionMessage) -> Result<(), TransportError>;
    }
}

/// A transport attached as `peer` that refuses every message as unreachable
pub fn unreachable_transport(peer: impl Into<PeerId>) -> MockTransport {
    let mut transport = MockTransport::new();
    transport.expect_local_peer().return_const(peer.into());
    transport
        .expect_send()
        .returning(|to, _| Err(TransportError::Unreachable(to.clone())));
    transport
}
