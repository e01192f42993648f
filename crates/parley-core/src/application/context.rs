use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::trace;

use crate::application::session_manager::SessionManager;
use crate::application::worker_pool::{WorkerPool, WorkerSlot};
use crate::domain::flow_instance::{FlowInstance, FlowInstanceId, FlowStatus};
use crate::domain::identity::FlowIdentity;
use crate::domain::session::{CloseReason, FlowSession, PeerId, SessionCore};
use crate::error::FlowError;
use crate::types::Payload;

/// Sessions a flow instance has opened or accepted, shared with the runtime
/// so they can be ended when the instance finishes or is killed
pub(crate) type OwnedSessions = Arc<Mutex<Vec<Arc<SessionCore>>>>;

/// Everything flow logic can do while it runs.
///
/// One context exists per flow instance. `receive` is the only suspension
/// point: while it waits the instance gives its worker slot back and takes a
/// slot again before returning to the logic.
pub struct FlowContext {
    instance_id: FlowInstanceId,
    identity: FlowIdentity,
    sessions: Arc<SessionManager>,
    pool: WorkerPool,
    slot: Option<WorkerSlot>,
    record: Arc<Mutex<FlowInstance>>,
    owned: OwnedSessions,
}

impl FlowContext {
    pub(crate) fn new(
        record: Arc<Mutex<FlowInstance>>,
        sessions: Arc<SessionManager>,
        pool: WorkerPool,
        owned: OwnedSessions,
    ) -> Self {
        let (instance_id, identity) = {
            let record = record.lock();
            (record.id, record.identity.clone())
        };
        Self {
            instance_id,
            identity,
            sessions,
            pool,
            slot: None,
            record,
            owned,
        }
    }

    /// Take a worker slot before running logic
    pub(crate) async fn acquire_slot(&mut self) -> Result<(), FlowError> {
        if self.slot.is_none() {
            self.slot = Some(self.pool.acquire().await?);
        }
        Ok(())
    }

    /// Id of the running instance
    pub fn instance_id(&self) -> FlowInstanceId {
        self.instance_id
    }

    /// Identity of the running flow
    pub fn identity(&self) -> &FlowIdentity {
        &self.identity
    }

    /// The node this flow runs on
    pub fn our_peer(&self) -> &PeerId {
        self.sessions.local_peer()
    }

    /// Open a session to `peer`, initiated by this flow.
    ///
    /// The session is pending until the peer resolves a responder, but it can
    /// be sent on immediately.
    pub fn initiate_flow(&mut self, peer: impl Into<PeerId>) -> Result<FlowSession, FlowError> {
        ensure_live(&self.record.lock())?;
        let session = self.sessions.open(&self.identity, &peer.into())?;

        // A kill settles the record before draining owned sessions, so the
        // session is either drained by the kill or ended here
        let mut record = self.record.lock();
        if let Err(e) = ensure_live(&record) {
            drop(record);
            self.sessions.end(session.core(), CloseReason::Killed);
            return Err(e);
        }
        self.owned.lock().push(session.core().clone());
        record.add_session();
        Ok(session)
    }

    /// Send a value on a session. Never waits for the counterparty.
    pub fn send<T: Serialize + ?Sized>(
        &self,
        session: &FlowSession,
        value: &T,
    ) -> Result<(), FlowError> {
        ensure_live(&self.record.lock())?;
        let payload = Payload::encode(value)?;
        self.sessions.send(session, payload)
    }

    /// Wait for the next value on a session, decoded as `T`
    pub async fn receive<T: DeserializeOwned>(
        &mut self,
        session: &mut FlowSession,
    ) -> Result<T, FlowError> {
        let payload = self.receive_payload(session).await?;
        payload
            .decode::<T>()
            .map_err(|e| FlowError::UnexpectedPayloadType {
                session_id: session.id(),
                expected: std::any::type_name::<T>().to_string(),
                detail: e.to_string(),
            })
    }

    /// Send a value and wait for the reply on the same session
    pub async fn send_and_receive<R, T>(
        &mut self,
        session: &mut FlowSession,
        value: &T,
    ) -> Result<R, FlowError>
    where
        R: DeserializeOwned,
        T: Serialize + ?Sized,
    {
        self.send(session, value)?;
        self.receive(session).await
    }

    /// Close a session and notify the counterparty
    pub fn close(&mut self, session: &mut FlowSession) {
        self.sessions.close(session);
    }

    async fn receive_payload(&mut self, session: &mut FlowSession) -> Result<Payload, FlowError> {
        self.record.lock().suspend()?;
        self.slot = None;
        trace!(flow_id = %self.instance_id, session_id = %session.id(), "Suspended in receive");

        let received = self.sessions.receive(session).await;

        self.acquire_slot().await?;
        self.record.lock().resume()?;
        trace!(flow_id = %self.instance_id, session_id = %session.id(), "Resumed");
        received
    }
}

/// Refuse work for an instance that was already settled
fn ensure_live(record: &FlowInstance) -> Result<(), FlowError> {
    match record.status {
        FlowStatus::Killed => Err(FlowError::Killed),
        status if status.is_terminal() => Err(FlowError::Internal(format!(
            "Flow instance {} has already finished",
            record.id
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::session_manager::SessionManager;
    use crate::domain::events::NoopEventHandler;
    use crate::domain::overrides::OverrideTable;
    use crate::domain::registry::Registry;
    use crate::domain::resolver::Resolver;
    use crate::domain::session::SessionRole;
    use crate::error::TransportError;
    use crate::transport::Transport;
    use crate::wire::SessionMessage;

    struct CountingTransport {
        peer: PeerId,
        sent: Mutex<usize>,
    }

    impl Transport for CountingTransport {
        fn local_peer(&self) -> &PeerId {
            &self.peer
        }

        fn send(&self, _to: &PeerId, _message: SessionMessage) -> Result<(), TransportError> {
            *self.sent.lock() += 1;
            Ok(())
        }
    }

    fn context() -> (FlowContext, Arc<SessionManager>, Arc<CountingTransport>) {
        let transport = Arc::new(CountingTransport {
            peer: "alice".into(),
            sent: Mutex::new(0),
        });
        let resolver = Resolver::new(Arc::new(Registry::new()), Arc::new(OverrideTable::new()));
        let (sessions, _accepted) =
            SessionManager::new(transport.clone(), resolver, Arc::new(NoopEventHandler));
        let sessions = Arc::new(sessions);
        let record = Arc::new(Mutex::new(FlowInstance::new(
            FlowIdentity::root("Ping"),
            SessionRole::Initiator,
        )));
        let ctx = FlowContext::new(
            record,
            sessions.clone(),
            WorkerPool::new(1),
            Arc::new(Mutex::new(Vec::new())),
        );
        (ctx, sessions, transport)
    }

    #[tokio::test]
    async fn test_initiate_flow_counts_owned_session() {
        let (mut ctx, sessions, transport) = context();
        let session = ctx.initiate_flow("bob").unwrap();

        assert_eq!(ctx.owned.lock().len(), 1);
        assert_eq!(ctx.record.lock().session_count, 1);
        assert_eq!(sessions.session_count(), 1);
        assert_eq!(*transport.sent.lock(), 1);
        drop(session);
    }

    #[tokio::test]
    async fn test_killed_flow_cannot_open_or_send() {
        let (mut ctx, sessions, transport) = context();
        let session = ctx.initiate_flow("bob").unwrap();
        ctx.record.lock().kill().unwrap();

        assert_eq!(ctx.initiate_flow("bob").unwrap_err(), FlowError::Killed);
        assert_eq!(ctx.send(&session, "late").unwrap_err(), FlowError::Killed);
        assert_eq!(ctx.owned.lock().len(), 1);
        assert_eq!(sessions.session_count(), 1);
        assert_eq!(*transport.sent.lock(), 1);
    }

    #[tokio::test]
    async fn test_finished_flow_cannot_open() {
        let (mut ctx, _sessions, _transport) = context();
        ctx.record.lock().complete().unwrap();
        assert!(matches!(
            ctx.initiate_flow("bob"),
            Err(FlowError::Internal(_))
        ));
    }
}
