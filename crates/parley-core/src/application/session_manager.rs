//! Session lifecycle and message routing for one node.
//!
//! Outbound operations come from flow contexts; inbound envelopes arrive
//! through [`MessageHandler::handle`] from the transport pump. The routing
//! table only holds weak references, except for sessions that were closed
//! while still pending: those are kept alive until the counterparty answers
//! so buffered payloads can be flushed, or until [`PENDING_CLOSE_TIMEOUT`]
//! passes without an answer.

use chrono::Utc;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::domain::events::{
    DomainEventHandler, SessionAccepted, SessionEnded, SessionOpened, SessionRejected,
};
use crate::domain::identity::FlowIdentity;
use crate::domain::resolver::Resolver;
use crate::domain::session::{
    CloseReason, FlowSession, PeerId, SessionCore, SessionEvent, SessionId, SessionLifecycle,
    SessionRole, SessionState,
};
use crate::error::{FlowError, ResolutionError, TransportError};
use crate::transport::{MessageHandler, Transport};
use crate::types::Payload;
use crate::wire::{Envelope, SessionMessage};

/// How long a session closed before confirmation waits for the counterparty
pub const PENDING_CLOSE_TIMEOUT: Duration = Duration::from_secs(30);

/// A session-open that resolved to a local responder, waiting to be run
#[derive(Debug)]
pub struct AcceptedSession {
    /// Responder chosen by resolution
    pub responder: FlowIdentity,

    /// The responder's end of the session
    pub session: FlowSession,
}

#[derive(Debug, Clone)]
enum Route {
    Owned(Weak<SessionCore>),
    Closing(Arc<SessionCore>),
}

/// Owns session lifecycles and multiplexes them over the transport
pub struct SessionManager {
    transport: Arc<dyn Transport>,
    resolver: Resolver,
    routes: Arc<DashMap<SessionId, Route>>,
    accepted: mpsc::UnboundedSender<AcceptedSession>,
    events: Arc<dyn DomainEventHandler>,
}

impl SessionManager {
    /// Create a session manager.
    ///
    /// Accepted session-opens are handed out on the returned receiver.
    pub fn new(
        transport: Arc<dyn Transport>,
        resolver: Resolver,
        events: Arc<dyn DomainEventHandler>,
    ) -> (Self, mpsc::UnboundedReceiver<AcceptedSession>) {
        let (accepted, accepted_rx) = mpsc::unbounded_channel();
        let manager = Self {
            transport,
            resolver,
            routes: Arc::new(DashMap::new()),
            accepted,
            events,
        };
        (manager, accepted_rx)
    }

    /// The peer this manager sends as
    pub fn local_peer(&self) -> &PeerId {
        self.transport.local_peer()
    }

    /// The resolver consulted for inbound session-opens
    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Number of sessions currently routable
    pub fn session_count(&self) -> usize {
        self.routes.retain(|_, route| match route {
            Route::Owned(weak) => weak.strong_count() > 0,
            Route::Closing(_) => true,
        });
        self.routes.len()
    }

    /// Open a session from `initiator` to `peer`.
    ///
    /// The returned session is `Pending` until the peer confirms.
    pub fn open(&self, initiator: &FlowIdentity, peer: &PeerId) -> Result<FlowSession, FlowError> {
        let session = FlowSession::new(
            peer.clone(),
            SessionRole::Initiator,
            initiator.clone(),
            SessionState {
                lifecycle: SessionLifecycle::Pending,
                counterparty_session: None,
                responder: None,
                buffered: Vec::new(),
                close_on_confirm: None,
            },
        );
        let session_id = session.id();
        self.routes
            .insert(session_id, Route::Owned(Arc::downgrade(session.core())));

        let init = SessionMessage::Init {
            initiator_session_id: session_id,
            initiator: initiator.clone(),
        };
        if let Err(e) = self.transmit(peer, init) {
            self.routes.remove(&session_id);
            return Err(e.into());
        }

        debug!(%session_id, %peer, initiator = %initiator, "Opened session");
        self.events.handle_event(Box::new(SessionOpened {
            session_id,
            peer: peer.clone(),
            initiator: initiator.clone(),
            timestamp: Utc::now(),
        }));
        Ok(session)
    }

    /// Send a payload on a session.
    ///
    /// Payloads sent while the session is pending are buffered and flushed in
    /// order once the counterparty confirms.
    pub fn send(&self, session: &FlowSession, payload: Payload) -> Result<(), FlowError> {
        let core = session.core();
        let closed = FlowError::SessionClosed {
            session_id: core.id,
        };

        let mut state = core.state.lock();
        match state.lifecycle {
            SessionLifecycle::Pending => {
                trace!(session_id = %core.id, "Buffering payload until session is confirmed");
                state.buffered.push(payload);
                Ok(())
            }
            SessionLifecycle::Active => {
                let counterparty = state.counterparty_session.ok_or_else(|| {
                    FlowError::Internal("Active session has no counterparty".to_string())
                })?;
                self.transmit(
                    &core.peer,
                    SessionMessage::Data {
                        session_id: counterparty,
                        payload,
                    },
                )?;
                Ok(())
            }
            _ => Err(closed),
        }
    }

    /// Wait for the next payload on a session
    pub async fn receive(&self, session: &mut FlowSession) -> Result<Payload, FlowError> {
        session.next_payload().await
    }

    /// Close a session and notify the counterparty
    pub fn close(&self, session: &mut FlowSession) {
        self.end(session.core(), CloseReason::Closed);
        session.mark_ended(CloseReason::Closed);
    }

    /// End a session with `reason`. Ending a closed session is a no-op.
    pub(crate) fn end(&self, core: &Arc<SessionCore>, reason: CloseReason) {
        let mut state = core.state.lock();
        let lifecycle = state.lifecycle;
        match lifecycle {
            SessionLifecycle::Closed => {}
            SessionLifecycle::Pending => {
                debug!(session_id = %core.id, ?reason, "Session closed before confirmation");
                state.lifecycle = SessionLifecycle::Closed;
                state.close_on_confirm = Some(reason);
                self.routes.insert(core.id, Route::Closing(core.clone()));
                drop(state);
                self.expire_closing(core.id);
            }
            SessionLifecycle::Active => {
                state.lifecycle = SessionLifecycle::Closed;
                if let Some(counterparty) = state.counterparty_session {
                    let end = SessionMessage::End {
                        session_id: counterparty,
                        reason: reason.clone(),
                    };
                    if let Err(e) = self.transmit(&core.peer, end) {
                        warn!(
                            session_id = %core.id,
                            error = %e,
                            "Failed to notify counterparty of session end"
                        );
                    }
                }
                drop(state);
                self.routes.remove(&core.id);
                self.ended(core, reason);
            }
        }
    }

    /// Server-side entry point for a session-open
    pub fn on_session_open_received(
        &self,
        from: &PeerId,
        initiator_session_id: SessionId,
        initiator: FlowIdentity,
    ) {
        let responder = match self.resolver.resolve(initiator.name()) {
            Ok(responder) => responder,
            Err(error) => {
                self.reject(from, initiator_session_id, &initiator, error);
                return;
            }
        };

        let session = FlowSession::new(
            from.clone(),
            SessionRole::Responder,
            initiator.clone(),
            SessionState {
                lifecycle: SessionLifecycle::Active,
                counterparty_session: Some(initiator_session_id),
                responder: Some(responder.clone()),
                buffered: Vec::new(),
                close_on_confirm: None,
            },
        );
        let session_id = session.id();
        self.routes
            .insert(session_id, Route::Owned(Arc::downgrade(session.core())));

        let confirm = SessionMessage::Confirm {
            initiator_session_id,
            responder_session_id: session_id,
            responder: responder.clone(),
        };
        if let Err(e) = self.transmit(from, confirm) {
            warn!(%session_id, peer = %from, error = %e, "Failed to confirm session");
            self.routes.remove(&session_id);
            return;
        }

        info!(
            %session_id,
            peer = %from,
            initiator = %initiator,
            responder = %responder,
            "Accepted session"
        );
        self.events.handle_event(Box::new(SessionAccepted {
            session_id,
            peer: from.clone(),
            initiator,
            responder: responder.clone(),
            timestamp: Utc::now(),
        }));

        if let Err(mpsc::error::SendError(accepted)) =
            self.accepted.send(AcceptedSession { responder, session })
        {
            warn!(%session_id, "Flow runtime is not accepting sessions");
            self.end(accepted.session.core(), CloseReason::Killed);
        }
    }

    fn reject(
        &self,
        from: &PeerId,
        initiator_session_id: SessionId,
        initiator: &FlowIdentity,
        error: ResolutionError,
    ) {
        warn!(peer = %from, initiator = %initiator, error = %error, "Rejecting session-open");
        self.events.handle_event(Box::new(SessionRejected {
            peer: from.clone(),
            initiator: initiator.name().clone(),
            error: error.clone(),
            timestamp: Utc::now(),
        }));

        let reject = SessionMessage::Reject {
            initiator_session_id,
            error,
        };
        if let Err(e) = self.transmit(from, reject) {
            warn!(peer = %from, error = %e, "Failed to send session rejection");
        }
    }

    fn on_confirm(
        &self,
        from: &PeerId,
        initiator_session_id: SessionId,
        responder_session_id: SessionId,
        responder: FlowIdentity,
    ) {
        let Some(core) = self.route(&initiator_session_id) else {
            warn!(session_id = %initiator_session_id, peer = %from, "Confirm for unknown session");
            let end = SessionMessage::End {
                session_id: responder_session_id,
                reason: CloseReason::Closed,
            };
            if let Err(e) = self.transmit(from, end) {
                warn!(peer = %from, error = %e, "Failed to end orphaned session");
            }
            return;
        };

        let mut state = core.state.lock();
        let closing = state.close_on_confirm.is_some();
        if state.lifecycle != SessionLifecycle::Pending && !closing {
            warn!(session_id = %core.id, "Ignoring confirm for session that is not pending");
            return;
        }
        debug!(session_id = %core.id, responder = %responder, "Session confirmed");
        if !closing {
            state.lifecycle = SessionLifecycle::Active;
        }
        state.counterparty_session = Some(responder_session_id);
        state.responder = Some(responder);

        for payload in std::mem::take(&mut state.buffered) {
            let data = SessionMessage::Data {
                session_id: responder_session_id,
                payload,
            };
            if let Err(e) = self.transmit(&core.peer, data) {
                warn!(session_id = %core.id, error = %e, "Failed to flush buffered payload");
            }
        }

        if let Some(reason) = state.close_on_confirm.take() {
            let end = SessionMessage::End {
                session_id: responder_session_id,
                reason: reason.clone(),
            };
            if let Err(e) = self.transmit(&core.peer, end) {
                warn!(
                    session_id = %core.id,
                    error = %e,
                    "Failed to notify counterparty of session end"
                );
            }
            drop(state);
            self.routes.remove(&core.id);
            self.ended(&core, reason);
        }
    }

    fn on_reject(&self, initiator_session_id: SessionId, error: ResolutionError) {
        let Some(core) = self.route(&initiator_session_id) else {
            debug!(session_id = %initiator_session_id, "Reject for unknown session");
            return;
        };

        let mut state = core.state.lock();
        if state.lifecycle != SessionLifecycle::Pending && state.close_on_confirm.is_none() {
            return;
        }
        warn!(session_id = %core.id, error = %error, "Session-open rejected by counterparty");
        state.lifecycle = SessionLifecycle::Closed;
        state.buffered.clear();
        state.close_on_confirm = None;
        drop(state);

        self.routes.remove(&core.id);
        let reason = CloseReason::Rejected { error };
        core.push(SessionEvent::Ended(reason.clone()));
        self.ended(&core, reason);
    }

    fn on_data(&self, from: &PeerId, session_id: SessionId, payload: Payload) {
        let Some(core) = self.route(&session_id) else {
            warn!(%session_id, peer = %from, "Dropping payload for unknown session");
            return;
        };
        if core.lifecycle() != SessionLifecycle::Active {
            warn!(%session_id, "Dropping payload for inactive session");
            return;
        }
        trace!(%session_id, "Delivering payload");
        core.push(SessionEvent::Data(payload));
    }

    fn on_end(&self, session_id: SessionId, reason: CloseReason) {
        let Some(core) = self.route(&session_id) else {
            return;
        };

        let mut state = core.state.lock();
        if state.lifecycle == SessionLifecycle::Closed {
            return;
        }
        state.lifecycle = SessionLifecycle::Closed;
        state.buffered.clear();
        drop(state);

        debug!(%session_id, ?reason, "Counterparty ended session");
        self.routes.remove(&session_id);
        core.push(SessionEvent::Ended(reason.clone()));
        self.ended(&core, reason);
    }

    fn route(&self, session_id: &SessionId) -> Option<Arc<SessionCore>> {
        let route = self.routes.get(session_id).map(|r| r.value().clone())?;
        match route {
            Route::Closing(core) => Some(core),
            Route::Owned(weak) => {
                let core = weak.upgrade();
                if core.is_none() {
                    self.routes.remove(session_id);
                }
                core
            }
        }
    }

    fn ended(&self, core: &SessionCore, reason: CloseReason) {
        self.events.handle_event(Box::new(SessionEnded {
            session_id: core.id,
            peer: core.peer.clone(),
            reason,
            timestamp: Utc::now(),
        }));
    }

    /// Forget a session closed while pending if the counterparty never answers
    fn expire_closing(&self, session_id: SessionId) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(%session_id, "No runtime to expire closed pending session");
            return;
        };
        let routes = Arc::downgrade(&self.routes);
        runtime.spawn(async move {
            tokio::time::sleep(PENDING_CLOSE_TIMEOUT).await;
            let Some(routes) = routes.upgrade() else {
                return;
            };
            let expired =
                routes.remove_if(&session_id, |_, route| matches!(route, Route::Closing(_)));
            if expired.is_some() {
                warn!(%session_id, "Counterparty never answered, dropping closed session");
            }
        });
    }

    fn transmit(&self, to: &PeerId, message: SessionMessage) -> Result<(), TransportError> {
        trace!(peer = %to, kind = message.kind(), session_id = ?message.session_id(), "Sending");
        self.transport.send(to, message)
    }
}

impl MessageHandler for SessionManager {
    fn handle(&self, envelope: Envelope) {
        let Envelope { from, message } = envelope;
        trace!(peer = %from, kind = message.kind(), "Received");
        match message {
            SessionMessage::Init {
                initiator_session_id,
                initiator,
            } => self.on_session_open_received(&from, initiator_session_id, initiator),
            SessionMessage::Confirm {
                initiator_session_id,
                responder_session_id,
                responder,
            } => self.on_confirm(&from, initiator_session_id, responder_session_id, responder),
            SessionMessage::Reject {
                initiator_session_id,
                error,
            } => self.on_reject(initiator_session_id, error),
            SessionMessage::Data {
                session_id,
                payload,
            } => self.on_data(&from, session_id, payload),
            SessionMessage::End { session_id, reason } => self.on_end(session_id, reason),
        }
    }
}
