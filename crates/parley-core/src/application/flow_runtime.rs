//! Flow instance execution.
//!
//! Every instance runs as its own tokio task. Completion, failure, panics,
//! timeouts and kills all converge on [`RuntimeInner::finish`]; whichever
//! path removes the instance from the table first decides the outcome.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use crate::application::context::{FlowContext, OwnedSessions};
use crate::application::session_manager::{AcceptedSession, SessionManager};
use crate::application::worker_pool::{WorkerPool, WorkerPoolStats};
use crate::domain::events::{
    DomainEventHandler, FlowCompleted, FlowFailed, FlowKilled, FlowStarted,
};
use crate::domain::flow_instance::{FlowInstance, FlowInstanceId, FlowInstanceSummary};
use crate::domain::identity::{FlowIdentity, FlowName};
use crate::domain::registry::Registry;
use crate::domain::session::{CloseReason, FlowSession, SessionCore, SessionRole};
use crate::error::{FlowError, NodeError};
use crate::types::Payload;

/// Outcome of a flow instance
pub type FlowResult = Result<Payload, FlowError>;

/// Logic of one flow, initiator or responder
#[async_trait]
pub trait FlowLogic: Send {
    /// Run the flow to completion
    async fn call(&mut self, ctx: &mut FlowContext) -> Result<Payload, FlowError>;
}

/// Builds responder logic for an accepted session
pub type ResponderFactory = Arc<dyn Fn(FlowSession) -> Box<dyn FlowLogic> + Send + Sync>;

/// Wrap a closure returning concrete logic into a [`ResponderFactory`]
pub fn responder_factory<F, L>(factory: F) -> ResponderFactory
where
    F: Fn(FlowSession) -> L + Send + Sync + 'static,
    L: FlowLogic + 'static,
{
    Arc::new(move |session| Box::new(factory(session)) as Box<dyn FlowLogic>)
}

/// Responder logic installed on a node, by responder name
#[derive(Clone, Default)]
pub struct FlowCatalog {
    responders: HashMap<FlowName, ResponderFactory>,
}

impl FlowCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the factory for a responder
    pub fn insert(&mut self, responder: FlowName, factory: ResponderFactory) {
        self.responders.insert(responder, factory);
    }

    /// Factory for a responder
    pub fn get(&self, responder: &FlowName) -> Option<&ResponderFactory> {
        self.responders.get(responder)
    }

    /// Whether a responder has logic installed
    pub fn contains(&self, responder: &FlowName) -> bool {
        self.responders.contains_key(responder)
    }

    /// Number of installed responders
    pub fn len(&self) -> usize {
        self.responders.len()
    }

    /// Whether no responder is installed
    pub fn is_empty(&self) -> bool {
        self.responders.is_empty()
    }
}

impl fmt::Debug for FlowCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.responders.keys().collect();
        names.sort();
        f.debug_struct("FlowCatalog")
            .field("responders", &names)
            .finish()
    }
}

/// Handle to a started flow
#[derive(Debug)]
pub struct FlowHandle {
    id: FlowInstanceId,
    result: oneshot::Receiver<FlowResult>,
}

impl FlowHandle {
    /// Id of the started instance
    pub fn id(&self) -> FlowInstanceId {
        self.id
    }

    /// Wait for the flow's result
    pub async fn result(self) -> FlowResult {
        self.result
            .await
            .unwrap_or_else(|_| Err(FlowError::Internal("Flow runtime shut down".to_string())))
    }

    /// Wait for the flow's result decoded as `T`
    pub async fn result_as<T: DeserializeOwned>(self) -> Result<T, FlowError> {
        let payload = self.result().await?;
        Ok(payload.decode()?)
    }
}

struct InstanceEntry {
    record: Arc<Mutex<FlowInstance>>,
    owned: OwnedSessions,
    abort: AbortHandle,
    result: oneshot::Sender<FlowResult>,
}

struct RuntimeInner {
    registry: Arc<Registry>,
    sessions: Arc<SessionManager>,
    catalog: FlowCatalog,
    pool: WorkerPool,
    timeout: Option<Duration>,
    instances: DashMap<FlowInstanceId, InstanceEntry>,
    events: Arc<dyn DomainEventHandler>,
}

/// Runs initiator and responder flow instances
#[derive(Clone)]
pub struct FlowRuntime {
    inner: Arc<RuntimeInner>,
    dispatcher: Arc<Mutex<Option<AbortHandle>>>,
}

impl FlowRuntime {
    /// Create a runtime and start dispatching accepted sessions.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        registry: Arc<Registry>,
        sessions: Arc<SessionManager>,
        catalog: FlowCatalog,
        pool: WorkerPool,
        timeout: Option<Duration>,
        events: Arc<dyn DomainEventHandler>,
        accepted: mpsc::UnboundedReceiver<AcceptedSession>,
    ) -> Self {
        let inner = Arc::new(RuntimeInner {
            registry,
            sessions,
            catalog,
            pool,
            timeout,
            instances: DashMap::new(),
            events,
        });
        let dispatcher = tokio::spawn(dispatch(Arc::downgrade(&inner), accepted));
        Self {
            inner,
            dispatcher: Arc::new(Mutex::new(Some(dispatcher.abort_handle()))),
        }
    }

    /// Start a declared flow as an initiator
    pub fn start_flow<L>(
        &self,
        name: impl Into<FlowName>,
        logic: L,
    ) -> Result<FlowHandle, FlowError>
    where
        L: FlowLogic + 'static,
    {
        let name = name.into();
        let identity = self
            .inner
            .registry
            .identity(&name)
            .ok_or(FlowError::UnknownFlow(name))?;
        Ok(self
            .inner
            .launch(identity, SessionRole::Initiator, Box::new(logic), Vec::new()))
    }

    /// Kill a running flow: its sessions are ended and its handle resolves
    /// with [`FlowError::Killed`]
    pub fn kill_flow(&self, id: FlowInstanceId) -> Result<(), NodeError> {
        let (_, entry) = self
            .inner
            .instances
            .remove(&id)
            .ok_or(NodeError::FlowInstanceNotFound(id))?;
        entry.abort.abort();
        self.inner.settle(entry, Err(FlowError::Killed));
        Ok(())
    }

    /// Snapshot of running flows, oldest first
    pub fn list_flows(&self) -> Vec<FlowInstanceSummary> {
        let mut flows: Vec<_> = self
            .inner
            .instances
            .iter()
            .map(|entry| entry.record.lock().summary())
            .collect();
        flows.sort_by_key(|summary| summary.started_at);
        flows
    }

    /// Worker pool statistics
    pub fn pool_stats(&self) -> WorkerPoolStats {
        self.inner.pool.stats()
    }

    /// Stop dispatching, kill every running flow and close the worker pool
    pub fn shutdown(&self) {
        if let Some(dispatcher) = self.dispatcher.lock().take() {
            dispatcher.abort();
        }
        let ids: Vec<_> = self.inner.instances.iter().map(|e| *e.key()).collect();
        for id in ids {
            // Instances may finish on their own while we iterate
            let _ = self.kill_flow(id);
        }
        self.inner.pool.close();
        info!(peer = %self.inner.sessions.local_peer(), "Flow runtime shut down");
    }
}

async fn dispatch(
    runtime: Weak<RuntimeInner>,
    mut accepted: mpsc::UnboundedReceiver<AcceptedSession>,
) {
    while let Some(AcceptedSession { responder, session }) = accepted.recv().await {
        let Some(runtime) = runtime.upgrade() else {
            break;
        };
        runtime.launch_responder(responder, session);
    }
    debug!("Session dispatcher stopped");
}

impl RuntimeInner {
    fn launch_responder(self: &Arc<Self>, responder: FlowIdentity, session: FlowSession) {
        let core = session.core().clone();
        let Some(factory) = self.catalog.get(responder.name()) else {
            error!(responder = %responder, "No logic installed for resolved responder");
            self.sessions.end(
                &core,
                CloseReason::Failed {
                    message: format!("Responder {} has no flow logic installed", responder),
                },
            );
            return;
        };
        let logic = factory(session);
        self.launch(responder, SessionRole::Responder, logic, vec![core]);
    }

    fn launch(
        self: &Arc<Self>,
        identity: FlowIdentity,
        role: SessionRole,
        logic: Box<dyn FlowLogic>,
        sessions: Vec<Arc<SessionCore>>,
    ) -> FlowHandle {
        let mut instance = FlowInstance::new(identity.clone(), role);
        for _ in &sessions {
            instance.add_session();
        }
        let id = instance.id;
        let record = Arc::new(Mutex::new(instance));
        let owned: OwnedSessions = Arc::new(Mutex::new(sessions));
        let ctx = FlowContext::new(
            record.clone(),
            self.sessions.clone(),
            self.pool.clone(),
            owned.clone(),
        );

        let (start_tx, start_rx) = oneshot::channel::<()>();
        let (result_tx, result_rx) = oneshot::channel();
        let runtime = self.clone();
        let task = tokio::spawn(async move {
            if start_rx.await.is_err() {
                return;
            }
            let result = runtime.run(ctx, logic).await;
            runtime.finish(id, result);
        });

        self.instances.insert(
            id,
            InstanceEntry {
                record,
                owned,
                abort: task.abort_handle(),
                result: result_tx,
            },
        );

        info!(flow_id = %id, flow = %identity, ?role, "Started flow");
        self.events.handle_event(Box::new(FlowStarted {
            flow_instance_id: id,
            identity,
            role,
            timestamp: Utc::now(),
        }));

        let _ = start_tx.send(());
        FlowHandle {
            id,
            result: result_rx,
        }
    }

    async fn run(&self, mut ctx: FlowContext, mut logic: Box<dyn FlowLogic>) -> FlowResult {
        ctx.acquire_slot().await?;

        let call = AssertUnwindSafe(logic.call(&mut ctx)).catch_unwind();
        let outcome = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(FlowError::TimedOut {
                        after_secs: timeout.as_secs(),
                    })
                }
            },
            None => call.await,
        };

        outcome.unwrap_or_else(|panic| {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(FlowError::Internal(format!("Flow logic panicked: {}", message)))
        })
    }

    fn finish(&self, id: FlowInstanceId, result: FlowResult) {
        if let Some((_, entry)) = self.instances.remove(&id) {
            self.settle(entry, result);
        }
    }

    /// End the instance's sessions, record the outcome and resolve its handle
    fn settle(&self, entry: InstanceEntry, result: FlowResult) {
        let reason = match &result {
            Ok(_) => CloseReason::Completed,
            Err(FlowError::Killed) | Err(FlowError::TimedOut { .. }) => CloseReason::Killed,
            Err(e) => CloseReason::Failed {
                message: e.to_string(),
            },
        };

        // Settle the record first: a context that sees it terminal opens no more sessions
        let (id, identity) = {
            let mut record = entry.record.lock();
            let transition = match &result {
                Ok(_) => record.complete(),
                Err(FlowError::Killed) | Err(FlowError::TimedOut { .. }) => record.kill(),
                Err(e) => record.fail(e.to_string()),
            };
            if let Err(e) = transition {
                warn!(flow_id = %record.id, error = %e, "Unexpected flow state at finish");
            }
            (record.id, record.identity.clone())
        };

        let owned: Vec<_> = entry.owned.lock().drain(..).collect();
        for core in &owned {
            self.sessions.end(core, reason.clone());
        }

        let timestamp = Utc::now();
        match &result {
            Ok(_) => {
                info!(flow_id = %id, flow = %identity, "Flow completed");
                self.events.handle_event(Box::new(FlowCompleted {
                    flow_instance_id: id,
                    identity,
                    timestamp,
                }));
            }
            Err(FlowError::Killed) | Err(FlowError::TimedOut { .. }) => {
                warn!(flow_id = %id, flow = %identity, "Flow killed");
                self.events.handle_event(Box::new(FlowKilled {
                    flow_instance_id: id,
                    identity,
                    timestamp,
                }));
            }
            Err(e) => {
                warn!(flow_id = %id, flow = %identity, error = %e, "Flow failed");
                self.events.handle_event(Box::new(FlowFailed {
                    flow_instance_id: id,
                    identity,
                    error: e.to_string(),
                    remote: e.is_remote_failure(),
                    timestamp,
                }));
            }
        }

        // The caller may have dropped the handle
        let _ = entry.result.send(result);
    }
}
