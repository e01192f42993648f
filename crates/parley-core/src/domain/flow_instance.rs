use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::identity::FlowIdentity;
use crate::domain::session::SessionRole;
use crate::error::FlowError;

/// Value object: Flow Instance ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowInstanceId(pub Uuid);

impl FlowInstanceId {
    /// Allocate a fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FlowInstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FlowInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Flow instance status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowStatus {
    /// Flow is executing on a worker
    Running,

    /// Flow is waiting in `receive` and holds no worker
    Suspended,

    /// Flow logic returned a result
    Completed,

    /// Flow logic returned an error, panicked or timed out
    Failed,

    /// Flow was killed externally
    Killed,
}

impl FlowStatus {
    /// Whether the flow has finished
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FlowStatus::Completed | FlowStatus::Failed | FlowStatus::Killed
        )
    }
}

/// Record of one running execution of a flow's logic
#[derive(Debug, Clone)]
pub struct FlowInstance {
    /// Unique identifier
    pub id: FlowInstanceId,

    /// Identity of the flow being executed
    pub identity: FlowIdentity,

    /// Whether the instance was started locally or accepted a session
    pub role: SessionRole,

    /// Current status
    pub status: FlowStatus,

    /// Number of sessions opened or accepted by this instance
    pub session_count: usize,

    /// Error message if the flow failed
    pub error: Option<String>,

    /// Creation timestamp
    pub started_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl FlowInstance {
    /// Create a new running flow instance
    pub fn new(identity: FlowIdentity, role: SessionRole) -> Self {
        let now = Utc::now();
        Self {
            id: FlowInstanceId::new(),
            identity,
            role,
            status: FlowStatus::Running,
            session_count: 0,
            error: None,
            started_at: now,
            updated_at: now,
        }
    }

    /// Park the instance while it waits for a payload
    pub fn suspend(&mut self) -> Result<(), FlowError> {
        self.transition(FlowStatus::Running, FlowStatus::Suspended)
    }

    /// Resume after a payload or session end was delivered
    pub fn resume(&mut self) -> Result<(), FlowError> {
        self.transition(FlowStatus::Suspended, FlowStatus::Running)
    }

    /// Count a newly opened or accepted session
    pub fn add_session(&mut self) {
        self.session_count += 1;
        self.update_timestamp();
    }

    /// Mark the instance completed
    pub fn complete(&mut self) -> Result<(), FlowError> {
        self.finish(FlowStatus::Completed, None)
    }

    /// Mark the instance failed
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), FlowError> {
        self.finish(FlowStatus::Failed, Some(error.into()))
    }

    /// Mark the instance killed
    pub fn kill(&mut self) -> Result<(), FlowError> {
        self.finish(FlowStatus::Killed, None)
    }

    /// Snapshot for listing
    pub fn summary(&self) -> FlowInstanceSummary {
        FlowInstanceSummary {
            id: self.id,
            identity: self.identity.clone(),
            role: self.role,
            status: self.status,
            session_count: self.session_count,
            started_at: self.started_at,
        }
    }

    #[inline]
    fn update_timestamp(&mut self) {
        self.updated_at = Utc::now();
    }

    fn transition(&mut self, from: FlowStatus, to: FlowStatus) -> Result<(), FlowError> {
        if self.status != from {
            return Err(FlowError::Internal(format!(
                "Cannot move flow {} from {:?} to {:?}",
                self.id, self.status, to
            )));
        }
        self.status = to;
        self.update_timestamp();
        Ok(())
    }

    fn finish(&mut self, status: FlowStatus, error: Option<String>) -> Result<(), FlowError> {
        if self.status.is_terminal() {
            return Err(FlowError::Internal(format!(
                "Flow {} already finished as {:?}",
                self.id, self.status
            )));
        }
        self.status = status;
        self.error = error;
        self.update_timestamp();
        Ok(())
    }
}

/// Read-only view of a flow instance returned by `list_flows`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowInstanceSummary {
    /// Instance id
    pub id: FlowInstanceId,
    /// Identity of the running flow
    pub identity: FlowIdentity,
    /// Initiator or responder
    pub role: SessionRole,
    /// Status at the time of the snapshot
    pub status: FlowStatus,
    /// Sessions opened or accepted so far
    pub session_count: usize,
    /// When the instance started
    pub started_at: DateTime<Utc>,
}
