use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::trace;

use crate::error::FlowError;

/// Statistics for the worker pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerPoolStats {
    /// Flows currently holding a worker slot
    pub active: usize,
    /// Slots in the pool
    pub max_concurrent: usize,
}

/// Bounds how many flow instances execute at once.
///
/// A flow holds a [`WorkerSlot`] while it runs and gives it back while it is
/// suspended waiting for a payload.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

/// A held worker-pool slot; released on drop
#[derive(Debug)]
pub struct WorkerSlot {
    _permit: OwnedSemaphorePermit,
}

impl WorkerPool {
    /// Create a pool with `max_concurrent` slots
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// Wait for a free slot
    pub async fn acquire(&self) -> Result<WorkerSlot, FlowError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| FlowError::Internal("Worker pool is closed".to_string()))?;
        trace!(active = self.active(), max = self.max_concurrent, "Acquired worker slot");
        Ok(WorkerSlot { _permit: permit })
    }

    /// Stop handing out slots; pending and future acquires fail
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// Number of slots currently held
    pub fn active(&self) -> usize {
        self.max_concurrent
            .saturating_sub(self.semaphore.available_permits())
    }

    /// Current statistics
    pub fn stats(&self) -> WorkerPoolStats {
        WorkerPoolStats {
            active: self.active(),
            max_concurrent: self.max_concurrent,
        }
    }
}
