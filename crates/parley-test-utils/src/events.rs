//! A domain-event handler that remembers what it saw.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

use parley_core::{DomainEvent, DomainEventHandler};

use crate::error::TestError;

/// One recorded domain event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    /// Event type, e.g. `session.rejected`
    pub event_type: &'static str,
    /// Event labels
    pub labels: Vec<(&'static str, String)>,
}

impl RecordedEvent {
    /// Value of a label, if present
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Records every event in arrival order
#[derive(Debug, Default)]
pub struct RecordingEventHandler {
    events: Mutex<Vec<RecordedEvent>>,
    notify: Notify,
}

impl RecordingEventHandler {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }

    /// Event types recorded so far
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(|e| e.event_type).collect()
    }

    /// Number of events of `event_type`
    pub fn count(&self, event_type: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    /// Wait until at least `n` events of `event_type` were recorded
    pub async fn wait_for(
        &self,
        event_type: &str,
        n: usize,
        timeout: Duration,
    ) -> Result<(), TestError> {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                if self.count(event_type) >= n {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.map_err(|_| {
            TestError::Timeout(format!(
                "expected {} {} event(s), saw {}",
                n,
                event_type,
                self.count(event_type)
            ))
        })
    }
}

impl DomainEventHandler for RecordingEventHandler {
    fn handle_event(&self, event: Box<dyn DomainEvent>) {
        self.events.lock().push(RecordedEvent {
            event_type: event.event_type(),
            labels: event.labels(),
        });
        self.notify.notify_waiters();
    }
}
