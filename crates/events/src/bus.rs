//! In-process event bus backed by a `tokio::sync::broadcast` channel.

use chrono::{DateTime, Utc};
use markbatch_core::types::DbId;
use serde::Serialize;
use tokio::sync::broadcast;

/// Event type names emitted by the platform.
pub const EVENT_JOB_COMPLETED: &str = "job.completed";
pub const EVENT_JOB_FAILED: &str = "job.failed";
pub const EVENT_ASSIGNMENT_ASSIGNED: &str = "assignment.assigned";
pub const EVENT_ASSIGNMENT_DOWNLOADED: &str = "assignment.downloaded";
pub const EVENT_ASSIGNMENT_WORKING: &str = "assignment.working";
pub const EVENT_ASSIGNMENT_FINISHED: &str = "assignment.finished";

/// A notification-worthy transition on a job.
#[derive(Debug, Clone, Serialize)]
pub struct JobEvent {
    /// Dot-separated event name, e.g. `"job.completed"`.
    pub event_type: String,
    /// The job the event concerns.
    pub job_id: DbId,
    /// Who should be notified.
    pub recipient_id: DbId,
    /// Human-readable notification message.
    pub message: String,
    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    pub fn new(
        event_type: impl Into<String>,
        job_id: DbId,
        recipient_id: DbId,
        message: impl Into<String>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            job_id,
            recipient_id,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`JobEvent`]. Shared via
/// `Arc<EventBus>` across the application.
pub struct EventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are
    /// dropped and slow receivers observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: JobEvent) {
        // Ignore the SendError -- it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
