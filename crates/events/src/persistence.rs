//! Durable notification persistence.
//!
//! [`NotificationPersistence`] subscribes to the [`EventBus`](crate::bus::EventBus)
//! broadcast channel and writes every received [`JobEvent`] to the
//! `notifications` table. It runs as a long-lived background task and
//! shuts down when the bus sender is dropped.

use markbatch_db::repositories::NotificationRepo;
use markbatch_db::DbPool;
use tokio::sync::broadcast;

use crate::bus::JobEvent;

/// Background service that persists job events as notifications.
pub struct NotificationPersistence;

impl NotificationPersistence {
    /// Run the persistence loop.
    ///
    /// The loop exits when the channel is closed (the
    /// [`EventBus`](crate::bus::EventBus) is dropped). Persistence
    /// failures are logged and never propagate back to the publisher.
    pub async fn run(pool: DbPool, mut receiver: broadcast::Receiver<JobEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let created = NotificationRepo::create(
                        &pool,
                        event.recipient_id,
                        Some(event.job_id),
                        &event.event_type,
                        &event.message,
                    )
                    .await;

                    if let Err(e) = created {
                        tracing::error!(
                            error = %e,
                            event_type = %event.event_type,
                            job_id = event.job_id,
                            "Failed to persist notification",
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(
                        skipped = n,
                        "Notification persistence lagged, some events were not persisted",
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, notification persistence shutting down");
                    break;
                }
            }
        }
    }
}
