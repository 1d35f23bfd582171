//! Status notification plumbing.
//!
//! Lifecycle and workflow transitions publish [`bus::JobEvent`]s on an
//! in-process broadcast bus; [`persistence::NotificationPersistence`]
//! subscribes and writes durable notification records. Publishing is
//! fire-and-forget from the caller's perspective: a failure to persist a
//! notification is logged and never rolls back the transition that
//! triggered it.

pub mod bus;
pub mod persistence;

pub use bus::{EventBus, JobEvent};
pub use persistence::NotificationPersistence;
