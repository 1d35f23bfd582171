//! The job dispatch engine: one global sequential worker, throttled
//! progress persistence, and stalled-job recovery.

pub mod dispatcher;
pub mod progress;
pub mod stall;
