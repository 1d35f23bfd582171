//! HTTP handlers, grouped by resource.

pub mod assignments;
pub mod jobs;
pub mod notifications;
