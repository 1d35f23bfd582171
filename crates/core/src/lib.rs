//! Pure domain logic for the markbatch platform.
//!
//! No I/O lives here: shared id/timestamp types, the error taxonomy,
//! serial-number validation, the result filtering policy, and the
//! progress flush arithmetic used by the dispatch engine.

pub mod error;
pub mod filtering;
pub mod progress;
pub mod serial;
pub mod types;
