//! HTTP adapter for the external trademark registry.
//!
//! [`client::RegistryClient`] is the only component in the system that
//! talks to the registry. It performs one lookup at a time, enforces the
//! configured requests-per-minute ceiling between calls via
//! [`pacer::Pacer`], and classifies every outcome so the dispatch engine
//! never has to interpret raw HTTP.

pub mod client;
pub mod error;
pub mod pacer;
pub mod record;

pub use client::{LookupOutcome, RegistryClient, RegistryConfig};
pub use error::RegistryError;
pub use record::TrademarkRecord;
