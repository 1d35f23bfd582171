use std::sync::Arc;

use markbatch_cache::ResultCache;
use markbatch_events::EventBus;
use markbatch_registry::RegistryClient;

use crate::config::ServerConfig;
use crate::engine::progress::ProgressLedger;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool (the authoritative job store).
    pub pool: markbatch_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// TTL-bounded snapshot cache for the polling read path.
    pub cache: Arc<ResultCache>,
    /// Rate-limited registry client (health probe; lookups run in the
    /// dispatcher).
    pub registry: Arc<RegistryClient>,
    /// Event bus for lifecycle/workflow notifications.
    pub event_bus: Arc<EventBus>,
    /// Live in-memory progress for jobs currently being processed.
    pub ledger: Arc<ProgressLedger>,
}
