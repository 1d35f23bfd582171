use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, Method, StatusCode};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use markbatch_api::config::ServerConfig;
use markbatch_api::engine::dispatcher::Dispatcher;
use markbatch_api::engine::progress::ProgressLedger;
use markbatch_api::engine::stall::StallMonitor;
use markbatch_api::{routes, state};
use markbatch_cache::ResultCache;
use markbatch_registry::RegistryClient;

use state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "markbatch=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    if let Err(e) = config.validate() {
        panic!("Invalid configuration: {e}");
    }
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = markbatch_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    markbatch_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    markbatch_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- CORS ---
    let cors = build_cors_layer(&config);

    // --- Registry client ---
    let registry = Arc::new(
        RegistryClient::new(config.registry.clone()).expect("Failed to build registry client"),
    );
    tracing::info!(
        base_url = %config.registry.base_url,
        rate_per_minute = config.registry.requests_per_minute,
        "Registry client created",
    );

    // --- Snapshot cache ---
    let cache = Arc::new(ResultCache::new(
        config.cache_capacity,
        config.cache_active_ttl,
        config.cache_terminal_ttl,
    ));

    // --- Event bus ---
    let event_bus = Arc::new(markbatch_events::EventBus::default());
    tracing::info!("Event bus created");

    // Spawn notification persistence (writes all events to the database).
    let persistence_handle = tokio::spawn(markbatch_events::NotificationPersistence::run(
        pool.clone(),
        event_bus.subscribe(),
    ));

    // --- Progress ledger ---
    let ledger = Arc::new(ProgressLedger::new());

    // --- Dispatcher ---
    let dispatch_cancel = tokio_util::sync::CancellationToken::new();
    let dispatcher = Dispatcher::new(
        pool.clone(),
        Arc::clone(&registry),
        Arc::clone(&cache),
        Arc::clone(&event_bus),
        Arc::clone(&ledger),
        config.filter,
        config.flush,
        config.dispatch_poll_interval,
    );
    let dispatch_cancel_clone = dispatch_cancel.clone();
    let dispatcher_handle = tokio::spawn(async move {
        dispatcher.run(dispatch_cancel_clone).await;
    });

    // --- Stall monitor ---
    let stall_cancel = tokio_util::sync::CancellationToken::new();
    let stall_monitor = StallMonitor::new(
        pool.clone(),
        Arc::clone(&cache),
        Arc::clone(&event_bus),
        config.stall_poll_interval,
        config.stall_window,
        config.max_requeues,
    );
    let stall_cancel_clone = stall_cancel.clone();
    let stall_handle = tokio::spawn(async move {
        stall_monitor.run(stall_cancel_clone).await;
    });

    tracing::info!("Background services started (persistence, dispatcher, stall monitor)");

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        cache: Arc::clone(&cache),
        registry: Arc::clone(&registry),
        event_bus: Arc::clone(&event_bus),
        ledger: Arc::clone(&ledger),
    };

    // --- Request ID header name ---
    let request_id_header = HeaderName::from_static("x-request-id");

    // --- Router ---
    let app = Router::new()
        // Health checks at root level (not under /api/v1).
        .merge(routes::health::router())
        // API v1 routes.
        .nest("/api/v1", routes::api_routes())
        // -- Middleware stack (applied bottom-up) --
        // Panic recovery: catch panics and return 500 JSON.
        .layer(CatchPanicLayer::new())
        // Request timeout.
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        // Propagate request ID to response.
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        // Structured request/response tracing.
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Set request ID on incoming requests.
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        // CORS.
        .layer(cors)
        // Shared state.
        .with_state(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Stop the dispatcher first; an interrupted job keeps its persisted
    // results and is resumed on the next start.
    dispatch_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(15), dispatcher_handle).await;
    tracing::info!("Dispatcher stopped");

    stall_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), stall_handle).await;
    tracing::info!("Stall monitor stopped");

    // Drop the event bus sender to close the broadcast channel.
    // This signals the persistence task to shut down.
    drop(event_bus);
    let _ = tokio::time::timeout(Duration::from_secs(5), persistence_handle).await;
    tracing::info!("Event services shut down");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Build the CORS middleware layer from server configuration.
///
/// Panics at startup if any configured origin is invalid, which is the
/// desired behaviour -- we want misconfiguration to fail fast.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .map(|o| {
            o.parse()
                .unwrap_or_else(|e| panic!("Invalid CORS origin '{o}': {e}"))
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(3600))
}
