//! FleetFlow Trip Scoring API
//!
//! Telemetry ingestion, trip status and score lookups. Scoring runs in background
//! workers fed by an in-process job queue.

use axum::{
    routing::{get, post},
    Router,
};
use data_validator::{SampleSanitizer, ValidationConfig, Validator};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use safety_scoring::Scorer;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use storage::{SqliteStore, TripStore};
use tokio::sync::watch;
use tower_governor::GovernorLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use trip_worker::{spawn_reconciler, JobQueue, MemoryQueue, TripStateManager, WorkerPool};

pub mod config;
pub mod error;
pub mod rate_limit;
pub mod routes;

pub use config::{AppConfig, LoggingConfig};
pub use error::ApiError;

/// Application state shared across handlers
pub struct AppState {
    pub trips: TripStateManager,
    pub queue: Arc<dyn JobQueue>,
    pub sanitizer: SampleSanitizer,
    pub validator: Validator,
    /// Prometheus handle, when the recorder is installed
    pub metrics: Option<PrometheusHandle>,
    pub version: String,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(store: Arc<dyn TripStore>, queue: Arc<dyn JobQueue>) -> Self {
        Self {
            trips: TripStateManager::new(store),
            queue,
            sanitizer: SampleSanitizer::new(),
            validator: Validator::new(ValidationConfig::default()),
            metrics: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Create the application router
pub fn create_router(state: Arc<AppState>, rate_limit: &rate_limit::RateLimitConfig) -> Router {
    let mut ingest = Router::new().route("/api/v1/telemetry", post(routes::telemetry::ingest_telemetry));
    if let Some(config) = rate_limit::create_governor_config(rate_limit) {
        ingest = ingest.layer(GovernorLayer { config });
    }

    Router::new()
        .merge(ingest)
        .route("/api/v1/trips/:id/status", get(routes::trips::get_status))
        .route("/api/v1/trips/:id/score", get(routes::trips::get_score))
        .route("/api/v1/trip/:id/score", get(routes::trips::get_score))
        .route("/api/v1/health", get(routes::health::health_handler))
        .route("/metrics", get(routes::health::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Initialize logging
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if let Err(e) = result {
        eprintln!("Tracing subscriber already set: {}", e);
    }
}

/// Wire storage, queue and workers, then serve until Ctrl-C
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let sqlite = SqliteStore::connect(&config.database.url, config.database.max_connections).await?;
    let store: Arc<dyn TripStore> = Arc::new(sqlite.clone());
    let queue = Arc::new(MemoryQueue::new());

    let recorder = PrometheusBuilder::new().install_recorder()?;

    let analyzer = Arc::new(Scorer::new(config.scoring.clone()));
    let pool = WorkerPool::spawn(&config.worker, store.clone(), queue.clone(), analyzer);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reconciler = (config.worker.reconcile_after_secs > 0).then(|| {
        spawn_reconciler(
            store.clone(),
            queue.clone(),
            Duration::from_secs(config.worker.reconcile_after_secs),
            Duration::from_secs(config.worker.reconcile_interval_secs.max(1)),
            shutdown_rx,
        )
    });

    let state = Arc::new(AppState::new(store, queue.clone()).with_metrics(recorder));
    let app = create_router(state, &config.rate_limit);

    info!("Starting API server on {}", config.server.bind_addr);
    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Could not listen for shutdown signal: {}", e);
            }
        })
        .await?;

    info!("Server stopped, draining queue");
    queue.close();
    let _ = shutdown_tx.send(true);
    pool.join().await;
    if let Some(handle) = reconciler {
        let _ = handle.await;
    }
    sqlite.close().await;

    Ok(())
}
