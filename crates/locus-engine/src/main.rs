//! Geofence engine binary for Locus.
//!
//! Wires the NATS location feed, the `PostGIS` containment oracle, the
//! partitioned worker pool and the transition event publisher together,
//! and serves the observer API alongside.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `locus-config.yaml` (or `$LOCUS_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Connect to `PostgreSQL` (lazy fallback when unreachable)
//! 4. Warm-start the state store from last-known positions
//! 5. Connect to NATS and build the event publisher
//! 6. Spawn the worker pool and the observer API
//! 7. Run intake until Ctrl-C / SIGTERM, then drain the pool

mod error;
mod intake;
mod nats;
mod warm_start;

use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt as _;
use locus_core::config::{EngineConfig, LoggingConfig};
use locus_core::detector::TransitionDetector;
use locus_core::oracle::ContainmentOracle;
use locus_core::pool::WorkerPool;
use locus_core::publisher::EventPublisher;
use locus_core::retry::retry_async;
use locus_core::stats::EngineStats;
use locus_core::store::VehicleStateStore;
use locus_db::{PostgresConfig, PostgresPool};
use locus_observer::AppState;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::intake::Inbound;
use crate::nats::NatsClient;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "locus-config.yaml";

/// Application entry point for the geofence engine.
///
/// # Errors
///
/// Returns an error if configuration is invalid, NATS stays unreachable
/// after all retries, or the observer cannot bind its port.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config_path = std::env::var("LOCUS_CONFIG")
        .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let config = EngineConfig::load_or_default(&config_path).map_err(EngineError::from)?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!(config = %config_path.display(), "locus-engine starting");
    info!(
        workers = config.engine.workers,
        queue_capacity = config.engine.queue_capacity,
        oracle_timeout_ms = config.engine.oracle_timeout_ms,
        warm_start = config.engine.warm_start,
        max_attempts = config.retry.max_attempts,
        "Configuration loaded"
    );
    let retry = config.retry.policy();

    // 3. Connect to PostgreSQL. Without it every containment query fails
    //    and is retried per update until the database comes up.
    let pg_config = PostgresConfig::new(&config.infrastructure.postgres_url)
        .with_max_connections(u32::try_from(config.engine.workers).unwrap_or(u32::MAX).max(2));
    let (postgres, postgres_ready) =
        match retry_async(&retry, "postgres connect", || PostgresPool::connect(&pg_config)).await {
            Ok(pool) => {
                if let Err(e) = pool.run_migrations().await {
                    warn!(error = %e, "migrations failed, continuing with existing schema");
                }
                (pool, true)
            }
            Err(e) => {
                warn!(error = %e, "PostgreSQL unavailable, starting cold");
                (PostgresPool::connect_lazy(&pg_config).map_err(EngineError::from)?, false)
            }
        };
    let oracle: Arc<dyn ContainmentOracle> = Arc::new(postgres.oracle());

    // 4. Warm start.
    let store = Arc::new(VehicleStateStore::new());
    if config.engine.warm_start && postgres_ready {
        match postgres.history().latest_positions().await {
            Ok(rows) => {
                warm_start::seed_from_positions(
                    rows.iter().map(locus_db::LatestPosition::to_update),
                    oracle.as_ref(),
                    config.engine.oracle_timeout(),
                    &store,
                )
                .await;
            }
            Err(e) => warn!(error = %e, "could not read position history, starting cold"),
        }
    } else {
        info!("warm start skipped, first update per vehicle may emit enter");
    }

    // 5. Connect to NATS.
    let nats_url = config.infrastructure.nats_url.clone();
    let nats = retry_async(&retry, "nats connect", || NatsClient::connect(&nats_url))
        .await
        .map_err(EngineError::from)?;
    let publisher: Arc<dyn EventPublisher> =
        Arc::new(nats.event_publisher(&config.subjects.events));

    // 6. Detector, worker pool and observer.
    let stats = Arc::new(EngineStats::new());
    let detector = Arc::new(
        TransitionDetector::new(
            Arc::clone(&store),
            oracle,
            publisher,
            config.engine.oracle_timeout(),
        )
        .with_stats(Arc::clone(&stats)),
    );
    let pool = WorkerPool::spawn(
        detector,
        config.engine.workers,
        config.engine.queue_capacity,
        retry,
    );

    let observer_port = config.infrastructure.observer_port;
    let observer = locus_observer::spawn_observer(
        observer_port,
        Arc::new(AppState::new(Arc::clone(&store), Arc::clone(&stats))),
    )
    .await
    .map_err(|e| EngineError::Observer {
        message: format!("{e}"),
    })?;
    info!(port = observer_port, "Observer API server started");

    // 7. Intake until shutdown, then drain.
    let subscriber = nats
        .subscribe_locations(&config.subjects.location_subscription)
        .await?;
    intake::run_intake(subscriber.map(Inbound::from), &pool, &stats, shutdown_signal()).await;

    pool.shutdown().await;
    if let Err(e) = nats.flush().await {
        warn!(error = %e, "final NATS flush failed");
    }
    observer.abort();
    postgres.close().await;

    let totals = stats.snapshot();
    info!(
        updates_processed = totals.updates_processed,
        transitions_applied = totals.transitions_applied,
        updates_dropped = totals.updates_dropped,
        events_published = totals.events_published,
        publish_failures = totals.publish_failures,
        "locus-engine shutdown complete"
    );
    Ok(())
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
