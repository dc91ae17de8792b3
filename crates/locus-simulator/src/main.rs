//! Vehicle fleet simulator for Locus.
//!
//! Each simulated truck runs on its own task and publishes a random
//! position around the configured centre every interval (plus jitter)
//! on `locus.vehicles.{id}.location`, until Ctrl-C.

mod config;
mod fleet;

use std::sync::Arc;

use anyhow::Context as _;
use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::SimConfig;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration is invalid or NATS is unreachable.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("locus-simulator starting");

    let config = Arc::new(SimConfig::from_env()?);
    info!(
        nats_url = config.nats_url,
        vehicles = config.vehicles,
        interval_ms = config.interval.as_millis(),
        center = %config.center,
        spread_deg = config.spread_deg,
        "configuration loaded"
    );

    let client = async_nats::connect(config.nats_url.as_str())
        .await
        .with_context(|| format!("failed to connect to NATS at {}", config.nats_url))?;
    info!("NATS connection established");

    let mut trucks = JoinSet::new();
    for vehicle_id in fleet::vehicle_ids(config.vehicles) {
        trucks.spawn(drive(client.clone(), Arc::clone(&config), vehicle_id));
    }
    info!(vehicles = config.vehicles, "fleet started");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("shutdown requested, stopping fleet");
    trucks.shutdown().await;

    if let Err(e) = client.flush().await {
        warn!(error = %e, "final NATS flush failed");
    }
    info!("locus-simulator stopped");
    Ok(())
}

/// Report positions for one vehicle forever.
async fn drive(client: async_nats::Client, config: Arc<SimConfig>, vehicle_id: String) {
    let mut rng = StdRng::from_os_rng();
    let subject = fleet::location_subject(&config.subject_prefix, &vehicle_id);
    loop {
        let point = fleet::random_position(&mut rng, config.center, config.spread_deg);
        match fleet::report_payload(&vehicle_id, point, Utc::now()) {
            Ok(payload) => {
                if let Err(e) = client.publish(subject.clone(), payload.into()).await {
                    warn!(vehicle_id, error = %e, "failed to publish location");
                } else {
                    debug!(vehicle_id, %point, "location published");
                }
            }
            Err(e) => warn!(vehicle_id, error = %e, "failed to serialize location"),
        }
        tokio::time::sleep(fleet::next_delay(&mut rng, config.interval)).await;
    }
}
