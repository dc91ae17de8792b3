//! Intake loop: bus messages in, position updates onto the worker pool.
//!
//! Decoding happens here so a malformed message never occupies a worker.
//! The loop stops on the shutdown signal or when the subscription ends;
//! draining whatever was already queued is the pool's job.

use std::future::Future;

use chrono::Utc;
use futures::{Stream, StreamExt as _};
use locus_core::error::PoolError;
use locus_core::pool::WorkerPool;
use locus_core::stats::EngineStats;
use tracing::{debug, info, warn};

use crate::nats::decode_location;

/// One message as received from the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    /// Subject the message arrived on.
    pub subject: String,
    /// Raw JSON payload.
    pub payload: Vec<u8>,
}

impl From<async_nats::Message> for Inbound {
    fn from(message: async_nats::Message) -> Self {
        Self {
            subject: message.subject.to_string(),
            payload: message.payload.to_vec(),
        }
    }
}

/// Counts for one intake run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntakeSummary {
    /// Messages taken off the subscription.
    pub received: u64,
    /// Updates handed to the pool.
    pub submitted: u64,
    /// Messages that failed to decode.
    pub rejected: u64,
}

/// Feed `messages` into `pool` until `shutdown` resolves or the stream ends.
pub async fn run_intake<S, F>(
    messages: S,
    pool: &WorkerPool,
    stats: &EngineStats,
    shutdown: F,
) -> IntakeSummary
where
    S: Stream<Item = Inbound>,
    F: Future<Output = ()>,
{
    let mut summary = IntakeSummary::default();
    let mut messages = std::pin::pin!(messages);
    let mut shutdown = std::pin::pin!(shutdown);

    loop {
        let inbound = tokio::select! {
            biased;
            () = &mut shutdown => {
                info!("shutdown requested, intake stopping");
                break;
            }
            next = messages.next() => {
                let Some(inbound) = next else {
                    warn!("location subscription ended");
                    break;
                };
                inbound
            }
        };
        summary.received = summary.received.saturating_add(1);

        let update = match decode_location(&inbound.subject, &inbound.payload, Utc::now()) {
            Ok(update) => update,
            Err(e) => {
                stats.record_invalid();
                summary.rejected = summary.rejected.saturating_add(1);
                warn!(error = %e, "dropping location message");
                continue;
            }
        };

        debug!(entity_id = %update.entity_id, "location received");
        match pool.submit(update).await {
            Ok(()) => summary.submitted = summary.submitted.saturating_add(1),
            Err(PoolError::Closed) => {
                warn!("worker pool closed, intake stopping");
                break;
            }
        }
    }

    info!(
        received = summary.received,
        submitted = summary.submitted,
        rejected = summary.rejected,
        "intake stopped"
    );
    summary
}
