//! Lock-free engine counters.
//!
//! The detector and the worker pool bump these as updates flow through;
//! the observer API serves a [`StatsSnapshot`].

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Running totals since process start.
#[derive(Debug, Default)]
pub struct EngineStats {
    updates_processed: AtomicU64,
    transitions_applied: AtomicU64,
    unchanged: AtomicU64,
    stale_rejected: AtomicU64,
    validation_rejected: AtomicU64,
    oracle_failures: AtomicU64,
    updates_dropped: AtomicU64,
    events_published: AtomicU64,
    publish_failures: AtomicU64,
}

/// Point-in-time copy of [`EngineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Updates that reached a final outcome: applied, unchanged, stale,
    /// rejected, or dropped after containment retries ran out.
    pub updates_processed: u64,
    /// Applied updates that changed the containing region.
    pub transitions_applied: u64,
    /// Applied updates that left the containing region as it was.
    pub unchanged: u64,
    /// Updates older than the entity's last applied update.
    pub stale_rejected: u64,
    /// Updates dropped by validation.
    pub validation_rejected: u64,
    /// Failed or timed-out containment queries (each attempt counts).
    pub oracle_failures: u64,
    /// Updates abandoned because the oracle stayed unavailable.
    pub updates_dropped: u64,
    /// Transition events handed to the publisher successfully.
    pub events_published: u64,
    /// Publisher calls that failed (each attempt counts).
    pub publish_failures: u64,
}

impl EngineStats {
    /// Fresh zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_transition(&self) {
        self.transitions_applied.fetch_add(1, Ordering::Relaxed);
        self.updates_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unchanged(&self) {
        self.unchanged.fetch_add(1, Ordering::Relaxed);
        self.updates_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stale(&self) {
        self.stale_rejected.fetch_add(1, Ordering::Relaxed);
        self.updates_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an update rejected as malformed, including ones that never
    /// decoded far enough to reach the detector.
    pub fn record_invalid(&self) {
        self.validation_rejected.fetch_add(1, Ordering::Relaxed);
        self.updates_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_oracle_failure(&self) {
        self.oracle_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.updates_dropped.fetch_add(1, Ordering::Relaxed);
        self.updates_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_published(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counter values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            updates_processed: self.updates_processed.load(Ordering::Relaxed),
            transitions_applied: self.transitions_applied.load(Ordering::Relaxed),
            unchanged: self.unchanged.load(Ordering::Relaxed),
            stale_rejected: self.stale_rejected.load(Ordering::Relaxed),
            validation_rejected: self.validation_rejected.load(Ordering::Relaxed),
            oracle_failures: self.oracle_failures.load(Ordering::Relaxed),
            updates_dropped: self.updates_dropped.load(Ordering::Relaxed),
            events_published: self.events_published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
        }
    }
}
