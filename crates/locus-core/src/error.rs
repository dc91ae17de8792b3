//! Error types for the detection engine.
//!
//! Validation failures and staleness are absorbed locally by the worker
//! pool. Oracle failures leave state untouched and are retried. Publish
//! failures carry the undelivered events so they can be re-driven.

use locus_types::{EntityId, TransitionEvent, ValidationError};

/// Why processing a position update did not complete.
#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    /// The update is malformed; dropped without touching state.
    #[error("invalid update: {0}")]
    Validation(#[from] ValidationError),

    /// The containment oracle failed or timed out; state unchanged.
    #[error("containment oracle unavailable for {entity_id}: {reason}")]
    OracleUnavailable {
        /// Entity whose update could not be resolved.
        entity_id: EntityId,
        /// Failure reported by the oracle (or the timeout).
        reason: String,
    },

    /// State was applied but some events were not delivered.
    #[error("{} transition event(s) not delivered: {reason}", pending.len())]
    Publish {
        /// Undelivered events, in the order they must still be published.
        pending: Vec<TransitionEvent>,
        /// Failure reported by the publisher.
        reason: String,
    },
}

/// Errors from the worker pool front door.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// The pool is shutting down and accepts no more updates.
    #[error("worker pool is closed")]
    Closed,
}
