//! Per-entity containment state.
//!
//! [`VehicleStateStore`] is the only mutable shared resource in the engine
//! and the sole authority for "which region did we last believe this
//! entity was in". It exposes read ([`get`](VehicleStateStore::get)) and
//! an atomic compare-and-apply; there is no store-wide lock. The backing
//! [`DashMap`] shards its keys, so a read-modify-write for one entity
//! holds only that entity's shard for the duration of a few field writes.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use locus_types::{EntityId, Region};
use serde::Serialize;

/// Last applied containment of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VehicleState {
    /// The entity this state belongs to.
    pub entity_id: EntityId,
    /// Region containing the entity as of the last applied update.
    pub current_region: Option<Region>,
    /// `observed_at` of the last applied update.
    pub last_applied_at: DateTime<Utc>,
}

/// Result of [`VehicleStateStore::compare_and_apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyResult {
    /// Region held before the call. For a rejected (stale) call this is
    /// the region still held. `None` for a first-seen entity.
    pub previous_region: Option<Region>,
    /// Whether the new region was written.
    pub applied: bool,
}

/// Whether a seeded state was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    /// No entry existed; the seed was inserted.
    Inserted,
    /// An entry with an older timestamp was replaced.
    Replaced,
    /// An entry at least as recent already existed.
    Kept,
}

/// In-memory keyed store of [`VehicleState`], one entry per entity.
#[derive(Debug, Default)]
pub struct VehicleStateStore {
    entries: DashMap<EntityId, VehicleState>,
}

impl VehicleStateStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state for `entity_id`, if the entity has been seen.
    pub fn get(&self, entity_id: &EntityId) -> Option<VehicleState> {
        self.entries.get(entity_id).map(|entry| entry.value().clone())
    }

    /// Atomically write `region` as the entity's containment if
    /// `observed_at` is not older than the last applied timestamp (or the
    /// entity is new). Older updates leave the entry untouched.
    ///
    /// Calls for the same entity are serialized by the entry lock; calls
    /// for entities in other shards proceed in parallel.
    pub fn compare_and_apply(
        &self,
        entity_id: &EntityId,
        region: Option<Region>,
        observed_at: DateTime<Utc>,
    ) -> ApplyResult {
        match self.entries.entry(entity_id.clone()) {
            Entry::Occupied(mut occupied) => {
                let state = occupied.get_mut();
                if observed_at < state.last_applied_at {
                    return ApplyResult {
                        previous_region: state.current_region.clone(),
                        applied: false,
                    };
                }
                let previous_region = std::mem::replace(&mut state.current_region, region);
                state.last_applied_at = observed_at;
                ApplyResult {
                    previous_region,
                    applied: true,
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(VehicleState {
                    entity_id: entity_id.clone(),
                    current_region: region,
                    last_applied_at: observed_at,
                });
                ApplyResult {
                    previous_region: None,
                    applied: true,
                }
            }
        }
    }

    /// Install a state rebuilt at startup without going through the
    /// detector. Only writes when the entity is unknown or the existing
    /// entry is strictly older, so live updates always win.
    pub fn seed(&self, state: VehicleState) -> SeedOutcome {
        match self.entries.entry(state.entity_id.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().last_applied_at < state.last_applied_at {
                    occupied.insert(state);
                    SeedOutcome::Replaced
                } else {
                    SeedOutcome::Kept
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(state);
                SeedOutcome::Inserted
            }
        }
    }

    /// Number of tracked entities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entity has been seen yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy of every entry, sorted by entity id.
    pub fn snapshot(&self) -> Vec<VehicleState> {
        let mut states: Vec<VehicleState> =
            self.entries.iter().map(|entry| entry.value().clone()).collect();
        states.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        states
    }
}
