//! Geofence transition detection for the Locus engine.
//!
//! Position updates go in, containment is resolved through a
//! [`ContainmentOracle`], per-entity state is compare-and-applied in a
//! concurrent store, and every genuine change of containing region leaves
//! as ordered `Exit`/`Enter` events through an [`EventPublisher`].
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `locus-config.yaml` into
//!   strongly-typed structs.
//! - [`detector`] -- [`TransitionDetector`] and the pure transition rule.
//! - [`error`] -- Detection and worker pool errors.
//! - [`oracle`] -- [`ContainmentOracle`] trait and the in-memory
//!   [`PolygonOracle`].
//! - [`pool`] -- [`WorkerPool`] partitioning updates by entity.
//! - [`publisher`] -- [`EventPublisher`] trait and [`MemoryPublisher`].
//! - [`retry`] -- Bounded exponential backoff.
//! - [`stats`] -- Atomic processing counters.
//! - [`store`] -- [`VehicleStateStore`], the per-entity state map.
//!
//! [`ContainmentOracle`]: oracle::ContainmentOracle
//! [`PolygonOracle`]: oracle::PolygonOracle
//! [`EventPublisher`]: publisher::EventPublisher
//! [`MemoryPublisher`]: publisher::MemoryPublisher
//! [`TransitionDetector`]: detector::TransitionDetector
//! [`WorkerPool`]: pool::WorkerPool
//! [`VehicleStateStore`]: store::VehicleStateStore

pub mod config;
pub mod detector;
pub mod error;
pub mod oracle;
pub mod pool;
pub mod publisher;
pub mod retry;
pub mod stats;
pub mod store;
