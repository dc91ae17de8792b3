//! Error types for the engine binary.

/// Top-level error for the engine binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: locus_core::config::ConfigError,
    },

    /// Database setup failed.
    #[error("database error: {source}")]
    Database {
        /// The underlying data layer error.
        #[from]
        source: locus_db::DbError,
    },

    /// NATS connection or messaging failed.
    #[error("NATS error: {message}")]
    Nats {
        /// Description of the NATS failure.
        message: String,
    },

    /// Observer API server failed to start.
    #[error("observer error: {message}")]
    Observer {
        /// Description of the observer failure.
        message: String,
    },
}

/// Why an inbound bus message was not turned into a position update.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    /// The payload is not a valid location message.
    #[error("malformed location payload on {subject}: {source}")]
    Decode {
        /// Subject the message arrived on.
        subject: String,
        /// The JSON error.
        source: serde_json::Error,
    },

    /// The payload decoded but conflicts with its subject.
    #[error(transparent)]
    Invalid(#[from] locus_types::ValidationError),
}
