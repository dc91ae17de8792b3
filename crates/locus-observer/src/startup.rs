//! Observer server startup helper for embedding in the engine binary.
//!
//! ```rust,ignore
//! use locus_observer::{AppState, spawn_observer};
//!
//! let state = Arc::new(AppState::new(store, stats));
//! let handle = spawn_observer(8080, state).await?;
//! ```

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::server::{self, ServerConfig, ServerError};
use crate::state::AppState;

/// Errors that can occur when spawning the Observer server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The server failed to bind or start.
    #[error("server start error: {0}")]
    Server(#[from] ServerError),
}

/// Spawn the Observer HTTP server on a background Tokio task.
///
/// Binds to `0.0.0.0:{port}` before spawning, so a port conflict is
/// reported here rather than lost in the background task. The caller
/// holds the returned handle and aborts it on shutdown.
///
/// # Errors
///
/// Returns [`StartupError::Server`] if the server cannot bind to the
/// requested address.
pub async fn spawn_observer(
    port: u16,
    state: Arc<AppState>,
) -> Result<JoinHandle<()>, StartupError> {
    let config = ServerConfig {
        host: String::from("0.0.0.0"),
        port,
    };
    let listener = server::bind(&config).await?;

    let handle = tokio::spawn(async move {
        if let Err(e) = server::serve(listener, state).await {
            tracing::error!(error = %e, "Observer server exited with error");
        }
    });

    tracing::info!(port, "Observer server spawned on background task");

    Ok(handle)
}
