use std::io;
use std::path::PathBuf;
use std::time::Duration;

use apollo_core::NoEndpoint;

/// Failures raised by the devnet node services.
///
/// Every variant converts into [`apollo_core::BoxError`], so service hooks use `?` directly.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("failed to bind {addr}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to reach {endpoint}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("no status from {endpoint} within {limit:?}")]
    Timeout { endpoint: String, limit: Duration },

    #[error("cancelled while waiting for {endpoint}")]
    Cancelled { endpoint: String },

    #[error("malformed status from {endpoint}: {message}")]
    Protocol { endpoint: String, message: String },

    #[error("invalid endpoint {0:?}")]
    InvalidEndpoint(String),

    #[error(transparent)]
    MissingEndpoint(#[from] NoEndpoint),

    #[error("trusted hash mismatch: consensus reports {expected}, bridge reports {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("failed to access {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to load config from {path}")]
    Config {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("listener task failed")]
    Task(#[from] tokio::task::JoinError),
}
