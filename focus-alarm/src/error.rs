//! Error types for focus-alarm.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the alarm core and its sample plumbing.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// A sample payload could not be turned into an attention state.
    #[error("Malformed sample: {0}")]
    Source(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Producer thread did not stop within {0:?}")]
    ProducerJoinTimeout(Duration),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
