//! Error types for event-intake.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    /// The store could not be reached at all (connect, pool, timeout).
    #[error("record store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store was reachable but rejected the write.
    #[error("record write rejected: {0}")]
    RecordWrite(String),

    #[error("event record not found: {0}")]
    NotFound(String),

    #[error("queue not found: {0}")]
    QueueNotFound(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True when the failure means the store itself could not be reached.
    pub fn is_store_unavailable(&self) -> bool {
        match self {
            Error::StoreUnavailable(_) => true,
            Error::Database(e) => is_connection_error(e),
            _ => false,
        }
    }

    /// Classify a driver error raised by a store write.
    pub fn from_store_write(e: sqlx::Error) -> Self {
        if is_connection_error(&e) {
            Error::StoreUnavailable(e.to_string())
        } else {
            Error::RecordWrite(e.to_string())
        }
    }
}

fn is_connection_error(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Configuration(_)
    )
}

pub type Result<T> = std::result::Result<T, Error>;
