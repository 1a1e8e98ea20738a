//! Error types for the guestsync ecosystem.

use thiserror::Error;

/// Errors that can occur in guestsync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Request failed with status {status}: {url}")]
    FatalRequest { status: u16, url: String },

    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("Sink write to '{destination}' failed for rows {first_row}..{last_row}: {message}")]
    SinkWrite {
        destination: String,
        first_row: usize,
        last_row: usize,
        message: String,
    },

    #[error("Sink error: {0}")]
    Sink(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("State error: {0}")]
    State(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SyncError {
    /// Whether the retry wrapper should attempt this operation again.
    ///
    /// Only timeouts and transient network failures qualify; 4xx responses
    /// and everything else propagate immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::TransientNetwork(_) | SyncError::Timeout(_)
        )
    }
}

/// Result type alias for guestsync operations.
pub type SyncResult<T> = Result<T, SyncError>;
