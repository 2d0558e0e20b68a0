use thiserror::Error;

/// Unified error type for the relay
#[derive(Error, Debug)]
pub enum RelayError {
    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Connection errors
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] axum::Error),

    #[error("Write deadline exceeded")]
    WriteTimeout,

    #[error("Read deadline exceeded")]
    ReadTimeout,

    // Registry errors
    #[error("Registry is no longer running")]
    RegistryClosed,

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

impl RelayError {
    /// Whether the error means the peer side of a connection is gone or stalled.
    /// Such errors are routine for a relay and logged at debug level.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            RelayError::WebSocket(_) | RelayError::WriteTimeout | RelayError::ReadTimeout
        )
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for RelayError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        RelayError::RegistryClosed
    }
}
