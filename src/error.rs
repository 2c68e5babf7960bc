//! Error types for the CrowdChess client.

use thiserror::Error;

/// Errors that can occur when using the CrowdChess client.
#[derive(Debug, Error)]
pub enum CrowdChessError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted an operation that requires an active connection, but the client is not connected.
    #[error("not connected to server")]
    NotConnected,

    /// The reconnect attempt budget was exhausted; the client stays disconnected
    /// until the process restarts it.
    #[error("reconnect attempts exhausted")]
    ReconnectExhausted,

    /// The server returned an error message.
    #[error("server error: {0}")]
    ServerError(String),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for CrowdChess client operations.
pub type Result<T> = std::result::Result<T, CrowdChessError>;
