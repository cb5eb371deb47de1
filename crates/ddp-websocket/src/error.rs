//! Transport error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Frame encoding/decoding error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ddp_protocol::ProtocolError),

    /// The server refused the handshake or closed the stream unexpectedly
    #[error("Connection error: {0}")]
    Connection(String),

    /// No tokio runtime was available to run the socket tasks
    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),
}

pub type TransportResult<T> = Result<T, TransportError>;
