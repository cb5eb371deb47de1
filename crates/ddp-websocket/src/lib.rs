//! DDP over WebSocket.
//!
//! [`WebSocketTransport`] implements [`ddp_protocol::Transport`] on top of
//! tokio-tungstenite:
//! - socket I/O runs on spawned tokio tasks
//! - outbound frames queue on a channel while disconnected and are flushed
//!   right after the next `connect` handshake frame
//! - inbound frames are decoded and delivered, in order, as
//!   [`ddp_protocol::TransportEvent`]s on an unbounded channel

mod client;
mod error;

pub use client::{ConnectionState, WebSocketConfig, WebSocketTransport};
pub use error::{TransportError, TransportResult};
