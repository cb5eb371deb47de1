//! Contract between the sync core and its duplex transport.
//!
//! - [`Transport`]: the outbound operations the core issues
//! - [`TransportEvent`]: the inbound events the core consumes
//! - [`ClientMessage`] / [`ServerMessage`]: DDP JSON frames, for transports
//!   that speak DDP on the wire
//! - [`RecordingTransport`]: an in-memory transport that records what the
//!   core sent and lets tests script the replies

mod error;
mod messages;
mod recording;
mod transport;

pub use error::{ProtocolError, ProtocolResult, RemoteError};
pub use messages::{ClientMessage, ServerMessage, DDP_VERSION, SUPPORTED_VERSIONS};
pub use recording::{Outbound, RecordingTransport};
pub use transport::{Fields, Transport, TransportEvent};
