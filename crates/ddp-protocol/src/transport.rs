use crate::{RemoteError, ServerMessage};
use serde_json::{Map, Value};

/// Top-level document fields carried by data messages.
pub type Fields = Map<String, Value>;

/// Outbound side of a duplex publish/subscribe connection.
///
/// Implementations must not call back into the core synchronously: replies
/// are delivered later as [`TransportEvent`]s, in arrival order.
pub trait Transport {
    /// Open (or re-open) the connection. A no-op while already connected.
    fn connect(&self);

    /// Close the connection.
    fn disconnect(&self);

    /// Invoke a remote method. Returns the call id its `result` will carry.
    fn method(&self, name: &str, params: Vec<Value>) -> String;

    /// Start a subscription. Returns the transport-level subscription id.
    fn sub(&self, name: &str, params: &[Value]) -> String;

    /// Stop a subscription by transport-level id.
    fn unsub(&self, id: &str);
}

/// Inbound events consumed by the core.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    Added {
        collection: String,
        id: String,
        fields: Fields,
    },
    Changed {
        collection: String,
        id: String,
        fields: Fields,
        cleared: Vec<String>,
    },
    Removed {
        collection: String,
        id: String,
    },
    /// The listed transport-level subscriptions have sent their initial data.
    Ready {
        subs: Vec<String>,
    },
    /// The server ended (or refused) a subscription.
    NoSub {
        id: String,
        error: Option<RemoteError>,
    },
    /// Completion of a method call.
    Result {
        id: String,
        outcome: Result<Value, RemoteError>,
    },
}

impl TransportEvent {
    /// The event a server frame maps to, if any. Connection housekeeping
    /// frames (`ping`, `pong`, `failed`, `updated`, `error`) have none.
    pub fn from_server_message(message: ServerMessage) -> Option<Self> {
        let event = match message {
            ServerMessage::Connected { .. } => TransportEvent::Connected,
            ServerMessage::Added {
                collection,
                id,
                fields,
            } => TransportEvent::Added {
                collection,
                id,
                fields,
            },
            ServerMessage::Changed {
                collection,
                id,
                fields,
                cleared,
            } => TransportEvent::Changed {
                collection,
                id,
                fields,
                cleared,
            },
            ServerMessage::Removed { collection, id } => TransportEvent::Removed { collection, id },
            ServerMessage::Ready { subs } => TransportEvent::Ready { subs },
            ServerMessage::Nosub { id, error } => TransportEvent::NoSub { id, error },
            ServerMessage::Result { id, error, result } => TransportEvent::Result {
                id,
                outcome: match error {
                    Some(error) => Err(error),
                    None => Ok(result.unwrap_or(Value::Null)),
                },
            },
            ServerMessage::Failed { .. }
            | ServerMessage::Ping { .. }
            | ServerMessage::Pong { .. }
            | ServerMessage::Updated { .. }
            | ServerMessage::Error { .. } => return None,
        };
        Some(event)
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            TransportEvent::Connected => "connected",
            TransportEvent::Disconnected => "disconnected",
            TransportEvent::Added { .. } => "added",
            TransportEvent::Changed { .. } => "changed",
            TransportEvent::Removed { .. } => "removed",
            TransportEvent::Ready { .. } => "ready",
            TransportEvent::NoSub { .. } => "nosub",
            TransportEvent::Result { .. } => "result",
        }
    }
}
