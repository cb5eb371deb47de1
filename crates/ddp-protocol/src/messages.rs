//! DDP frames.

use crate::{ProtocolError, ProtocolResult, RemoteError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, trace};

/// Protocol version requested on connect.
pub const DDP_VERSION: &str = "1";

/// Versions offered on connect, most preferred first.
pub const SUPPORTED_VERSIONS: [&str; 3] = ["1", "pre2", "pre1"];

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg", rename_all = "lowercase")]
pub enum ClientMessage {
    Connect {
        version: String,
        support: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session: Option<String>,
    },
    Method {
        id: String,
        method: String,
        #[serde(default)]
        params: Vec<Value>,
    },
    Sub {
        id: String,
        name: String,
        #[serde(default)]
        params: Vec<Value>,
    },
    Unsub {
        id: String,
    },
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
}

impl ClientMessage {
    pub fn connect() -> Self {
        ClientMessage::Connect {
            version: DDP_VERSION.to_string(),
            support: SUPPORTED_VERSIONS.iter().map(|v| v.to_string()).collect(),
            session: None,
        }
    }

    pub fn to_json(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Frames sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg", rename_all = "lowercase")]
pub enum ServerMessage {
    Connected {
        session: String,
    },
    Failed {
        version: String,
    },
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    Added {
        collection: String,
        id: String,
        #[serde(default)]
        fields: Map<String, Value>,
    },
    Changed {
        collection: String,
        id: String,
        #[serde(default)]
        fields: Map<String, Value>,
        #[serde(default)]
        cleared: Vec<String>,
    },
    Removed {
        collection: String,
        id: String,
    },
    Ready {
        subs: Vec<String>,
    },
    Nosub {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<RemoteError>,
    },
    Result {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<RemoteError>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },
    Updated {
        methods: Vec<String>,
    },
    Error {
        reason: String,
        #[serde(
            default,
            rename = "offendingMessage",
            skip_serializing_if = "Option::is_none"
        )]
        offending_message: Option<Value>,
    },
}

impl ServerMessage {
    /// Parse one text frame.
    ///
    /// Frames without a `msg` field (the legacy `server_id` greeting) and
    /// unrecognised message types are reported as
    /// [`ProtocolError::UnknownMessage`] so the caller can skip them.
    pub fn from_json(text: &str) -> ProtocolResult<Self> {
        let value: Value = serde_json::from_str(text)?;
        let kind = match value.get("msg").and_then(Value::as_str) {
            Some(kind) => kind.to_string(),
            None => {
                trace!(frame = %truncate(text), "Frame without msg field");
                return Err(ProtocolError::UnknownMessage(truncate(text)));
            }
        };
        serde_json::from_value(value).map_err(|e| {
            if e.to_string().starts_with("unknown variant") {
                debug!(msg = %kind, "Unrecognised DDP message type");
                ProtocolError::UnknownMessage(kind)
            } else {
                debug!(msg = %kind, error = %e, "Malformed DDP frame");
                ProtocolError::Json(e)
            }
        })
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn connect_frame_offers_supported_versions() {
        let frame: Value = serde_json::from_str(&ClientMessage::connect().to_json().unwrap()).unwrap();
        assert_eq!(
            frame,
            json!({"msg": "connect", "version": "1", "support": ["1", "pre2", "pre1"]})
        );
    }

    #[test]
    fn method_and_sub_frames() {
        let method = ClientMessage::Method {
            id: "7".into(),
            method: "/todos/insert".into(),
            params: vec![json!({"_id": "a"})],
        };
        let frame: Value = serde_json::from_str(&method.to_json().unwrap()).unwrap();
        assert_eq!(frame["msg"], "method");
        assert_eq!(frame["method"], "/todos/insert");
        assert_eq!(frame["params"][0]["_id"], "a");

        let unsub: Value =
            serde_json::from_str(&ClientMessage::Unsub { id: "s1".into() }.to_json().unwrap())
                .unwrap();
        assert_eq!(unsub, json!({"msg": "unsub", "id": "s1"}));
    }

    #[test]
    fn parses_data_messages() {
        let changed = ServerMessage::from_json(
            r#"{"msg":"changed","collection":"todos","id":"a","fields":{"done":true},"cleared":["tmp"]}"#,
        )
        .unwrap();
        match changed {
            ServerMessage::Changed { fields, cleared, .. } => {
                assert_eq!(fields["done"], true);
                assert_eq!(cleared, vec!["tmp".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }

        let added = ServerMessage::from_json(r#"{"msg":"added","collection":"c","id":"x"}"#).unwrap();
        assert!(matches!(added, ServerMessage::Added { fields, .. } if fields.is_empty()));
    }

    #[test]
    fn parses_result_with_error() {
        let msg = ServerMessage::from_json(
            r#"{"msg":"result","id":"3","error":{"error":403,"reason":"Incorrect password"}}"#,
        )
        .unwrap();
        match msg {
            ServerMessage::Result { id, error, result } => {
                assert_eq!(id, "3");
                assert_eq!(error.unwrap().code(), Some(403));
                assert!(result.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_and_msgless_frames_are_flagged() {
        assert!(matches!(
            ServerMessage::from_json(r#"{"server_id":"0"}"#),
            Err(ProtocolError::UnknownMessage(_))
        ));
        assert!(matches!(
            ServerMessage::from_json(r#"{"msg":"addedBefore","collection":"c","id":"x"}"#),
            Err(ProtocolError::UnknownMessage(kind)) if kind == "addedBefore"
        ));
        assert!(matches!(
            ServerMessage::from_json("not json"),
            Err(ProtocolError::Json(_))
        ));
    }
}
