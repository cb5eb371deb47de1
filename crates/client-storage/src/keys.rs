//! Storage key names.

/// Keys written by the client.
pub struct StorageKeys;

impl StorageKeys {
    /// Prefix of persisted login tokens.
    pub const TOKEN_PREFIX: &'static str = "TOKEN";

    /// Key holding the login token of one client connection: `TOKEN/<connection_id>`.
    pub fn token(connection_id: &str) -> String {
        format!("{}/{}", Self::TOKEN_PREFIX, connection_id)
    }
}
