//! Client configuration.

use crate::{random, CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default server endpoint.
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:3000/websocket";

/// Minimum gap between two disconnects before auto-reconnect fires again.
pub const DEFAULT_RECONNECT_DEBOUNCE_MS: u64 = 3000;

/// Retry period for work queued before a transport exists.
pub const DEFAULT_DEFERRED_POLL_INTERVAL_MS: u64 = 10;

const CONNECTION_ID_LEN: usize = 6;

/// Client configuration, persisted as `config.json` under the base dir.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// WebSocket endpoint of the server.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Stable per-client identifier; scopes the persisted login token.
    #[serde(default = "default_connection_id")]
    pub connection_id: String,
    /// Reconnect automatically after the transport drops.
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,
    #[serde(default = "default_reconnect_debounce_ms")]
    pub reconnect_debounce_ms: u64,
    #[serde(default = "default_deferred_poll_interval_ms")]
    pub deferred_poll_interval_ms: u64,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_connection_id() -> String {
    random::id_of_len(CONNECTION_ID_LEN)
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_reconnect_debounce_ms() -> u64 {
    DEFAULT_RECONNECT_DEBOUNCE_MS
}

fn default_deferred_poll_interval_ms() -> u64 {
    DEFAULT_DEFERRED_POLL_INTERVAL_MS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            endpoint: default_endpoint(),
            connection_id: default_connection_id(),
            auto_reconnect: default_auto_reconnect(),
            reconnect_debounce_ms: DEFAULT_RECONNECT_DEBOUNCE_MS,
            deferred_poll_interval_ms: DEFAULT_DEFERRED_POLL_INTERVAL_MS,
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load `config.json` from `paths` if it exists, then apply environment
    /// overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to `paths.config_file()`.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("DDP_SYNC_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Ok(endpoint) = std::env::var("DDP_SYNC_ENDPOINT") {
            self.endpoint = endpoint;
        }
    }

    /// The endpoint as a parsed URL. Only `ws` and `wss` are accepted.
    pub fn endpoint_url(&self) -> CoreResult<Url> {
        let url = Url::parse(&self.endpoint)?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(CoreError::Config(format!(
                "endpoint scheme must be ws or wss, got {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.connection_id.len(), CONNECTION_ID_LEN);
        assert!(config.auto_reconnect);
        assert_eq!(config.reconnect_debounce_ms, 3000);
        assert_eq!(config.deferred_poll_interval_ms, 10);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        std::fs::write(
            &config_path,
            r#"{ "log_level": "debug", "connection_id": "abc123", "auto_reconnect": false }"#,
        )
        .unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.connection_id, "abc123");
        assert!(!config.auto_reconnect);
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.reconnect_debounce_ms, DEFAULT_RECONNECT_DEBOUNCE_MS);
    }

    #[test]
    fn test_save_then_load_keeps_connection_id() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let mut config = Config::default();
        config.connection_id = "stable".to_string();
        config.reconnect_debounce_ms = 500;
        config.save(&paths).unwrap();

        let loaded = Config::load(&paths).unwrap();
        assert_eq!(loaded.connection_id, "stable");
        assert_eq!(loaded.reconnect_debounce_ms, 500);
    }

    #[test]
    fn test_load_nonexistent_uses_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().join("missing"));

        let config = Config::load(&paths).unwrap();
        assert!(config.auto_reconnect);
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        std::fs::write(paths.config_file(), "{ not json").unwrap();

        assert!(matches!(Config::load(&paths), Err(CoreError::Json(_))));
    }

    #[test]
    fn test_endpoint_url() {
        let config = Config::default();
        let url = config.endpoint_url().unwrap();
        assert_eq!(url.scheme(), "ws");
        assert_eq!(url.path(), "/websocket");
    }

    #[test]
    fn test_endpoint_url_rejects_http_and_garbage() {
        let mut config = Config::default();
        config.endpoint = "https://example.com".to_string();
        assert!(matches!(config.endpoint_url(), Err(CoreError::Config(_))));

        config.endpoint = "not a url".to_string();
        assert!(matches!(config.endpoint_url(), Err(CoreError::InvalidUrl(_))));
    }
}
