use thiserror::Error;

/// Failures while loading configuration or resolving client paths.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A config value is present but unusable (e.g. a non-WebSocket endpoint).
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Endpoint is not a valid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// `config.json` could not be parsed or written.
    #[error("Malformed config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cannot resolve client directory: {0}")]
    Path(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
