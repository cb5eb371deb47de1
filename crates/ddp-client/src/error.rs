use client_storage::StorageError;
use ddp_protocol::RemoteError;
use thiserror::Error;

/// Errors surfaced by calls, subscriptions and account helpers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("No transport attached")]
    TransportUnavailable,

    #[error("Remote error: {0}")]
    Remote(RemoteError),

    /// The client was dropped before the call completed.
    #[error("Call canceled")]
    Canceled,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<RemoteError> for ClientError {
    fn from(err: RemoteError) -> Self {
        ClientError::Remote(err)
    }
}

impl From<StorageError> for ClientError {
    fn from(err: StorageError) -> Self {
        ClientError::Storage(err.to_string())
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Errors from optimistic collection writes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollectionError {
    #[error("Document _id fields must be non-empty strings")]
    InvalidId,

    #[error("Duplicate key _id with value {0}")]
    Duplicate(String),

    #[error("No document with _id {id} in collection {collection}")]
    NotFound { collection: String, id: String },

    #[error("Remote error: {0}")]
    Remote(RemoteError),

    #[error(transparent)]
    Client(#[from] ClientError),
}

impl CollectionError {
    /// HTTP-style code: 400, 409 and 404 for local failures, the server's
    /// code for remote ones.
    pub fn code(&self) -> Option<i64> {
        match self {
            CollectionError::InvalidId => Some(400),
            CollectionError::Duplicate(_) => Some(409),
            CollectionError::NotFound { .. } => Some(404),
            CollectionError::Remote(err) => err.code(),
            CollectionError::Client(ClientError::Remote(err)) => err.code(),
            CollectionError::Client(_) => None,
        }
    }
}

pub type CollectionResult<T> = Result<T, CollectionError>;

/// Session machine and token persistence failures.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type SessionResult<T> = Result<T, SessionError>;
