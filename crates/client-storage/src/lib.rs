//! Persistent key-value storage for client session tokens.
//!
//! Backends:
//! - [`FileStorage`]: a JSON map under the client's base directory
//! - [`MemoryStorage`]: process-local, for tests and ephemeral clients

mod file;
mod keys;
mod memory;
mod traits;

pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use traits::SecureStorage;

use ddp_config_and_utils::Paths;
use thiserror::Error;

/// Failures reading or writing persisted tokens.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The backend refused the operation (locked file, permissions).
    #[error("Token store unavailable: {0}")]
    Platform(String),

    #[error("Key not found: {0}")]
    NotFound(String),

    /// A stored value is not valid UTF-8 or not the expected shape.
    #[error("Stored value could not be decoded: {0}")]
    Encoding(String),

    #[error("Token store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Token store is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Create the default on-disk storage for `paths`.
pub fn create_storage(paths: &Paths) -> Box<dyn SecureStorage> {
    Box::new(FileStorage::new(paths.token_store_file()))
}
