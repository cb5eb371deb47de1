//! Configuration, paths, logging and id helpers shared by the ddp-sync crates.

mod config;
mod error;
mod logging;
mod paths;
pub mod random;

pub use config::{
    Config, DEFAULT_DEFERRED_POLL_INTERVAL_MS, DEFAULT_ENDPOINT, DEFAULT_LOG_LEVEL,
    DEFAULT_RECONNECT_DEBOUNCE_MS,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_for_service, parse_level};
pub use paths::Paths;
