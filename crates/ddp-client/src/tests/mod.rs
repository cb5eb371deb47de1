//! Scenario tests for the sync client.
//!
//! Every test drives a [`DdpClient`](crate::DdpClient) through a
//! `RecordingTransport` and feeds server events back by hand.
//!
//! - `correlator.rs`    - method call correlation and out-of-order results
//! - `subscriptions.rs` - reactive subscription reuse, readiness, teardown
//! - `collections.rs`   - optimistic writes, rollback, reactive reads
//! - `connection.rs`    - connect/resubscribe, wait-until-connected, debounce
//! - `session.rs`       - login, logout, token bootstrap
//! - `accounts.rs`      - account helpers and their local validation

mod correlator;
mod session;
