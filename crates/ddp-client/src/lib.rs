//! Client-side sync engine for DDP servers.
//!
//! [`DdpClient`] keeps a local mirror of the documents the server publishes,
//! tracks subscriptions reactively, correlates method calls with their
//! results, applies writes optimistically and resumes the login session
//! whenever the connection comes back.
//!
//! The client is single-threaded. A transport pushes [`TransportEvent`]s
//! into [`DdpClient::handle_event`] (or [`DdpClient::run`]); every event is
//! followed by a reactive flush.
//!
//! [`TransportEvent`]: ddp_protocol::TransportEvent

pub mod accounts;
pub mod client;
pub mod collection;
pub mod connection;
pub mod correlator;
pub mod error;
pub mod password;
pub mod session;
pub mod subscriptions;

#[cfg(test)]
mod tests;

pub use accounts::{Accounts, CreateUserOptions};
pub use client::{DdpClient, USERS_COLLECTION};
pub use collection::{Collection, CollectionOptions, Cursor, Transform};
pub use connection::{ConnectionManager, ConnectionStatus, StatusInfo};
pub use correlator::{Correlator, MethodCallback};
pub use error::{
    ClientError, ClientResult, CollectionError, CollectionResult, SessionError, SessionResult,
};
pub use password::{hash_password, UserSelector};
pub use session::{LoginResult, SessionManager, SessionState};
pub use subscriptions::{SubscribeCallbacks, SubscriptionHandle, SubscriptionManager};

use ddp_protocol::Transport;
use std::cell::RefCell;
use std::rc::Rc;

/// The transport shared by every component; empty until `connect`.
pub(crate) type TransportSlot = Rc<RefCell<Option<Rc<dyn Transport>>>>;

pub(crate) fn current_transport(slot: &TransportSlot) -> Option<Rc<dyn Transport>> {
    slot.borrow().clone()
}
