//! Connection state machine using rust-fsm.
//!
//! ## State Diagram
//!
//! ```text
//! ┌──────────────┐  ConnectRequested   ┌──────────────┐
//! │ Disconnected │ ──────────────────► │  Connecting  │
//! └──────────────┘                     └──────┬───────┘
//!        ▲                                    │ TransportConnected
//!        │ TransportDisconnected              ▼
//!        │                             ┌──────────────┐
//!        └──────────────────────────── │  Connected   │
//!                                      └──────────────┘
//! ```
//!
//! Besides tracking status, the manager owns the "run once connected"
//! queues used by optimistic writes, and decides whether a dropped
//! connection is retried right away or after the debounce window.

use crate::{current_transport, TransportSlot};
use reactive_tracker::{Dependency, Tracker};
use rust_fsm::*;
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

state_machine! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub connection_machine(Disconnected)

    Disconnected => {
        ConnectRequested => Connecting,
        TransportConnected => Connected,
        TransportDisconnected => Disconnected
    },
    Connecting => {
        ConnectRequested => Connecting,
        TransportConnected => Connected,
        TransportDisconnected => Disconnected
    },
    Connected => {
        ConnectRequested => Connected,
        TransportDisconnected => Disconnected
    }
}

pub use connection_machine::Input as ConnectionInput;
pub use connection_machine::State as ConnectionMachineState;
pub use connection_machine::StateMachine as ConnectionMachine;

/// Externally visible connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&ConnectionMachineState> for ConnectionStatus {
    fn from(state: &ConnectionMachineState) -> Self {
        match state {
            ConnectionMachineState::Disconnected => ConnectionStatus::Disconnected,
            ConnectionMachineState::Connecting => ConnectionStatus::Connecting,
            ConnectionMachineState::Connected => ConnectionStatus::Connected,
        }
    }
}

/// Snapshot returned by the reactive `status()` accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusInfo {
    pub connected: bool,
    pub status: ConnectionStatus,
}

/// Work to run once the connection is up.
pub type Continuation = Box<dyn FnOnce()>;

pub struct ConnectionManager {
    transport: TransportSlot,
    fsm: RefCell<ConnectionMachine>,
    status_dep: Dependency,
    auto_reconnect: Cell<bool>,
    debounce: Duration,
    last_disconnect: Cell<Option<Instant>>,
    retry_at: Cell<Option<Instant>>,
    /// Registered while a transport exists but is not connected.
    waiters: RefCell<VecDeque<Continuation>>,
    /// Registered before any transport was attached.
    deferred: RefCell<VecDeque<Continuation>>,
}

impl ConnectionManager {
    pub(crate) fn new(
        tracker: &Tracker,
        transport: TransportSlot,
        auto_reconnect: bool,
        debounce: Duration,
    ) -> Self {
        Self {
            transport,
            fsm: RefCell::new(ConnectionMachine::new()),
            status_dep: tracker.dependency(),
            auto_reconnect: Cell::new(auto_reconnect),
            debounce,
            last_disconnect: Cell::new(None),
            retry_at: Cell::new(None),
            waiters: RefCell::new(VecDeque::new()),
            deferred: RefCell::new(VecDeque::new()),
        }
    }

    fn current(&self) -> ConnectionStatus {
        ConnectionStatus::from(self.fsm.borrow().state())
    }

    /// Apply `input`. An input the machine rejects is logged and the state
    /// is forced to `target`, since the transport is the source of truth.
    fn transition(&self, input: &ConnectionInput, target: ConnectionMachineState) -> ConnectionStatus {
        let mut fsm = self.fsm.borrow_mut();
        let old_state = ConnectionStatus::from(fsm.state());
        if fsm.consume(input).is_err() {
            warn!(
                state = %old_state,
                input = ?input,
                "Unexpected connection input, forcing state"
            );
            *fsm = ConnectionMachine::from_state(target);
        }
        let new_state = ConnectionStatus::from(fsm.state());
        drop(fsm);

        if old_state != new_state {
            debug!(old_state = %old_state, new_state = %new_state, "Connection state transition");
            self.status_dep.changed();
        }
        new_state
    }

    /// Non-reactive status.
    pub fn current_status(&self) -> ConnectionStatus {
        self.current()
    }

    pub fn is_connected(&self) -> bool {
        self.current() == ConnectionStatus::Connected
    }

    /// Reactive status.
    pub fn status(&self) -> StatusInfo {
        self.status_dep.depend();
        let status = self.current();
        StatusInfo {
            connected: status == ConnectionStatus::Connected,
            status,
        }
    }

    pub fn auto_reconnect(&self) -> bool {
        self.auto_reconnect.get()
    }

    pub fn has_transport(&self) -> bool {
        self.transport.borrow().is_some()
    }

    /// Ask the transport to connect. A no-op without a transport.
    pub fn request_connect(&self) {
        let Some(transport) = current_transport(&self.transport) else {
            debug!("Connect requested with no transport attached");
            return;
        };
        self.retry_at.set(None);
        self.transition(&ConnectionInput::ConnectRequested, ConnectionMachineState::Connecting);
        transport.connect();
    }

    pub(crate) fn handle_connected(&self) {
        self.transition(&ConnectionInput::TransportConnected, ConnectionMachineState::Connected);
        self.retry_at.set(None);
        info!("Connected");
    }

    pub(crate) fn handle_disconnected(&self) {
        self.transition(
            &ConnectionInput::TransportDisconnected,
            ConnectionMachineState::Disconnected,
        );
        let now = Instant::now();
        let previous = self.last_disconnect.replace(Some(now));
        info!("Disconnected");

        if !self.auto_reconnect.get() {
            return;
        }
        match previous {
            Some(at) if now.duration_since(at) < self.debounce => {
                debug!(
                    debounce_ms = self.debounce.as_millis() as u64,
                    "Reconnect suppressed by debounce"
                );
                self.retry_at.set(Some(now + self.debounce));
            }
            _ => self.request_connect(),
        }
    }

    /// Run `continuation` once connected: now if already connected, after
    /// the next connect otherwise.
    pub fn when_connected(&self, continuation: Continuation) {
        if !self.has_transport() {
            self.deferred.borrow_mut().push_back(continuation);
            return;
        }
        if self.is_connected() {
            continuation();
            return;
        }
        self.waiters.borrow_mut().push_back(continuation);
    }

    /// Run the continuations waiting for a connection, in registration
    /// order. Stops early if one of them drops the connection.
    pub(crate) fn run_waiters(&self) {
        loop {
            if !self.is_connected() {
                return;
            }
            let next = self.waiters.borrow_mut().pop_front();
            match next {
                Some(continuation) => continuation(),
                None => return,
            }
        }
    }

    /// Re-examine continuations deferred while no transport existed.
    /// Returns how many were handed on.
    pub fn poll_deferred(&self) -> usize {
        if !self.has_transport() {
            return 0;
        }
        let deferred: Vec<Continuation> = self.deferred.borrow_mut().drain(..).collect();
        let count = deferred.len();
        for continuation in deferred {
            self.when_connected(continuation);
        }
        count
    }

    /// Retry a reconnect that the debounce window held back.
    pub fn poll_reconnect(&self) -> bool {
        let Some(at) = self.retry_at.get() else {
            return false;
        };
        if Instant::now() < at {
            return false;
        }
        self.retry_at.set(None);
        if !self.auto_reconnect.get() || self.current() != ConnectionStatus::Disconnected {
            return false;
        }
        debug!("Retrying debounced reconnect");
        self.request_connect();
        true
    }

    pub fn pending_continuations(&self) -> usize {
        self.waiters.borrow().len() + self.deferred.borrow().len()
    }

    /// Re-enable auto-reconnect and connect.
    pub fn reconnect(&self) {
        self.auto_reconnect.set(true);
        self.request_connect();
    }

    /// Disable auto-reconnect and close the transport.
    pub fn disconnect(&self) {
        self.auto_reconnect.set(false);
        self.retry_at.set(None);
        if let Some(transport) = current_transport(&self.transport) {
            info!("Disconnect requested");
            transport.disconnect();
        }
    }

    /// Connectivity hint from the host platform.
    pub fn network_changed(&self, online: bool) {
        debug!(online, "Network status changed");
        if online && self.auto_reconnect.get() && !self.is_connected() {
            self.request_connect();
        }
    }
}
