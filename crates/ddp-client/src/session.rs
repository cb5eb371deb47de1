//! Session state machine using rust-fsm.
//!
//! ## State Diagram
//!
//! ```text
//! ┌─────────────┐  LoginStarted   ┌─────────────┐
//! │  LoggedOut  │ ──────────────► │  LoggingIn  │
//! └─────────────┘                 └──────┬──────┘
//!        ▲                               │ LoginSucceeded
//!        │ LoginFailed / LogoutCompleted ▼
//!        │                        ┌─────────────┐
//!        └─────────────────────── │  LoggedIn   │
//!                                 └─────────────┘
//! ```
//!
//! The login token is persisted under `TOKEN/<connection_id>` and resumed on
//! every `connected` event.

use crate::client::USERS_COLLECTION;
use crate::connection::ConnectionManager;
use crate::correlator::Correlator;
use crate::password::{hash_password, UserSelector};
use crate::{ClientError, ClientResult, SessionError, SessionResult};
use client_storage::{SecureStorage, StorageKeys};
use ddp_protocol::RemoteError;
use mirror_store::{Document, MirrorStore};
use reactive_tracker::{Dependency, Tracker};
use rust_fsm::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, info, warn};

state_machine! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub session_machine(LoggedOut)

    LoggedOut => {
        LoginStarted => LoggingIn,
        LoginAborted => LoggedOut,
        LogoutCompleted => LoggedOut
    },
    LoggingIn => {
        LoginStarted => LoggingIn,
        LoginSucceeded => LoggedIn,
        LoginFailed => LoggedOut,
        LoginAborted => LoggedOut,
        LogoutCompleted => LoggedOut
    },
    LoggedIn => {
        LoginStarted => LoggingIn,
        LoginSucceeded => LoggedIn,
        LoginFailed => LoggedOut,
        LoginAborted => LoggedIn,
        LogoutCompleted => LoggedOut
    }
}

pub use session_machine::Input as SessionMachineInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// User-facing session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    LoggedOut,
    LoggingIn,
    LoggedIn,
}

impl From<&SessionMachineState> for SessionState {
    fn from(state: &SessionMachineState) -> Self {
        match state {
            SessionMachineState::LoggedOut => SessionState::LoggedOut,
            SessionMachineState::LoggingIn => SessionState::LoggingIn,
            SessionMachineState::LoggedIn => SessionState::LoggedIn,
        }
    }
}

/// Successful `login` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResult {
    pub id: String,
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_expires: Option<Value>,
}

/// Completion callback of a login-like operation.
pub type LoginCallback = Box<dyn FnOnce(ClientResult<LoginResult>)>;

type LoginHook = Rc<dyn Fn(&LoginResult)>;
type LoginFailureHook = Rc<dyn Fn(&ClientError)>;

pub struct SessionManager {
    correlator: Rc<Correlator>,
    connection: Rc<ConnectionManager>,
    store: Rc<MirrorStore>,
    storage: Arc<dyn SecureStorage>,
    token_key: String,
    fsm: RefCell<SessionMachine>,
    login_dep: Dependency,
    user_dep: Dependency,
    user_id: RefCell<Option<String>>,
    token: RefCell<Option<String>>,
    on_login: RefCell<Vec<LoginHook>>,
    on_login_failure: RefCell<Vec<LoginFailureHook>>,
}

impl SessionManager {
    pub(crate) fn new(
        tracker: &Tracker,
        correlator: Rc<Correlator>,
        connection: Rc<ConnectionManager>,
        store: Rc<MirrorStore>,
        storage: Arc<dyn SecureStorage>,
        connection_id: &str,
    ) -> Self {
        Self {
            correlator,
            connection,
            store,
            storage,
            token_key: StorageKeys::token(connection_id),
            fsm: RefCell::new(SessionMachine::new()),
            login_dep: tracker.dependency(),
            user_dep: tracker.dependency(),
            user_id: RefCell::new(None),
            token: RefCell::new(None),
            on_login: RefCell::new(Vec::new()),
            on_login_failure: RefCell::new(Vec::new()),
        }
    }

    pub fn state(&self) -> SessionState {
        SessionState::from(self.fsm.borrow().state())
    }

    fn transition(&self, input: &SessionMachineInput) -> SessionResult<SessionState> {
        let mut fsm = self.fsm.borrow_mut();
        let old_state = SessionState::from(fsm.state());
        fsm.consume(input).map_err(|_| {
            SessionError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                fsm.state()
            ))
        })?;
        let new_state = SessionState::from(fsm.state());
        drop(fsm);

        debug!(old_state = ?old_state, new_state = ?new_state, input = ?input, "Session state transition");
        if (old_state == SessionState::LoggingIn) != (new_state == SessionState::LoggingIn) {
            self.login_dep.changed();
        }
        Ok(new_state)
    }

    fn advance(&self, input: SessionMachineInput) {
        if let Err(e) = self.transition(&input) {
            warn!(error = %e, "Ignoring session input");
        }
    }

    /// Reactive: whether a login call is in flight.
    pub fn logging_in(&self) -> bool {
        self.login_dep.depend();
        self.state() == SessionState::LoggingIn
    }

    /// Reactive: id of the logged-in user.
    pub fn user_id(&self) -> Option<String> {
        self.user_dep.depend();
        self.user_id.borrow().clone()
    }

    /// Reactive: the mirrored `users` document of the logged-in user.
    pub fn user(&self) -> Option<Document> {
        let id = self.user_id()?;
        self.store.get(USERS_COLLECTION, &id)
    }

    pub fn auth_token(&self) -> Option<String> {
        self.token.borrow().clone()
    }

    pub fn token_key(&self) -> &str {
        &self.token_key
    }

    pub fn on_login(&self, hook: impl Fn(&LoginResult) + 'static) {
        self.on_login.borrow_mut().push(Rc::new(hook));
    }

    pub fn on_login_failure(&self, hook: impl Fn(&ClientError) + 'static) {
        self.on_login_failure.borrow_mut().push(Rc::new(hook));
    }

    /// Log in with a password. `selector` strings containing `@` are
    /// treated as emails.
    pub fn login_with_password(
        self: &Rc<Self>,
        selector: impl Into<UserSelector>,
        password: &str,
        group: Option<&str>,
        callback: impl FnOnce(ClientResult<LoginResult>) + 'static,
    ) {
        let mut request = json!({
            "user": selector.into().to_value(),
            "password": hash_password(password),
        });
        if let (Some(group), Some(map)) = (group, request.as_object_mut()) {
            map.insert("group".to_string(), Value::String(group.to_string()));
        }
        self.login(request, callback);
    }

    /// Call `login` with arbitrary credentials.
    pub fn login(
        self: &Rc<Self>,
        credentials: Value,
        callback: impl FnOnce(ClientResult<LoginResult>) + 'static,
    ) {
        self.login_call("login", vec![credentials], Box::new(callback));
    }

    /// Start logging in through `method`, completing like `login`.
    pub(crate) fn login_call(self: &Rc<Self>, method: &str, params: Vec<Value>, callback: LoginCallback) {
        if !self.correlator.has_transport() {
            callback(Err(ClientError::TransportUnavailable));
            return;
        }

        self.advance(SessionMachineInput::LoginStarted);
        let this = Rc::downgrade(self);
        let sent = self.correlator.invoke(method, params, move |outcome| {
            let Some(this) = this.upgrade() else {
                return;
            };
            let result = this.complete_login(outcome);
            callback(result);
        });
        if let Err(e) = sent {
            warn!(error = %e, method = %method, "Login call not sent");
            self.advance(SessionMachineInput::LoginAborted);
        }
    }

    /// Resume with `token`. Without one, a previous session is cleared and
    /// the logging-in state is left.
    pub fn login_with_token(self: &Rc<Self>, token: Option<String>) {
        match token {
            Some(token) => {
                *self.token.borrow_mut() = Some(token.clone());
                self.login(json!({ "resume": token }), |_| {});
            }
            None if self.user_id.borrow().is_some() => {
                debug!("No token to resume, clearing session");
                self.handle_logout();
            }
            None => {
                *self.token.borrow_mut() = None;
                self.advance(SessionMachineInput::LoginAborted);
            }
        }
    }

    /// Load the persisted token and resume with it.
    pub(crate) fn load_initial_user(self: &Rc<Self>) {
        let token = match self.storage.get(&self.token_key) {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, key = %self.token_key, "Failed to load stored token");
                None
            }
        };
        debug!(has_token = token.is_some(), "Bootstrapping session");
        self.login_with_token(token);
    }

    /// Adopt or reject the outcome of a login-like call.
    pub(crate) fn complete_login(&self, outcome: Result<Value, RemoteError>) -> ClientResult<LoginResult> {
        let parsed = outcome.map_err(ClientError::Remote).and_then(|value| {
            serde_json::from_value::<LoginResult>(value)
                .map_err(|e| ClientError::Validation(format!("Malformed login result: {e}")))
        });

        match parsed {
            Ok(result) => {
                self.adopt(&result);
                self.advance(SessionMachineInput::LoginSucceeded);
                info!(user_id = %result.id, "Logged in");
                let hooks: Vec<LoginHook> = self.on_login.borrow().clone();
                for hook in hooks {
                    hook(&result);
                }
                Ok(result)
            }
            Err(err) => {
                self.clear_session();
                self.advance(SessionMachineInput::LoginFailed);
                warn!(error = %err, "Login failed");
                let hooks: Vec<LoginFailureHook> = self.on_login_failure.borrow().clone();
                for hook in hooks {
                    hook(&err);
                }
                Err(err)
            }
        }
    }

    fn adopt(&self, result: &LoginResult) {
        if let Err(e) = self.storage.set(&self.token_key, &result.token) {
            warn!(error = %e, key = %self.token_key, "Failed to persist token");
        }
        *self.token.borrow_mut() = Some(result.token.clone());
        *self.user_id.borrow_mut() = Some(result.id.clone());
        self.user_dep.changed();
    }

    /// Forget the stored token and the current user.
    fn clear_session(&self) {
        if let Err(e) = self.storage.delete(&self.token_key) {
            warn!(error = %e, key = %self.token_key, "Failed to delete stored token");
        }
        *self.token.borrow_mut() = None;
        *self.user_id.borrow_mut() = None;
        self.user_dep.changed();
    }

    /// Local logout cleanup, without talking to the server.
    pub fn handle_logout(&self) {
        self.clear_session();
        self.advance(SessionMachineInput::LogoutCompleted);
    }

    /// Call `logout`, then clean up and reconnect whatever the server said.
    pub fn logout(self: &Rc<Self>, callback: impl FnOnce(ClientResult<()>) + 'static) {
        if !self.correlator.has_transport() {
            self.handle_logout();
            callback(Err(ClientError::TransportUnavailable));
            return;
        }

        let this = Rc::downgrade(self);
        let sent = self.correlator.invoke("logout", vec![], move |outcome| {
            let Some(this) = this.upgrade() else {
                return;
            };
            this.handle_logout();
            info!("Logged out");
            this.connection.request_connect();
            callback(outcome.map(|_| ()).map_err(ClientError::Remote));
        });
        if let Err(e) = sent {
            warn!(error = %e, "Logout call not sent");
            self.handle_logout();
        }
    }

    /// Swap the current token for a fresh one and invalidate every other
    /// token of this user.
    pub fn logout_other_clients(self: &Rc<Self>, callback: impl FnOnce(ClientResult<()>) + 'static) {
        if !self.correlator.has_transport() {
            callback(Err(ClientError::TransportUnavailable));
            return;
        }

        let this = Rc::downgrade(self);
        let sent = self.correlator.invoke("getNewToken", vec![], move |outcome| {
            let Some(this) = this.upgrade() else {
                return;
            };
            let value = match outcome {
                Ok(value) => value,
                Err(e) => {
                    callback(Err(ClientError::Remote(e)));
                    return;
                }
            };
            if let Err(e) = this.complete_login(Ok(value)) {
                callback(Err(e));
                return;
            }
            let sent = this.correlator.invoke("removeOtherTokens", vec![], move |outcome| {
                callback(outcome.map(|_| ()).map_err(ClientError::Remote));
            });
            if let Err(e) = sent {
                warn!(error = %e, "removeOtherTokens not sent");
            }
        });
        if let Err(e) = sent {
            warn!(error = %e, "getNewToken not sent");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn machine_transitions() {
        let mut machine = SessionMachine::new();
        assert_eq!(machine.state(), &SessionMachineState::LoggedOut);
        assert!(machine.consume(&SessionMachineInput::LoginSucceeded).is_err());
        machine.consume(&SessionMachineInput::LoginStarted).unwrap();
        machine.consume(&SessionMachineInput::LoginSucceeded).unwrap();
        assert_eq!(machine.state(), &SessionMachineState::LoggedIn);
        machine.consume(&SessionMachineInput::LogoutCompleted).unwrap();
        assert_eq!(machine.state(), &SessionMachineState::LoggedOut);
    }

    #[test]
    fn login_result_parses_optional_expiry() {
        let result: LoginResult =
            serde_json::from_value(json!({"id": "u1", "token": "t1", "tokenExpires": {"$date": 1}}))
                .unwrap();
        assert_eq!(result.id, "u1");
        assert!(result.token_expires.is_some());

        let bare: LoginResult = serde_json::from_value(json!({"id": "u1", "token": "t1"})).unwrap();
        assert_eq!(bare.token_expires, None);
    }
}
