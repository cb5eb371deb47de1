use super::harness::{recorder, test_config, Harness, CONNECTION_ID};
use crate::{hash_password, ClientError, DdpClient, SessionState, UserSelector};
use client_storage::{MemoryStorage, SecureStorage, StorageError, StorageKeys, StorageResult};
use ddp_protocol::{RecordingTransport, RemoteError, Transport, TransportEvent};
use serde_json::json;
use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

/// A logged-in client resumed from a stored token.
fn logged_in() -> Harness {
    let storage = Arc::new(MemoryStorage::new());
    storage.set(&StorageKeys::token(CONNECTION_ID), "tok-1").unwrap();
    let h = Harness::with_storage(test_config(), storage);
    h.event(TransportEvent::Connected);
    h.succeed(&h.call_id("login"), json!({"id": "u1", "token": "tok-1"}));
    h.transport.clear();
    h
}

#[test]
fn bootstrap_resumes_stored_token() {
    let h = logged_in();
    assert_eq!(h.client.user_id().as_deref(), Some("u1"));
    assert_eq!(h.client.auth_token().as_deref(), Some("tok-1"));
    assert_eq!(h.client.session().state(), SessionState::LoggedIn);
    assert!(!h.client.logging_in());
}

#[test]
fn bootstrap_without_token_skips_login() {
    let h = Harness::new();
    h.event(TransportEvent::Connected);
    assert!(h.transport.methods().is_empty());
    assert!(!h.client.logging_in());
    assert_eq!(h.client.session().state(), SessionState::LoggedOut);
}

struct BrokenStorage;

impl SecureStorage for BrokenStorage {
    fn set(&self, _key: &str, _value: &str) -> StorageResult<()> {
        Err(StorageError::Platform("locked".into()))
    }

    fn get(&self, _key: &str) -> StorageResult<Option<String>> {
        Err(StorageError::Platform("locked".into()))
    }

    fn delete(&self, _key: &str) -> StorageResult<bool> {
        Err(StorageError::Platform("locked".into()))
    }
}

#[test]
fn unreadable_storage_is_treated_as_no_token() {
    let client = DdpClient::new(test_config(), Arc::new(BrokenStorage));
    let transport = Rc::new(RecordingTransport::new());
    client.connect(transport.clone() as Rc<dyn Transport>);
    client.handle_event(TransportEvent::Connected);

    assert!(transport.methods().is_empty());
    assert!(!client.logging_in());
    assert_eq!(client.user_id(), None);
}

#[test]
fn login_failure_clears_session_and_fires_user_signal_once() {
    let h = logged_in();
    let runs = Rc::new(Cell::new(0));
    let r = runs.clone();
    let watched = h.client.clone();
    let _computation = h.client.tracker().autorun(move |_| {
        r.set(r.get() + 1);
        let _ = watched.user_id();
    });

    let outcomes = recorder();
    let sink = outcomes.clone();
    h.client
        .login_with_password("ada", "wrong", None, move |r| sink.borrow_mut().push(r));
    h.fail(&h.call_id("login"), RemoteError::new(403, "Incorrect password"));

    assert_eq!(runs.get(), 2);
    assert_eq!(h.client.user_id(), None);
    assert_eq!(h.client.auth_token(), None);
    assert_eq!(h.stored_token(), None);
    assert!(matches!(
        outcomes.borrow()[0],
        Err(ClientError::Remote(ref e)) if e.code() == Some(403)
    ));
    assert_eq!(h.client.session().state(), SessionState::LoggedOut);
}

#[test]
fn password_login_sends_selector_and_digest() {
    let h = Harness::connected();
    h.client
        .login_with_password("ada@example.com", "secret", Some("admins"), |_| {});
    h.client
        .login_with_password(UserSelector::Id("u9".into()), "secret", None, |_| {});

    let methods = h.transport.methods();
    assert_eq!(
        methods[0].2,
        vec![json!({
            "user": {"email": "ada@example.com"},
            "password": hash_password("secret"),
            "group": "admins",
        })]
    );
    assert_eq!(methods[1].2[0]["user"], json!({"id": "u9"}));
}

#[test]
fn successful_login_persists_token_and_runs_hooks() {
    let h = Harness::connected();
    let logins = recorder();
    let sink = logins.clone();
    h.client
        .session()
        .on_login(move |result| sink.borrow_mut().push(result.id.clone()));

    let outcomes = recorder();
    let sink = outcomes.clone();
    h.client
        .login_with_password("ada", "secret", None, move |r| sink.borrow_mut().push(r));
    assert!(h.client.logging_in());

    h.added("users", "u1", json!({"username": "ada"}));
    h.succeed(
        &h.call_id("login"),
        json!({"id": "u1", "token": "tok-9", "tokenExpires": {"$date": 1}}),
    );

    assert!(!h.client.logging_in());
    assert_eq!(h.stored_token().as_deref(), Some("tok-9"));
    assert_eq!(*logins.borrow(), vec!["u1".to_string()]);
    assert_eq!(h.client.user().unwrap()["username"], "ada");
    assert_eq!(outcomes.borrow()[0].as_ref().unwrap().token, "tok-9");
}

#[test]
fn logging_in_is_reactive() {
    let h = Harness::connected();
    let observed = recorder();
    let sink = observed.clone();
    let watched = h.client.clone();
    let _computation = h.client.tracker().autorun(move |_| {
        sink.borrow_mut().push(watched.logging_in());
    });

    h.client.login(json!({"oauth": "x"}), |_| {});
    h.client.flush();
    h.succeed(&h.call_id("login"), json!({"id": "u1", "token": "t"}));

    assert_eq!(*observed.borrow(), vec![false, true, false]);
}

#[test]
fn malformed_login_result_is_a_failure() {
    let h = Harness::connected();
    let failures = recorder();
    let sink = failures.clone();
    h.client
        .session()
        .on_login_failure(move |err| sink.borrow_mut().push(err.clone()));

    h.client.login(json!({"resume": "x"}), |_| {});
    h.succeed(&h.call_id("login"), json!({"token": "no id"}));

    assert!(matches!(failures.borrow()[0], ClientError::Validation(_)));
    assert_eq!(h.client.user_id(), None);
}

#[test]
fn session_is_resumed_after_reconnect() {
    let h = logged_in();
    h.event(TransportEvent::Disconnected);
    h.event(TransportEvent::Connected);

    let methods = h.transport.methods();
    assert_eq!(methods.len(), 1);
    assert_eq!(methods[0].1, "login");
    assert_eq!(methods[0].2, vec![json!({"resume": "tok-1"})]);
    assert!(h.client.logging_in());
}

#[test]
fn logout_cleans_up_and_reconnects_even_on_error() {
    let h = logged_in();
    let outcomes = recorder();
    let sink = outcomes.clone();
    h.client.logout(move |r| sink.borrow_mut().push(r));
    assert_eq!(h.client.user_id().as_deref(), Some("u1"));

    h.fail(&h.call_id("logout"), RemoteError::new(500, "Internal server error"));

    assert_eq!(h.client.user_id(), None);
    assert_eq!(h.stored_token(), None);
    assert_eq!(h.transport.connect_count(), 1);
    assert!(outcomes.borrow()[0].is_err());
    assert_eq!(h.client.session().state(), SessionState::LoggedOut);
}

#[test]
fn logout_other_clients_swaps_token_then_removes_others() {
    let h = logged_in();
    let outcomes = recorder();
    let sink = outcomes.clone();
    h.client.logout_other_clients(move |r| sink.borrow_mut().push(r));

    h.succeed(&h.call_id("getNewToken"), json!({"id": "u1", "token": "tok-2"}));
    assert_eq!(h.stored_token().as_deref(), Some("tok-2"));
    assert!(outcomes.borrow().is_empty());

    h.succeed(&h.call_id("removeOtherTokens"), json!(null));
    assert_eq!(*outcomes.borrow(), vec![Ok(())]);
}

#[test]
fn logout_other_clients_reports_token_error() {
    let h = logged_in();
    let outcomes = recorder();
    let sink = outcomes.clone();
    h.client.logout_other_clients(move |r| sink.borrow_mut().push(r));

    h.fail(&h.call_id("getNewToken"), RemoteError::new(403, "Not logged in"));

    assert!(outcomes.borrow()[0].is_err());
    assert!(h.transport.last_call_id("removeOtherTokens").is_none());
    assert_eq!(h.stored_token().as_deref(), Some("tok-1"));
}

#[test]
fn reconnect_without_stored_token_clears_session() {
    let h = logged_in();
    let runs = Rc::new(Cell::new(0));
    let r = runs.clone();
    let watched = h.client.clone();
    let _computation = h.client.tracker().autorun(move |_| {
        r.set(r.get() + 1);
        let _ = watched.user_id();
    });

    h.storage.delete(&StorageKeys::token(CONNECTION_ID)).unwrap();
    h.event(TransportEvent::Disconnected);
    h.event(TransportEvent::Connected);

    assert!(h.transport.methods().is_empty());
    assert_eq!(h.client.user_id(), None);
    assert_eq!(h.client.auth_token(), None);
    assert_eq!(h.client.session().state(), SessionState::LoggedOut);
    assert!(!h.client.logging_in());
    assert_eq!(runs.get(), 2);
}
