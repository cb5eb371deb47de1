use super::harness::{recorder, Harness};
use crate::{ClientError, DdpClient};
use client_storage::MemoryStorage;
use ddp_config_and_utils::Config;
use ddp_protocol::RemoteError;
use serde_json::json;
use std::sync::Arc;

#[test]
fn results_resolve_in_arrival_order() {
    let h = Harness::connected();
    let order = recorder();

    let seen = order.clone();
    let a = h
        .client
        .call("a", vec![], move |_| seen.borrow_mut().push("a"))
        .unwrap();
    let seen = order.clone();
    let b = h
        .client
        .call("b", vec![], move |_| seen.borrow_mut().push("b"))
        .unwrap();

    h.succeed(&b, json!(null));
    h.succeed(&a, json!(null));

    assert_eq!(*order.borrow(), vec!["b", "a"]);
    assert_eq!(h.client.correlator().pending_count(), 0);
}

#[test]
fn server_error_payload_reaches_callback() {
    let h = Harness::connected();
    let outcome = recorder();
    let sink = outcome.clone();
    let id = h
        .client
        .call("secret", vec![json!(1)], move |o| sink.borrow_mut().push(o))
        .unwrap();

    h.fail(&id, RemoteError::new(403, "Access denied"));

    let outcome = outcome.borrow();
    assert_eq!(outcome.len(), 1);
    assert_eq!(outcome[0].as_ref().unwrap_err().code(), Some(403));
}

#[test]
fn duplicate_and_unknown_results_are_ignored() {
    let h = Harness::connected();
    let count = recorder();
    let sink = count.clone();
    let id = h
        .client
        .call("once", vec![], move |_| sink.borrow_mut().push(()))
        .unwrap();

    h.succeed(&id, json!(1));
    h.succeed(&id, json!(2));
    h.succeed("never-sent", json!(3));

    assert_eq!(count.borrow().len(), 1);
}

#[test]
fn call_without_transport_fails_fast() {
    let client = DdpClient::new(Config::default(), Arc::new(MemoryStorage::new()));
    let result = client.call("ping", vec![], |_| {});
    assert_eq!(result, Err(ClientError::TransportUnavailable));
}

#[test]
fn pending_call_survives_disconnect() {
    let h = Harness::connected();
    let id = h.client.call("slow", vec![], |_| {}).unwrap();

    h.event(ddp_protocol::TransportEvent::Disconnected);
    assert!(h.client.correlator().is_pending(&id));

    h.event(ddp_protocol::TransportEvent::Connected);
    h.succeed(&id, json!("late"));
    assert_eq!(h.client.correlator().pending_count(), 0);
}

#[tokio::test]
async fn call_async_resolves_with_value() {
    let h = Harness::connected();
    let future = h.client.call_async("sum", vec![json!(1), json!(2)]);
    let id = h.call_id("sum");
    h.succeed(&id, json!(3));

    assert_eq!(future.await, Ok(json!(3)));
}

#[tokio::test]
async fn call_async_maps_remote_error() {
    let h = Harness::connected();
    let future = h.client.call_async("boom", vec![]);
    h.fail(&h.call_id("boom"), RemoteError::new(500, "Internal server error"));

    match future.await {
        Err(ClientError::Remote(err)) => assert_eq!(err.code(), Some(500)),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn call_async_without_transport() {
    let client = DdpClient::new(Config::default(), Arc::new(MemoryStorage::new()));
    assert_eq!(
        client.call_async("ping", vec![]).await,
        Err(ClientError::TransportUnavailable)
    );
}
