//! Method call correlation.
//!
//! Every outbound method call is registered under the id the transport
//! assigned to it; the matching `result` message removes the entry and runs
//! its callback once. Results may arrive in any order.

use crate::{current_transport, ClientError, ClientResult, TransportSlot};
use ddp_protocol::RemoteError;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Completion callback of a method call.
pub type MethodCallback = Box<dyn FnOnce(Result<Value, RemoteError>)>;

pub struct Correlator {
    transport: TransportSlot,
    pending: RefCell<HashMap<String, MethodCallback>>,
}

impl Correlator {
    pub(crate) fn new(transport: TransportSlot) -> Self {
        Self {
            transport,
            pending: RefCell::new(HashMap::new()),
        }
    }

    /// Send `name(params)` and register `callback` for its result.
    ///
    /// Fails without sending anything when no transport is attached. A call
    /// that never gets a result stays pending.
    pub fn invoke<F>(&self, name: &str, params: Vec<Value>, callback: F) -> ClientResult<String>
    where
        F: FnOnce(Result<Value, RemoteError>) + 'static,
    {
        let transport = current_transport(&self.transport).ok_or(ClientError::TransportUnavailable)?;
        let id = transport.method(name, params);

        let previous = self
            .pending
            .borrow_mut()
            .insert(id.clone(), Box::new(callback));
        if previous.is_some() {
            warn!(call_id = %id, method = %name, "Transport reused a pending call id");
        }
        debug!(call_id = %id, method = %name, "Method call sent");
        Ok(id)
    }

    /// Future form of [`invoke`](Self::invoke).
    pub fn invoke_async(
        &self,
        name: &str,
        params: Vec<Value>,
    ) -> impl Future<Output = ClientResult<Value>> + 'static {
        let (tx, rx) = oneshot::channel();
        let sent = self.invoke(name, params, move |outcome| {
            let _ = tx.send(outcome);
        });
        async move {
            sent?;
            match rx.await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => Err(ClientError::Remote(err)),
                Err(_) => Err(ClientError::Canceled),
            }
        }
    }

    /// Deliver a result. Returns false for ids with no pending call.
    pub fn handle_result(&self, id: &str, outcome: Result<Value, RemoteError>) -> bool {
        let callback = self.pending.borrow_mut().remove(id);
        match callback {
            Some(callback) => {
                debug!(call_id = %id, ok = outcome.is_ok(), "Method result received");
                callback(outcome);
                true
            }
            None => {
                warn!(call_id = %id, "Result for unknown method call");
                false
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.borrow().contains_key(id)
    }

    pub(crate) fn has_transport(&self) -> bool {
        self.transport.borrow().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddp_protocol::{RecordingTransport, Transport};
    use serde_json::json;
    use std::rc::Rc;

    fn correlator() -> (Correlator, Rc<RecordingTransport>) {
        let transport = Rc::new(RecordingTransport::new());
        let slot: TransportSlot = Rc::new(RefCell::new(Some(transport.clone() as Rc<dyn Transport>)));
        (Correlator::new(slot), transport)
    }

    #[test]
    fn fails_fast_without_transport() {
        let correlator = Correlator::new(Rc::new(RefCell::new(None)));
        let result = correlator.invoke("ping", vec![], |_| panic!("must not run"));
        assert_eq!(result, Err(ClientError::TransportUnavailable));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[test]
    fn callback_runs_once_and_entry_is_removed() {
        let (correlator, transport) = correlator();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let id = correlator
            .invoke("sum", vec![json!(1), json!(2)], move |outcome| {
                sink.borrow_mut().push(outcome)
            })
            .unwrap();

        assert_eq!(transport.methods()[0].1, "sum");
        assert!(correlator.is_pending(&id));

        assert!(correlator.handle_result(&id, Ok(json!(3))));
        assert!(!correlator.handle_result(&id, Ok(json!(4))));
        assert_eq!(*seen.borrow(), vec![Ok(json!(3))]);
        assert_eq!(correlator.pending_count(), 0);
    }

    #[test]
    fn unknown_result_is_ignored() {
        let (correlator, _) = correlator();
        assert!(!correlator.handle_result("nope", Ok(Value::Null)));
    }
}
