//! Subscription registry.
//!
//! A subscription made inside a reactive computation is marked inactive when
//! that computation is invalidated and torn down after the following flush
//! unless the re-run asks for the same `(name, params)` again, in which case
//! the existing record is reclaimed and nothing goes over the wire.
//!
//! Records keep their local id across reconnects; only the transport-level
//! id is replaced by [`SubscriptionManager::restart`].

use crate::{current_transport, TransportSlot};
use ddp_config_and_utils::random;
use ddp_protocol::RemoteError;
use reactive_tracker::{Dependency, Tracker};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use tracing::{debug, warn};

type ReadyCallback = Box<dyn FnOnce()>;
type StopCallback = Box<dyn FnOnce()>;
type ErrorCallback = Box<dyn FnOnce(RemoteError)>;

/// Optional lifecycle callbacks for [`SubscriptionManager::subscribe`].
#[derive(Default)]
pub struct SubscribeCallbacks {
    ready: Option<ReadyCallback>,
    stop: Option<StopCallback>,
    error: Option<ErrorCallback>,
}

impl SubscribeCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Callbacks with only a ready handler.
    pub fn on_ready(f: impl FnOnce() + 'static) -> Self {
        Self::new().with_ready(f)
    }

    pub fn with_ready(mut self, f: impl FnOnce() + 'static) -> Self {
        self.ready = Some(Box::new(f));
        self
    }

    pub fn with_stop(mut self, f: impl FnOnce() + 'static) -> Self {
        self.stop = Some(Box::new(f));
        self
    }

    /// Runs when the server ends the subscription with an error.
    pub fn with_error(mut self, f: impl FnOnce(RemoteError) + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }
}

struct SubscriptionRecord {
    transport_id: Option<String>,
    name: String,
    params: Vec<Value>,
    inactive: bool,
    ready: bool,
    ready_dep: Dependency,
    seq: u64,
    on_ready: Option<ReadyCallback>,
    on_stop: Option<StopCallback>,
    on_error: Option<ErrorCallback>,
}

pub struct SubscriptionManager {
    tracker: Tracker,
    transport: TransportSlot,
    online: Cell<bool>,
    records: RefCell<HashMap<String, SubscriptionRecord>>,
    next_seq: Cell<u64>,
}

impl SubscriptionManager {
    pub(crate) fn new(tracker: Tracker, transport: TransportSlot) -> Self {
        Self {
            tracker,
            transport,
            online: Cell::new(false),
            records: RefCell::new(HashMap::new()),
            next_seq: Cell::new(0),
        }
    }

    /// Subscribe to publication `name` with `params`.
    ///
    /// Inside an active computation an inactive record with the same name
    /// and params is reclaimed instead of creating a new one, and the new
    /// record is scheduled for teardown when the computation is invalidated.
    pub fn subscribe(
        self: &Rc<Self>,
        name: &str,
        params: Vec<Value>,
        callbacks: SubscribeCallbacks,
    ) -> SubscriptionHandle {
        let id = match self.reclaim(name, &params, callbacks) {
            Ok(id) => {
                debug!(sub_id = %id, name = %name, "Reusing inactive subscription");
                id
            }
            Err(callbacks) => self.create(name, params, callbacks),
        };

        if self.tracker.active() {
            let manager = Rc::downgrade(self);
            let record_id = id.clone();
            let tracker = self.tracker.clone();
            self.tracker.on_invalidate(move |_| {
                let Some(this) = manager.upgrade() else {
                    return;
                };
                if !this.set_inactive(&record_id) {
                    return;
                }
                let manager = Rc::downgrade(&this);
                tracker.after_flush(move || {
                    if let Some(this) = manager.upgrade() {
                        if this.is_inactive(&record_id) {
                            this.stop(&record_id);
                        }
                    }
                });
            });
        }

        SubscriptionHandle {
            id,
            manager: Rc::downgrade(self),
        }
    }

    /// Claim one inactive record matching `(name, params)`. Hands the
    /// callbacks back when there is nothing to reclaim.
    fn reclaim(
        &self,
        name: &str,
        params: &[Value],
        callbacks: SubscribeCallbacks,
    ) -> Result<String, SubscribeCallbacks> {
        if !self.tracker.active() {
            return Err(callbacks);
        }
        let mut records = self.records.borrow_mut();
        let candidate = records
            .iter()
            .filter(|(_, r)| r.inactive && r.name == name && r.params == params)
            .min_by_key(|(_, r)| r.seq)
            .map(|(id, _)| id.clone());
        let Some(id) = candidate else {
            return Err(callbacks);
        };
        let Some(record) = records.get_mut(&id) else {
            return Err(callbacks);
        };

        record.inactive = false;
        if !record.ready {
            if let Some(ready) = callbacks.ready {
                record.on_ready = Some(ready);
            }
        }
        if let Some(stop) = callbacks.stop {
            record.on_stop = Some(stop);
        }
        if let Some(error) = callbacks.error {
            record.on_error = Some(error);
        }
        Ok(id)
    }

    fn create(&self, name: &str, params: Vec<Value>, callbacks: SubscribeCallbacks) -> String {
        let id = random::id();
        let transport_id = match current_transport(&self.transport) {
            Some(transport) if self.online.get() => Some(transport.sub(name, &params)),
            _ => None,
        };
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);

        debug!(
            sub_id = %id,
            transport_id = ?transport_id,
            name = %name,
            "Subscription created"
        );
        self.records.borrow_mut().insert(
            id.clone(),
            SubscriptionRecord {
                transport_id,
                name: name.to_string(),
                params,
                inactive: false,
                ready: false,
                ready_dep: self.tracker.dependency(),
                seq,
                on_ready: callbacks.ready,
                on_stop: callbacks.stop,
                on_error: callbacks.error,
            },
        );
        id
    }

    fn set_inactive(&self, id: &str) -> bool {
        match self.records.borrow_mut().get_mut(id) {
            Some(record) => {
                record.inactive = true;
                true
            }
            None => false,
        }
    }

    fn is_inactive(&self, id: &str) -> bool {
        self.records
            .borrow()
            .get(id)
            .map(|r| r.inactive)
            .unwrap_or(false)
    }

    /// Tear down a subscription now. Returns false if it was already gone.
    pub fn stop(&self, id: &str) -> bool {
        let Some(record) = self.records.borrow_mut().remove(id) else {
            return false;
        };
        if let (Some(transport_id), Some(transport)) =
            (&record.transport_id, current_transport(&self.transport))
        {
            if self.online.get() {
                transport.unsub(transport_id);
            }
        }
        debug!(sub_id = %id, name = %record.name, "Subscription stopped");

        if record.ready {
            record.ready_dep.changed();
        }
        if let Some(on_stop) = record.on_stop {
            on_stop();
        }
        true
    }

    /// Reactive readiness of a record; false once it is gone.
    pub fn is_ready(&self, id: &str) -> bool {
        let entry = self
            .records
            .borrow()
            .get(id)
            .map(|r| (r.ready_dep.clone(), r.ready));
        match entry {
            Some((dep, ready)) => {
                dep.depend();
                ready
            }
            None => false,
        }
    }

    fn local_id_for(&self, transport_id: &str) -> Option<String> {
        self.records
            .borrow()
            .iter()
            .find(|(_, r)| r.transport_id.as_deref() == Some(transport_id))
            .map(|(id, _)| id.clone())
    }

    /// Mark the records behind `subs` ready. Stale ids are ignored.
    pub fn handle_ready(&self, subs: &[String]) {
        for transport_id in subs {
            let Some(id) = self.local_id_for(transport_id) else {
                debug!(transport_id = %transport_id, "Ready for unknown subscription");
                continue;
            };
            let fired = {
                let mut records = self.records.borrow_mut();
                match records.get_mut(&id) {
                    Some(record) if !record.ready => {
                        record.ready = true;
                        Some((record.ready_dep.clone(), record.on_ready.take()))
                    }
                    _ => None,
                }
            };
            if let Some((dep, on_ready)) = fired {
                debug!(sub_id = %id, "Subscription ready");
                dep.changed();
                if let Some(on_ready) = on_ready {
                    on_ready();
                }
            }
        }
    }

    /// The server ended or refused a subscription.
    pub fn handle_nosub(&self, transport_id: &str, error: Option<RemoteError>) {
        let Some(id) = self.local_id_for(transport_id) else {
            return;
        };
        let Some(record) = self.records.borrow_mut().remove(&id) else {
            return;
        };
        match &error {
            Some(err) => warn!(sub_id = %id, name = %record.name, error = %err, "Subscription refused"),
            None => warn!(sub_id = %id, name = %record.name, "Subscription ended by server"),
        }

        if record.ready {
            record.ready_dep.changed();
        }
        match (error, record.on_error, record.on_stop) {
            (Some(err), Some(on_error), _) => on_error(err),
            (None, _, Some(on_stop)) => on_stop(),
            _ => {}
        }
    }

    /// Send every record again on a fresh connection, in creation order,
    /// unsubscribing stale transport ids first.
    pub fn restart(&self) {
        self.online.set(true);
        let Some(transport) = current_transport(&self.transport) else {
            return;
        };

        let mut order: Vec<(u64, String, Option<String>, String, Vec<Value>)> = self
            .records
            .borrow_mut()
            .iter_mut()
            .map(|(id, r)| {
                (
                    r.seq,
                    id.clone(),
                    r.transport_id.take(),
                    r.name.clone(),
                    r.params.clone(),
                )
            })
            .collect();
        order.sort_by_key(|(seq, ..)| *seq);

        for (_, id, stale, name, params) in order {
            if let Some(stale) = stale {
                transport.unsub(&stale);
            }
            let fresh = transport.sub(&name, &params);
            debug!(sub_id = %id, transport_id = %fresh, name = %name, "Resubscribed");
            if let Some(record) = self.records.borrow_mut().get_mut(&id) {
                record.transport_id = Some(fresh);
            }
        }
    }

    /// The transport dropped; new records wait for the next connect.
    pub(crate) fn mark_offline(&self) {
        self.online.set(false);
    }

    pub fn subscription_ids(&self) -> Vec<String> {
        let records = self.records.borrow();
        let mut ids: Vec<(u64, String)> = records.iter().map(|(id, r)| (r.seq, id.clone())).collect();
        ids.sort();
        ids.into_iter().map(|(_, id)| id).collect()
    }

    pub fn subscription_count(&self) -> usize {
        self.records.borrow().len()
    }

    /// The current transport-level id of a record.
    pub fn transport_id(&self, id: &str) -> Option<String> {
        self.records
            .borrow()
            .get(id)
            .and_then(|r| r.transport_id.clone())
    }
}

/// Handle returned by `subscribe`.
#[derive(Clone)]
pub struct SubscriptionHandle {
    id: String,
    manager: Weak<SubscriptionManager>,
}

impl SubscriptionHandle {
    /// Tear the subscription down immediately. Idempotent.
    pub fn stop(&self) {
        if let Some(manager) = self.manager.upgrade() {
            manager.stop(&self.id);
        }
    }

    /// Reactive: whether the initial data set has arrived.
    pub fn ready(&self) -> bool {
        self.manager
            .upgrade()
            .map(|manager| manager.is_ready(&self.id))
            .unwrap_or(false)
    }

    pub fn subscription_id(&self) -> &str {
        &self.id
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddp_protocol::{RecordingTransport, Transport};
    use serde_json::json;

    fn online_manager() -> (Rc<SubscriptionManager>, Rc<RecordingTransport>) {
        let transport = Rc::new(RecordingTransport::new());
        let slot: TransportSlot = Rc::new(RefCell::new(Some(transport.clone() as Rc<dyn Transport>)));
        let manager = Rc::new(SubscriptionManager::new(Tracker::new(), slot));
        manager.restart();
        (manager, transport)
    }

    #[test]
    fn offline_subscription_is_sent_on_restart() {
        let transport = Rc::new(RecordingTransport::new());
        let slot: TransportSlot = Rc::new(RefCell::new(Some(transport.clone() as Rc<dyn Transport>)));
        let manager = Rc::new(SubscriptionManager::new(Tracker::new(), slot));

        let handle = manager.subscribe("todos", vec![json!("mine")], SubscribeCallbacks::new());
        assert!(transport.subs().is_empty());
        assert_eq!(manager.transport_id(handle.subscription_id()), None);

        manager.restart();
        assert_eq!(transport.subs().len(), 1);
        assert!(transport.unsubs().is_empty());
        assert_eq!(
            manager.transport_id(handle.subscription_id()).as_deref(),
            Some("sub-1")
        );
    }

    #[test]
    fn ready_fires_callback_once() {
        let (manager, _) = online_manager();
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        let handle = manager.subscribe(
            "todos",
            vec![],
            SubscribeCallbacks::on_ready(move || c.set(c.get() + 1)),
        );

        manager.handle_ready(&["sub-1".to_string()]);
        manager.handle_ready(&["sub-1".to_string()]);
        assert!(handle.ready());
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn stop_is_idempotent_and_unsubscribes_once() {
        let (manager, transport) = online_manager();
        let stopped = Rc::new(Cell::new(0));
        let s = stopped.clone();
        let handle = manager.subscribe(
            "todos",
            vec![],
            SubscribeCallbacks::new().with_stop(move || s.set(s.get() + 1)),
        );

        handle.stop();
        handle.stop();
        assert_eq!(transport.unsubs(), vec!["sub-1".to_string()]);
        assert_eq!(stopped.get(), 1);
        assert!(!handle.ready());
        assert_eq!(manager.subscription_count(), 0);
    }

    #[test]
    fn nosub_with_error_reports_and_removes() {
        let (manager, _) = online_manager();
        let error = Rc::new(RefCell::new(None));
        let e = error.clone();
        manager.subscribe(
            "secret",
            vec![],
            SubscribeCallbacks::new()
                .with_error(move |err| *e.borrow_mut() = Some(err))
                .with_stop(|| panic!("stop must not run on error")),
        );

        manager.handle_nosub("sub-1", Some(RemoteError::new(403, "denied")));
        assert_eq!(error.borrow().as_ref().and_then(|e| e.code()), Some(403));
        assert_eq!(manager.subscription_count(), 0);

        manager.handle_nosub("sub-1", None);
    }
}
