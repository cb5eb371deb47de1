use crate::accounts::Accounts;
use crate::collection::{Collection, CollectionOptions};
use crate::connection::{ConnectionManager, Continuation, StatusInfo};
use crate::correlator::Correlator;
use crate::password::UserSelector;
use crate::session::{LoginResult, SessionManager};
use crate::subscriptions::{SubscribeCallbacks, SubscriptionHandle, SubscriptionManager};
use crate::{ClientResult, TransportSlot};
use client_storage::SecureStorage;
use ddp_config_and_utils::Config;
use ddp_protocol::{RemoteError, Transport, TransportEvent};
use mirror_store::{Document, MirrorStore, ID_FIELD};
use reactive_tracker::Tracker;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// Name of the collection holding user documents.
pub const USERS_COLLECTION: &str = "users";

struct ClientInner {
    config: Config,
    tracker: Tracker,
    store: Rc<MirrorStore>,
    transport: TransportSlot,
    correlator: Rc<Correlator>,
    subscriptions: Rc<SubscriptionManager>,
    connection: Rc<ConnectionManager>,
    session: Rc<SessionManager>,
    collections: RefCell<HashMap<String, Collection>>,
}

/// The sync client: owns the reactive tracker, the mirror store and every
/// component, and consumes transport events one at a time.
///
/// Not `Send`; drive it from a single thread (a `LocalSet` under tokio).
#[derive(Clone)]
pub struct DdpClient {
    inner: Rc<ClientInner>,
}

impl DdpClient {
    pub fn new(config: Config, storage: Arc<dyn SecureStorage>) -> Self {
        let tracker = Tracker::new();
        let store = Rc::new(MirrorStore::new());
        let transport: TransportSlot = Rc::new(RefCell::new(None));

        let correlator = Rc::new(Correlator::new(transport.clone()));
        let subscriptions = Rc::new(SubscriptionManager::new(tracker.clone(), transport.clone()));
        let connection = Rc::new(ConnectionManager::new(
            &tracker,
            transport.clone(),
            config.auto_reconnect,
            Duration::from_millis(config.reconnect_debounce_ms),
        ));
        let session = Rc::new(SessionManager::new(
            &tracker,
            correlator.clone(),
            connection.clone(),
            store.clone(),
            storage,
            &config.connection_id,
        ));

        debug!(connection_id = %config.connection_id, "Client created");
        Self {
            inner: Rc::new(ClientInner {
                config,
                tracker,
                store,
                transport,
                correlator,
                subscriptions,
                connection,
                session,
                collections: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// Attach `transport` and ask it to connect.
    pub fn connect(&self, transport: Rc<dyn Transport>) {
        *self.inner.transport.borrow_mut() = Some(transport);
        info!(endpoint = %self.inner.config.endpoint, "Transport attached");
        self.inner.connection.request_connect();
        self.inner.connection.poll_deferred();
    }

    /// Apply one inbound event, then flush the tracker.
    pub fn handle_event(&self, event: TransportEvent) {
        trace!(kind = event.kind(), "Transport event");
        let inner = &self.inner;
        match event {
            TransportEvent::Connected => {
                inner.connection.handle_connected();
                inner.session.load_initial_user();
                inner.subscriptions.restart();
                inner.connection.run_waiters();
            }
            TransportEvent::Disconnected => {
                inner.subscriptions.mark_offline();
                inner.connection.handle_disconnected();
            }
            TransportEvent::Added {
                collection,
                id,
                fields,
            } => self.apply_fields(&collection, id, fields),
            TransportEvent::Changed {
                collection,
                id,
                fields,
                cleared,
            } => {
                if !inner.store.has_collection(&collection) {
                    debug!(collection = %collection, id = %id, "Change for unknown collection");
                } else {
                    if !fields.is_empty() {
                        self.apply_fields(&collection, id.clone(), fields);
                    }
                    if !cleared.is_empty() {
                        inner.store.unset_fields(&collection, &id, &cleared);
                    }
                }
            }
            TransportEvent::Removed { collection, id } => {
                if inner.store.has_collection(&collection) {
                    inner.store.remove(&collection, &id);
                } else {
                    debug!(collection = %collection, id = %id, "Remove for unknown collection");
                }
            }
            TransportEvent::Ready { subs } => inner.subscriptions.handle_ready(&subs),
            TransportEvent::NoSub { id, error } => inner.subscriptions.handle_nosub(&id, error),
            TransportEvent::Result { id, outcome } => {
                inner.correlator.handle_result(&id, outcome);
            }
        }
        inner.tracker.flush();
    }

    fn apply_fields(&self, collection: &str, id: String, fields: Document) {
        let mut doc = fields;
        doc.insert(ID_FIELD.to_string(), Value::String(id));
        if let Err(e) = self.inner.store.upsert(collection, doc) {
            warn!(collection = %collection, error = %e, "Dropped inbound document");
        }
    }

    /// Re-run invalidated computations and after-flush work.
    pub fn flush(&self) {
        self.inner.tracker.flush();
    }

    /// Timer work: deferred continuations and debounced reconnects.
    pub fn tick(&self) {
        self.inner.connection.poll_deferred();
        self.inner.connection.poll_reconnect();
        self.inner.tracker.flush();
    }

    /// Consume `events` until the channel closes, ticking on the configured
    /// poll interval.
    pub async fn run(&self, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
        let period = Duration::from_millis(self.inner.config.deferred_poll_interval_ms.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        info!("Transport event stream closed");
                        break;
                    }
                },
                _ = ticker.tick() => self.tick(),
            }
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn tracker(&self) -> &Tracker {
        &self.inner.tracker
    }

    pub fn store(&self) -> &MirrorStore {
        &self.inner.store
    }

    pub fn correlator(&self) -> &Correlator {
        &self.inner.correlator
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.inner.subscriptions
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.inner.connection
    }

    /// Call a server method.
    pub fn call<F>(&self, name: &str, params: Vec<Value>, callback: F) -> ClientResult<String>
    where
        F: FnOnce(Result<Value, RemoteError>) + 'static,
    {
        self.inner.correlator.invoke(name, params, callback)
    }

    pub fn call_async(
        &self,
        name: &str,
        params: Vec<Value>,
    ) -> impl Future<Output = ClientResult<Value>> + 'static {
        self.inner.correlator.invoke_async(name, params)
    }

    pub fn subscribe(
        &self,
        name: &str,
        params: Vec<Value>,
        callbacks: SubscribeCallbacks,
    ) -> SubscriptionHandle {
        self.inner.subscriptions.subscribe(name, params, callbacks)
    }

    /// The shared collection called `name`.
    pub fn collection(&self, name: &str) -> Collection {
        self.collection_with_options(name, CollectionOptions::default())
    }

    /// Like [`collection`](Self::collection); `options` only apply when
    /// this call creates it.
    pub fn collection_with_options(&self, name: &str, options: CollectionOptions) -> Collection {
        if let Some(existing) = self.inner.collections.borrow().get(name) {
            return existing.clone();
        }
        let collection = Collection::new(
            name,
            options,
            self.inner.store.clone(),
            self.inner.tracker.clone(),
            self.inner.correlator.clone(),
            self.inner.connection.clone(),
        );
        self.inner
            .collections
            .borrow_mut()
            .insert(name.to_string(), collection.clone());
        collection
    }

    pub fn users(&self) -> Collection {
        self.collection(USERS_COLLECTION)
    }

    /// Run `continuation` once the connection is up.
    pub fn when_connected(&self, continuation: impl FnOnce() + 'static) {
        self.inner.connection.when_connected(Box::new(continuation) as Continuation);
    }

    /// Reactive connection status.
    pub fn status(&self) -> StatusInfo {
        self.inner.connection.status()
    }

    pub fn reconnect(&self) {
        self.inner.connection.reconnect();
    }

    pub fn disconnect(&self) {
        self.inner.connection.disconnect();
    }

    pub fn network_changed(&self, online: bool) {
        self.inner.connection.network_changed(online);
    }

    pub fn accounts(&self) -> Accounts {
        Accounts::new(self.inner.session.clone(), self.inner.correlator.clone())
    }

    pub fn session(&self) -> &Rc<SessionManager> {
        &self.inner.session
    }

    pub fn login_with_password(
        &self,
        selector: impl Into<UserSelector>,
        password: &str,
        group: Option<&str>,
        callback: impl FnOnce(ClientResult<LoginResult>) + 'static,
    ) {
        self.inner
            .session
            .login_with_password(selector, password, group, callback);
    }

    pub fn login(&self, credentials: Value, callback: impl FnOnce(ClientResult<LoginResult>) + 'static) {
        self.inner.session.login(credentials, callback);
    }

    pub fn logout(&self, callback: impl FnOnce(ClientResult<()>) + 'static) {
        self.inner.session.logout(callback);
    }

    pub fn logout_other_clients(&self, callback: impl FnOnce(ClientResult<()>) + 'static) {
        self.inner.session.logout_other_clients(callback);
    }

    /// Reactive.
    pub fn user_id(&self) -> Option<String> {
        self.inner.session.user_id()
    }

    /// Reactive.
    pub fn user(&self) -> Option<Document> {
        self.inner.session.user()
    }

    /// Reactive.
    pub fn logging_in(&self) -> bool {
        self.inner.session.logging_in()
    }

    pub fn auth_token(&self) -> Option<String> {
        self.inner.session.auth_token()
    }
}
