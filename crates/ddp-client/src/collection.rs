//! Client-side collections: reactive reads over the mirror store plus
//! optimistic writes that are confirmed (or rolled back) by the server.

use crate::connection::ConnectionManager;
use crate::{CollectionError, CollectionResult, Correlator};
use ddp_config_and_utils::random;
use ddp_protocol::RemoteError;
use mirror_store::{document_id, Document, FindOptions, MirrorStore, Selector, ID_FIELD};
use reactive_tracker::{Dependency, Tracker};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, error};

/// Per-collection document transform applied to every read.
pub type Transform = Rc<dyn Fn(Document) -> Value>;

#[derive(Clone, Default)]
pub struct CollectionOptions {
    pub transform: Option<Transform>,
}

impl CollectionOptions {
    pub fn with_transform(f: impl Fn(Document) -> Value + 'static) -> Self {
        Self {
            transform: Some(Rc::new(f)),
        }
    }
}

struct CollectionInner {
    name: String,
    store: Rc<MirrorStore>,
    tracker: Tracker,
    dep: Dependency,
    correlator: Rc<Correlator>,
    connection: Rc<ConnectionManager>,
    transform: Option<Transform>,
}

/// Shared handle to one named collection.
#[derive(Clone)]
pub struct Collection {
    inner: Rc<CollectionInner>,
}

impl Collection {
    pub(crate) fn new(
        name: &str,
        options: CollectionOptions,
        store: Rc<MirrorStore>,
        tracker: Tracker,
        correlator: Rc<Correlator>,
        connection: Rc<ConnectionManager>,
    ) -> Self {
        store.ensure_collection(name);
        let dep = tracker.dependency();

        let watched = name.to_string();
        let signal = dep.clone();
        store.observe(move |record| {
            if record.collection == watched {
                signal.changed();
            }
        });

        Self {
            inner: Rc::new(CollectionInner {
                name: name.to_string(),
                store,
                tracker,
                dep,
                correlator,
                connection,
                transform: options.transform,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Reactive query.
    pub fn find(&self, selector: impl Into<Selector>, options: FindOptions) -> Cursor {
        self.inner.dep.depend();
        let inner = &self.inner;
        let docs = match selector.into() {
            Selector::Id(id) if options.is_empty() => inner.store.get(&inner.name, &id).into_iter().collect(),
            selector => inner.store.find(&inner.name, &selector, &options),
        };
        Cursor {
            docs,
            transform: inner.transform.clone(),
            tracker: inner.tracker.clone(),
        }
    }

    /// Reactive single-document query.
    pub fn find_one(&self, selector: impl Into<Selector>, options: FindOptions) -> Option<Document> {
        self.find(selector, options).fetch().into_iter().next()
    }

    /// Insert `doc` locally now and on the server once connected. A missing
    /// `_id` is generated. The local copy is removed if the server rejects
    /// the insert.
    pub fn insert(
        &self,
        mut doc: Document,
        callback: impl FnOnce(CollectionResult<String>) + 'static,
    ) -> CollectionResult<String> {
        let inner = &self.inner;
        let id = match doc.get(ID_FIELD) {
            None => {
                let id = random::id();
                doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));
                id
            }
            Some(_) => match document_id(&doc) {
                Some(id) => id.to_string(),
                None => return fail(callback, CollectionError::InvalidId),
            },
        };

        if inner.store.contains(&inner.name, &id) {
            return fail(callback, CollectionError::Duplicate(id));
        }
        if inner.store.upsert(&inner.name, doc.clone()).is_err() {
            return fail(callback, CollectionError::InvalidId);
        }
        debug!(collection = %inner.name, id = %id, "Optimistic insert");

        let method = format!("/{}/insert", inner.name);
        let store = inner.store.clone();
        let name = inner.name.clone();
        let doc_id = id.clone();
        self.send_when_connected(method, vec![Value::Object(doc)], move |outcome| match outcome {
            Ok(_) => callback(Ok(doc_id)),
            Err(err) => {
                store.remove(&name, &doc_id);
                debug!(collection = %name, id = %doc_id, error = %err, "Rolled back insert");
                callback(Err(err));
            }
        });
        Ok(id)
    }

    /// Apply `modifier` on the server once connected. Only its `$set`
    /// fields are applied locally, and they are kept even if the server
    /// rejects the update.
    pub fn update(
        &self,
        id: &str,
        modifier: Value,
        callback: impl FnOnce(CollectionResult<String>) + 'static,
    ) -> CollectionResult<()> {
        let inner = &self.inner;
        if !inner.store.contains(&inner.name, id) {
            let err = CollectionError::NotFound {
                collection: inner.name.clone(),
                id: id.to_string(),
            };
            return fail(callback, err).map(|_| ());
        }

        let mut patch = modifier
            .get("$set")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        patch.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
        if inner.store.upsert(&inner.name, patch).is_err() {
            return fail(callback, CollectionError::InvalidId).map(|_| ());
        }
        debug!(collection = %inner.name, id = %id, "Optimistic update");

        let method = format!("/{}/update", inner.name);
        let doc_id = id.to_string();
        self.send_when_connected(method, vec![json!({ "_id": id }), modifier], move |outcome| {
            callback(outcome.map(|_| doc_id))
        });
        Ok(())
    }

    /// Remove locally now and on the server once connected. The removed
    /// document is restored if the server rejects the remove.
    pub fn remove(
        &self,
        id: &str,
        callback: impl FnOnce(CollectionResult<Value>) + 'static,
    ) -> CollectionResult<()> {
        let inner = &self.inner;
        let Some(previous) = inner.store.remove(&inner.name, id) else {
            let err = CollectionError::NotFound {
                collection: inner.name.clone(),
                id: id.to_string(),
            };
            return fail(callback, err).map(|_| ());
        };
        debug!(collection = %inner.name, id = %id, "Optimistic remove");

        let method = format!("/{}/remove", inner.name);
        let store = inner.store.clone();
        let name = inner.name.clone();
        self.send_when_connected(method, vec![json!({ "_id": id })], move |outcome| match outcome {
            Ok(result) => callback(Ok(result)),
            Err(err) => {
                let restored_id = document_id(&previous).map(str::to_string).unwrap_or_default();
                if let Err(e) = store.upsert(&name, previous) {
                    error!(collection = %name, error = %e, "Failed to restore removed document");
                }
                debug!(collection = %name, id = %restored_id, error = %err, "Rolled back remove");
                callback(Err(err));
            }
        });
        Ok(())
    }

    fn send_when_connected<F>(&self, method: String, params: Vec<Value>, on_result: F)
    where
        F: FnOnce(CollectionResult<Value>) + 'static,
    {
        let correlator = self.inner.correlator.clone();
        self.inner.connection.when_connected(Box::new(move || {
            // Taken by the reply or by the send failure, never both.
            let pending = Rc::new(RefCell::new(Some(on_result)));
            let on_reply = pending.clone();
            let sent = correlator.invoke(&method, params, move |outcome: Result<Value, RemoteError>| {
                let on_result = on_reply.borrow_mut().take();
                if let Some(on_result) = on_result {
                    on_result(outcome.map_err(CollectionError::Remote));
                }
            });
            if let Err(e) = sent {
                error!(method = %method, error = %e, "Write could not be sent");
                let on_result = pending.borrow_mut().take();
                if let Some(on_result) = on_result {
                    on_result(Err(CollectionError::Client(e)));
                }
            }
        }));
    }
}

fn fail<T>(callback: impl FnOnce(CollectionResult<T>), err: CollectionError) -> CollectionResult<T> {
    callback(Err(err.clone()));
    Err(err)
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.inner.name)
            .field("transform", &self.inner.transform.is_some())
            .finish()
    }
}

/// Snapshot of a query result.
pub struct Cursor {
    docs: Vec<Document>,
    transform: Option<Transform>,
    tracker: Tracker,
}

impl Cursor {
    pub fn count(&self) -> usize {
        self.docs.len()
    }

    pub fn fetch(self) -> Vec<Document> {
        self.iter().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = Document> + '_ {
        self.docs.iter().cloned().map(|doc| self.apply_transform(doc))
    }

    pub fn map<T>(&self, f: impl FnMut(Document) -> T) -> Vec<T> {
        self.iter().map(f).collect()
    }

    /// Panics when the transform returns a non-object or changes `_id`.
    fn apply_transform(&self, doc: Document) -> Document {
        let Some(transform) = &self.transform else {
            return doc;
        };
        let id = doc.get(ID_FIELD).cloned();
        let transformed = self.tracker.nonreactive(|| transform(doc));

        let Value::Object(mut transformed) = transformed else {
            panic!("transform must return an object");
        };
        match (transformed.get(ID_FIELD), id) {
            (Some(new_id), Some(id)) if *new_id != id => {
                panic!("transformed document can't have a different _id");
            }
            (None, Some(id)) => {
                transformed.insert(ID_FIELD.to_string(), id);
            }
            _ => {}
        }
        transformed
    }
}
