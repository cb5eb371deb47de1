use crate::{document_id, Document, FindOptions, Selector, StoreError, StoreResult, ID_FIELD};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A document was inserted or had fields set.
    Upserted,
    /// Fields were removed from a document.
    FieldsCleared,
    /// A document was deleted.
    Removed,
}

/// Announcement of one store mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    pub collection: String,
    pub id: String,
    pub kind: ChangeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObserverId(u64);

type Observer = Rc<dyn Fn(&ChangeRecord)>;
type Collections = BTreeMap<String, BTreeMap<String, Document>>;

/// In-memory document store with change notification.
///
/// Observers are invoked after the mutation is fully applied and with no
/// internal borrow held, so they may read from (or write to) the store.
#[derive(Default)]
pub struct MirrorStore {
    collections: RefCell<Collections>,
    observers: RefCell<Vec<(ObserverId, Observer)>>,
    next_observer: Cell<u64>,
}

impl MirrorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_collection(&self, collection: &str) -> bool {
        self.collections.borrow().contains_key(collection)
    }

    /// Create `collection` if it does not exist yet.
    pub fn ensure_collection(&self, collection: &str) {
        self.collections
            .borrow_mut()
            .entry(collection.to_string())
            .or_default();
    }

    pub fn collection_names(&self) -> Vec<String> {
        self.collections.borrow().keys().cloned().collect()
    }

    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .borrow()
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    pub fn get(&self, collection: &str, id: &str) -> Option<Document> {
        self.collections
            .borrow()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    pub fn contains(&self, collection: &str, id: &str) -> bool {
        self.collections
            .borrow()
            .get(collection)
            .is_some_and(|docs| docs.contains_key(id))
    }

    /// Matching documents, ordered by `_id` unless `options` sorts them.
    pub fn find(&self, collection: &str, selector: &Selector, options: &FindOptions) -> Vec<Document> {
        let matched: Vec<Document> = {
            let collections = self.collections.borrow();
            let Some(docs) = collections.get(collection) else {
                return Vec::new();
            };
            match selector {
                Selector::Id(id) => docs.get(id).cloned().into_iter().collect(),
                _ => docs
                    .values()
                    .filter(|doc| selector.matches(doc))
                    .cloned()
                    .collect(),
            }
        };
        options.apply(matched)
    }

    pub fn find_one(&self, collection: &str, selector: &Selector, options: &FindOptions) -> Option<Document> {
        let options = FindOptions {
            limit: Some(1),
            ..options.clone()
        };
        self.find(collection, selector, &options).into_iter().next()
    }

    /// Insert `doc`, or merge its top-level fields into the existing document
    /// with the same `_id`. Creates the collection on demand.
    pub fn upsert(&self, collection: &str, doc: Document) -> StoreResult<()> {
        let id = document_id(&doc)
            .ok_or_else(|| StoreError::MissingId {
                collection: collection.to_string(),
            })?
            .to_string();

        {
            let mut collections = self.collections.borrow_mut();
            let docs = collections.entry(collection.to_string()).or_default();
            match docs.get_mut(&id) {
                Some(existing) => existing.extend(doc),
                None => {
                    docs.insert(id.clone(), doc);
                }
            }
        }

        trace!(collection, id = %id, "document upserted");
        self.notify(collection, id, ChangeKind::Upserted);
        Ok(())
    }

    /// Delete a document, returning it. Missing documents are not an error
    /// and produce no notification.
    pub fn remove(&self, collection: &str, id: &str) -> Option<Document> {
        let removed = self
            .collections
            .borrow_mut()
            .get_mut(collection)
            .and_then(|docs| docs.remove(id));

        if removed.is_some() {
            trace!(collection, id, "document removed");
            self.notify(collection, id.to_string(), ChangeKind::Removed);
        }
        removed
    }

    /// Remove the named fields from a document. `_id` is never removed.
    /// Returns whether the document exists.
    pub fn unset_fields(&self, collection: &str, id: &str, fields: &[String]) -> bool {
        let cleared = {
            let mut collections = self.collections.borrow_mut();
            let Some(doc) = collections.get_mut(collection).and_then(|docs| docs.get_mut(id)) else {
                return false;
            };
            fields
                .iter()
                .filter(|field| field.as_str() != ID_FIELD)
                .filter_map(|field| doc.remove(field))
                .count()
        };

        if cleared > 0 {
            self.notify(collection, id.to_string(), ChangeKind::FieldsCleared);
        }
        true
    }

    /// Replace a document wholesale, dropping fields absent from `doc`.
    pub fn replace(&self, collection: &str, doc: Document) -> StoreResult<()> {
        let id = document_id(&doc)
            .ok_or_else(|| StoreError::MissingId {
                collection: collection.to_string(),
            })?
            .to_string();

        self.collections
            .borrow_mut()
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), doc);

        self.notify(collection, id, ChangeKind::Upserted);
        Ok(())
    }

    /// Register a change observer.
    pub fn observe<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&ChangeRecord) + 'static,
    {
        let id = ObserverId(self.next_observer.get());
        self.next_observer.set(id.0 + 1);
        self.observers.borrow_mut().push((id, Rc::new(observer)));
        id
    }

    pub fn unobserve(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.borrow_mut();
        let before = observers.len();
        observers.retain(|(observer_id, _)| *observer_id != id);
        observers.len() != before
    }

    fn notify(&self, collection: &str, id: String, kind: ChangeKind) {
        let observers: Vec<Observer> = self
            .observers
            .borrow()
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();
        if observers.is_empty() {
            return;
        }

        let record = ChangeRecord {
            collection: collection.to_string(),
            id,
            kind,
        };
        for observer in observers {
            observer(&record);
        }
    }
}

impl std::fmt::Debug for MirrorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sizes: BTreeMap<String, usize> = self
            .collections
            .borrow()
            .iter()
            .map(|(name, docs)| (name.clone(), docs.len()))
            .collect();
        f.debug_struct("MirrorStore")
            .field("collections", &sizes)
            .field("observers", &self.observers.borrow().len())
            .finish()
    }
}

/// Build a document from a JSON object value. Non-objects yield `None`.
pub fn document_from_value(value: Value) -> Option<Document> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}
