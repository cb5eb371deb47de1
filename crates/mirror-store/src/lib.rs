//! Local mirror of server-published documents.
//!
//! Documents are JSON objects grouped into named collections and keyed by
//! their string `_id`. Writes go through [`MirrorStore::upsert`],
//! [`MirrorStore::remove`] and [`MirrorStore::unset_fields`]; every write
//! that changes something is announced to the observers registered with
//! [`MirrorStore::observe`] as a [`ChangeRecord`].
//!
//! Queries are deliberately simple: top-level field equality plus sort,
//! skip and limit.

mod selector;
mod store;

pub use selector::{FindOptions, Selector, SortOrder};
pub use store::{document_from_value, ChangeKind, ChangeRecord, MirrorStore, ObserverId};

use serde_json::{Map, Value};
use thiserror::Error;

/// A mirrored document. Always carries a string `_id`.
pub type Document = Map<String, Value>;

/// Field holding a document's identifier.
pub const ID_FIELD: &str = "_id";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The document has no `_id`, or it is not a non-empty string.
    #[error("document in {collection} has no usable _id")]
    MissingId { collection: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// The `_id` of `doc`, if it is a non-empty string.
pub fn document_id(doc: &Document) -> Option<&str> {
    doc.get(ID_FIELD)
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
}
