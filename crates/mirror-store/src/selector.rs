use crate::{document_id, Document};
use serde_json::Value;
use std::cmp::Ordering;

/// Which documents a query selects.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Selector {
    /// Every document.
    #[default]
    All,
    /// The document with this `_id`.
    Id(String),
    /// Documents whose fields equal every given value. Keys may be dotted
    /// paths into nested objects (`"profile.name"`).
    Fields(Document),
}

impl Selector {
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Selector::All => true,
            Selector::Id(id) => document_id(doc) == Some(id.as_str()),
            Selector::Fields(fields) => fields
                .iter()
                .all(|(path, expected)| lookup(doc, path) == Some(expected)),
        }
    }
}

impl From<&str> for Selector {
    fn from(id: &str) -> Self {
        Selector::Id(id.to_string())
    }
}

impl From<String> for Selector {
    fn from(id: String) -> Self {
        Selector::Id(id)
    }
}

impl From<Document> for Selector {
    fn from(fields: Document) -> Self {
        Selector::Fields(fields)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Sort, skip and limit applied after matching.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Vec<(String, SortOrder)>,
    pub skip: usize,
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn is_empty(&self) -> bool {
        self.sort.is_empty() && self.skip == 0 && self.limit.is_none()
    }

    pub fn sort_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort.push((field.into(), order));
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub(crate) fn apply(&self, mut docs: Vec<Document>) -> Vec<Document> {
        if !self.sort.is_empty() {
            docs.sort_by(|a, b| {
                self.sort
                    .iter()
                    .map(|(field, order)| {
                        let ordering = compare_values(lookup(a, field), lookup(b, field));
                        match order {
                            SortOrder::Ascending => ordering,
                            SortOrder::Descending => ordering.reverse(),
                        }
                    })
                    .find(|ordering| *ordering != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
        }

        let docs = docs.into_iter().skip(self.skip);
        match self.limit {
            Some(limit) => docs.take(limit).collect(),
            None => docs.collect(),
        }
    }
}

fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Missing < null < booleans < numbers < strings < arrays < objects.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None => 0,
            Some(Value::Null) => 1,
            Some(Value::Bool(_)) => 2,
            Some(Value::Number(_)) => 3,
            Some(Value::String(_)) => 4,
            Some(Value::Array(_)) => 5,
            Some(Value::Object(_)) => 6,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn field_selector_uses_dotted_paths() {
        let d = doc(json!({"_id": "a", "profile": {"name": "ada"}, "age": 36}));

        let by_name = Selector::Fields(doc(json!({"profile.name": "ada"})));
        let by_both = Selector::Fields(doc(json!({"profile.name": "ada", "age": 37})));

        assert!(by_name.matches(&d));
        assert!(!by_both.matches(&d));
        assert!(Selector::from("a").matches(&d));
        assert!(Selector::All.matches(&d));
    }

    #[test]
    fn sort_skip_limit() {
        let docs = vec![
            doc(json!({"_id": "a", "n": 3})),
            doc(json!({"_id": "b", "n": 1})),
            doc(json!({"_id": "c"})),
            doc(json!({"_id": "d", "n": 2})),
        ];

        let options = FindOptions::default()
            .sort_by("n", SortOrder::Descending)
            .skip(1)
            .limit(2);
        let ids: Vec<String> = options
            .apply(docs)
            .iter()
            .map(|d| document_id(d).unwrap().to_string())
            .collect();

        assert_eq!(ids, vec!["d", "b"]);
    }

    #[test]
    fn missing_fields_sort_first_ascending() {
        let docs = vec![doc(json!({"_id": "x", "n": "s"})), doc(json!({"_id": "y"}))];
        let sorted = FindOptions::default()
            .sort_by("n", SortOrder::Ascending)
            .apply(docs);
        assert_eq!(document_id(&sorted[0]), Some("y"));
    }
}
