use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

/// Digest sent in place of a plain-text password:
/// `{digest: hex(sha256(password)), algorithm: "sha-256"}`.
pub fn hash_password(password: &str) -> Value {
    let digest = hex::encode(Sha256::digest(password.as_bytes()));
    json!({ "digest": digest, "algorithm": "sha-256" })
}

/// Identifies the account for a password login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserSelector {
    Username(String),
    Email(String),
    Id(String),
}

impl UserSelector {
    pub fn to_value(&self) -> Value {
        let (key, value) = match self {
            UserSelector::Username(v) => ("username", v),
            UserSelector::Email(v) => ("email", v),
            UserSelector::Id(v) => ("id", v),
        };
        let mut map = Map::new();
        map.insert(key.to_string(), Value::String(value.clone()));
        Value::Object(map)
    }
}

/// Strings containing `@` are emails, anything else a username.
impl From<&str> for UserSelector {
    fn from(s: &str) -> Self {
        if s.contains('@') {
            UserSelector::Email(s.to_string())
        } else {
            UserSelector::Username(s.to_string())
        }
    }
}

impl From<String> for UserSelector {
    fn from(s: String) -> Self {
        UserSelector::from(s.as_str())
    }
}
