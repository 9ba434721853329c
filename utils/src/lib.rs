//! # Gateway Utilities
//!
//! Canonical content hashing, identifier generation and small string
//! heuristics shared by the control-plane crates.
//!
//! # Hashing
//!
//! [`ContentHasher`] feeds named, length-prefixed fields into SHA-256 so that
//! two values only collide when every field matches. Callers decide which
//! fields are semantically significant; the hasher only guarantees that the
//! same sequence of calls produces the same digest in every process.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HashError {
    #[error("field {field} is not a finite number")]
    NonFinite { field: String },

    #[error("field {field} could not be serialized: {reason}")]
    Serialization { field: String, reason: String }
}

const TAG_STR: u8 = 1;
const TAG_NONE: u8 = 2;
const TAG_BOOL: u8 = 3;
const TAG_INT: u8 = 4;
const TAG_FLOAT: u8 = 5;
const TAG_LIST: u8 = 6;
const TAG_MAP: u8 = 7;
const TAG_JSON: u8 = 8;

/// Incremental, field-stable SHA-256 builder.
///
/// ```
/// use utils::ContentHasher;
///
/// let mut a = ContentHasher::new("key");
/// a.str("name", "primary").set("models", &["b".to_string(), "a".to_string()]);
///
/// let mut b = ContentHasher::new("key");
/// b.str("name", "primary").set("models", &["a".to_string(), "b".to_string()]);
///
/// assert_eq!(a.finish(), b.finish());
/// ```
pub struct ContentHasher {
    hasher: Sha256
}

impl ContentHasher {
    /// Starts a digest for one entity kind. The kind is mixed in so that two
    /// different entity types with coincidentally equal fields never collide.
    #[must_use]
    pub fn new(kind: &str) -> Self {
        let mut hasher = Self {
            hasher: Sha256::new()
        };
        hasher.token(kind.as_bytes());
        hasher
    }

    fn token(&mut self, bytes: &[u8]) {
        self.hasher.update((bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
    }

    fn field(&mut self, name: &str, tag: u8) {
        self.token(name.as_bytes());
        self.hasher.update([tag]);
    }

    pub fn str(&mut self, name: &str, value: &str) -> &mut Self {
        self.field(name, TAG_STR);
        self.token(value.as_bytes());
        self
    }

    pub fn opt_str(&mut self, name: &str, value: Option<&str>) -> &mut Self {
        match value {
            Some(v) => self.str(name, v),
            None => {
                self.field(name, TAG_NONE);
                self
            }
        }
    }

    pub fn bool(&mut self, name: &str, value: bool) -> &mut Self {
        self.field(name, TAG_BOOL);
        self.hasher.update([u8::from(value)]);
        self
    }

    pub fn int(&mut self, name: &str, value: i64) -> &mut Self {
        self.field(name, TAG_INT);
        self.hasher.update(value.to_le_bytes());
        self
    }

    pub fn opt_int(&mut self, name: &str, value: Option<i64>) -> &mut Self {
        match value {
            Some(v) => self.int(name, v),
            None => {
                self.field(name, TAG_NONE);
                self
            }
        }
    }

    /// Hashes a float. NaN and infinities have no canonical form and are
    /// rejected.
    pub fn float(&mut self, name: &str, value: f64) -> Result<&mut Self, HashError> {
        if !value.is_finite() {
            return Err(HashError::NonFinite {
                field: name.to_string()
            });
        }
        // -0.0 and 0.0 compare equal and must hash equal
        let normalized = if value == 0.0 { 0.0_f64 } else { value };
        self.field(name, TAG_FLOAT);
        self.hasher.update(normalized.to_bits().to_le_bytes());
        Ok(self)
    }

    pub fn opt_float(&mut self, name: &str, value: Option<f64>) -> Result<&mut Self, HashError> {
        match value {
            Some(v) => self.float(name, v),
            None => {
                self.field(name, TAG_NONE);
                Ok(self)
            }
        }
    }

    /// Hashes a list whose order carries no meaning.
    pub fn set(&mut self, name: &str, values: &[String]) -> &mut Self {
        let mut sorted: Vec<&str> = values.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        self.list(name, &sorted)
    }

    /// Hashes a list whose order is significant (fallback chains, targets).
    pub fn list(&mut self, name: &str, values: &[&str]) -> &mut Self {
        self.field(name, TAG_LIST);
        self.hasher.update((values.len() as u64).to_le_bytes());
        for value in values {
            self.token(value.as_bytes());
        }
        self
    }

    pub fn map(&mut self, name: &str, values: &BTreeMap<String, String>) -> &mut Self {
        self.field(name, TAG_MAP);
        self.hasher.update((values.len() as u64).to_le_bytes());
        for (k, v) in values {
            self.token(k.as_bytes());
            self.token(v.as_bytes());
        }
        self
    }

    /// Hashes any serializable value through its JSON form with object keys
    /// sorted recursively.
    pub fn json<T: Serialize + ?Sized>(&mut self, name: &str, value: &T) -> Result<&mut Self, HashError> {
        let value = serde_json::to_value(value).map_err(|e| HashError::Serialization {
            field: name.to_string(),
            reason: e.to_string()
        })?;
        self.field(name, TAG_JSON);
        let mut canonical = String::new();
        write_canonical_json(&value, &mut canonical);
        self.token(canonical.as_bytes());
        Ok(self)
    }

    /// Mixes in a digest computed by another hasher (nested entities).
    pub fn digest(&mut self, name: &str, digest: &str) -> &mut Self {
        self.str(name, digest)
    }

    #[must_use]
    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

fn write_canonical_json(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical_json(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical_json(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string())
    }
}

/// Compute SHA-256 hash of content string
///
/// # Examples
///
/// ```
/// use utils::compute_content_hash;
///
/// let hash = compute_content_hash("hello world");
/// assert_eq!(hash.len(), 64);
/// ```
#[must_use]
pub fn compute_content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate UUID v4 string
#[must_use]
pub fn generate_uuid() -> String {
    Uuid::new_v4().to_string()
}

/// Whether a free-form config field name probably holds a credential.
#[must_use]
pub fn is_sensitive_field_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    ["key", "secret", "token", "password", "credential", "auth"]
        .iter()
        .any(|needle| lower.contains(needle))
}
