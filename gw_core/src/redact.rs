//! Safe-to-expose projections of secret-bearing values.
//!
//! A reference-sourced value redacts to `env.NAME`. A literal redacts to a
//! mask: all `*` when it has 8 characters or fewer, otherwise the first and
//! last four characters around a fixed run of 24 `*`, so the masked length is
//! always 32 and says nothing about the secret's real length.

use crate::env::{ENV_PREFIX, EnvVar};
use serde_json::Value;

const SHORT_SECRET_MAX: usize = 8;
const VISIBLE_EDGE: usize = 4;
const MASKED_MIDDLE: usize = 24;
const MASK_CHAR: char = '*';

/// Length of the mask produced for secrets longer than the short threshold.
pub const LONG_MASK_LEN: usize = VISIBLE_EDGE * 2 + MASKED_MIDDLE;

/// Projection that hides secret material.
pub trait Redact {
    #[must_use]
    fn redacted(&self) -> Self;
}

/// Masks a literal secret.
#[must_use]
pub fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= SHORT_SECRET_MAX {
        return MASK_CHAR.to_string().repeat(chars.len());
    }
    let head: String = chars[..VISIBLE_EDGE].iter().collect();
    let tail: String = chars[chars.len() - VISIBLE_EDGE..].iter().collect();
    format!("{head}{}{tail}", MASK_CHAR.to_string().repeat(MASKED_MIDDLE))
}

/// Whether `value` is already in one of the redacted forms.
#[must_use]
pub fn is_redacted(value: &str) -> bool {
    if value.strip_prefix(ENV_PREFIX).is_some_and(|name| !name.is_empty()) {
        return true;
    }
    let chars: Vec<char> = value.chars().collect();
    if chars.is_empty() {
        return false;
    }
    if chars.len() <= SHORT_SECRET_MAX {
        return chars.iter().all(|c| *c == MASK_CHAR);
    }
    chars.len() == LONG_MASK_LEN
        && chars[VISIBLE_EDGE..VISIBLE_EDGE + MASKED_MIDDLE]
            .iter()
            .all(|c| *c == MASK_CHAR)
}

impl Redact for EnvVar {
    fn redacted(&self) -> Self {
        match self {
            Self::FromEnv { name, .. } => Self::from_env(name.clone()),
            Self::Literal(value) if is_redacted(value) => Self::Literal(value.clone()),
            Self::Literal(value) => Self::Literal(mask_secret(value))
        }
    }
}

impl<T: Redact> Redact for Option<T> {
    fn redacted(&self) -> Self {
        self.as_ref().map(Redact::redacted)
    }
}

/// Masks string values under credential-looking keys in a free-form JSON
/// document (plugin configs, team profiles).
#[must_use]
pub fn redact_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let redacted = match v {
                        Value::String(s) if utils::is_sensitive_field_name(k) => {
                            Value::String(EnvVar::parse(s).redacted().reference())
                        }
                        other => redact_json(other)
                    };
                    (k.clone(), redacted)
                })
                .collect()
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_json).collect()),
        other => other.clone()
    }
}
