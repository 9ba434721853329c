//! Encryption key resolution.
//!
//! Precedence: a literal key in the config file, then an `env.NAME`
//! reference in the config file, then [`ENCRYPTION_KEY_ENV`]. An unresolvable
//! reference falls through to the fallback variable with a warning. No key at
//! all means the store runs unencrypted.

use gw_core::{EnvLookup, EnvVar};
use std::fmt;
use zeroize::Zeroizing;

pub const ENCRYPTION_KEY_ENV: &str = "GATEWAY_ENCRYPTION_KEY";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    ConfigLiteral,
    ConfigEnvReference,
    FallbackEnv
}

/// A resolved passphrase. Wiped from memory on drop.
#[derive(Clone)]
pub struct ResolvedKey {
    passphrase: Zeroizing<String>,
    pub source: KeySource
}

impl ResolvedKey {
    #[must_use]
    pub fn passphrase(&self) -> &str {
        &self.passphrase
    }
}

impl fmt::Debug for ResolvedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedKey")
            .field("passphrase", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

#[must_use]
pub fn resolve_encryption_key(
    declared: Option<&EnvVar>,
    env: &dyn EnvLookup
) -> Option<ResolvedKey> {
    let found = |passphrase: String, source| ResolvedKey {
        passphrase: Zeroizing::new(passphrase),
        source
    };

    match declared {
        Some(EnvVar::Literal(value)) if !value.is_empty() => {
            return Some(found(value.clone(), KeySource::ConfigLiteral));
        }
        Some(reference @ EnvVar::FromEnv { .. }) => {
            let mut reference = reference.clone();
            match reference.resolve(env) {
                Ok(()) => {
                    if let Some(value) = reference.value() {
                        return Some(found(value.to_string(), KeySource::ConfigEnvReference));
                    }
                }
                Err(var) => {
                    tracing::warn!(
                        "Encryption key variable {} is not set, trying {}",
                        var,
                        ENCRYPTION_KEY_ENV
                    );
                }
            }
        }
        _ => {}
    }

    env.var(ENCRYPTION_KEY_ENV)
        .filter(|v| !v.is_empty())
        .map(|v| found(v, KeySource::FallbackEnv))
}
