//! # Environment References
//!
//! Secret-bearing configuration fields hold an [`EnvVar`]: either a literal
//! value or a reference to a named environment variable (`env.NAME` in the
//! config file). References are resolved once, when an entity is loaded or
//! mutated through the admin surface, never on the request path.
//!
//! Serialization always writes the declared form. A resolved reference is
//! persisted as `env.NAME`, never as the value it resolved to.

use errors::ConfigError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Prefix marking a reference to an environment variable.
pub const ENV_PREFIX: &str = "env.";

/// A literal secret or a reference to an environment variable.
#[derive(Clone, PartialEq, Eq)]
pub enum EnvVar {
    Literal(String),
    FromEnv {
        name: String,
        /// Set once resolution succeeds.
        value: Option<String>
    }
}

impl Default for EnvVar {
    fn default() -> Self {
        Self::Literal(String::new())
    }
}

impl EnvVar {
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    pub fn from_env(name: impl Into<String>) -> Self {
        Self::FromEnv {
            name: name.into(),
            value: None
        }
    }

    /// Parses the declared form. `env.NAME` becomes a reference; anything
    /// else, including a bare `env.`, is a literal.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix(ENV_PREFIX) {
            Some(name) if !name.is_empty() => Self::from_env(name),
            _ => Self::literal(raw)
        }
    }

    /// The declared form: the literal itself or `env.NAME`.
    #[must_use]
    pub fn reference(&self) -> String {
        match self {
            Self::Literal(value) => value.clone(),
            Self::FromEnv { name, .. } => format!("{ENV_PREFIX}{name}")
        }
    }

    /// The usable secret, if any. Unresolved references yield `None`.
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Literal(value) => Some(value.as_str()),
            Self::FromEnv { value, .. } => value.as_deref()
        }
    }

    #[must_use]
    pub fn env_name(&self) -> Option<&str> {
        match self {
            Self::Literal(_) => None,
            Self::FromEnv { name, .. } => Some(name.as_str())
        }
    }

    #[must_use]
    pub fn is_from_env(&self) -> bool {
        matches!(self, Self::FromEnv { .. })
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.value().is_some()
    }

    /// A literal empty string. References are never considered empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Literal(value) if value.is_empty())
    }

    /// Resolves a reference against `env`. Literals and references that
    /// already hold a value are left untouched, so a second call within the
    /// same load cycle never re-reads the environment.
    ///
    /// Returns the variable name when it is absent or empty.
    pub fn resolve(&mut self, env: &dyn EnvLookup) -> Result<(), String> {
        match self {
            Self::Literal(_) | Self::FromEnv { value: Some(_), .. } => Ok(()),
            Self::FromEnv { name, value } => match env.var(name) {
                Some(found) if !found.is_empty() => {
                    *value = Some(found);
                    Ok(())
                }
                _ => Err(name.clone())
            }
        }
    }
}

impl fmt::Debug for EnvVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EnvVar")
            .field(&crate::redact::Redact::redacted(self).reference())
            .finish()
    }
}

impl Serialize for EnvVar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.reference())
    }
}

impl<'de> Deserialize<'de> for EnvVar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

/// Source of environment variables.
pub trait EnvLookup: Send + Sync {
    fn var(&self, name: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvLookup for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl EnvLookup for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl EnvLookup for BTreeMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Without it the entity is unusable; a missing variable rejects the entity.
    Required,
    /// A missing variable leaves the field unresolved and raises a warning.
    Optional
}

/// Optional reference that could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvWarning {
    pub var: String,
    pub path: String
}

/// Where an environment variable is used in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvReference {
    pub var: String,
    pub path: String,
    pub required: bool
}

/// Implemented by every entity carrying `EnvVar` fields.
pub trait EnvFields {
    /// Calls `visit` with the config path, the field and its requirement for
    /// every `EnvVar` reachable from `self`.
    fn visit_env_fields(&mut self, path: &str, visit: &mut dyn FnMut(&str, &mut EnvVar, Requirement));
}

/// Resolves every reference in `entity`.
///
/// Missing optional variables are returned as warnings. The first missing
/// required variable is returned as `EnvReferenceMissing`; the caller must
/// not admit the entity in that case.
pub fn resolve_env<T: EnvFields + ?Sized>(
    entity: &mut T,
    env: &dyn EnvLookup,
    path: &str
) -> Result<Vec<EnvWarning>, ConfigError> {
    let mut warnings = Vec::new();
    let mut missing: Option<ConfigError> = None;
    entity.visit_env_fields(path, &mut |field_path, field, requirement| {
        if let Err(var) = field.resolve(env) {
            match requirement {
                Requirement::Required => {
                    if missing.is_none() {
                        missing = Some(ConfigError::EnvReferenceMissing {
                            var,
                            path: field_path.to_string()
                        });
                    }
                }
                Requirement::Optional => warnings.push(EnvWarning {
                    var,
                    path: field_path.to_string()
                })
            }
        }
    });
    match missing {
        Some(err) => Err(err),
        None => Ok(warnings)
    }
}

/// Lists every environment variable `entity` refers to.
pub fn env_references<T: EnvFields + Clone>(entity: &T, path: &str) -> Vec<EnvReference> {
    let mut scratch = entity.clone();
    let mut found = Vec::new();
    scratch.visit_env_fields(path, &mut |field_path, field, requirement| {
        if let Some(name) = field.env_name() {
            found.push(EnvReference {
                var: name.to_string(),
                path: field_path.to_string(),
                required: requirement == Requirement::Required
            });
        }
    });
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Pair {
        primary: EnvVar,
        secondary: Option<EnvVar>
    }

    impl EnvFields for Pair {
        fn visit_env_fields(
            &mut self,
            path: &str,
            visit: &mut dyn FnMut(&str, &mut EnvVar, Requirement)
        ) {
            visit(&format!("{path}.primary"), &mut self.primary, Requirement::Required);
            if let Some(secondary) = &mut self.secondary {
                visit(&format!("{path}.secondary"), secondary, Requirement::Optional);
            }
        }
    }

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_parse_reference_and_literal() {
        assert_eq!(EnvVar::parse("env.OPENAI_API_KEY"), EnvVar::from_env("OPENAI_API_KEY"));
        assert_eq!(EnvVar::parse("sk-literal"), EnvVar::literal("sk-literal"));
        assert_eq!(EnvVar::parse("env."), EnvVar::literal("env."));
    }

    #[test]
    fn test_serialization_keeps_reference_not_value() {
        let mut var = EnvVar::from_env("API_KEY");
        var.resolve(&env(&[("API_KEY", "sk-secret")])).unwrap();
        assert_eq!(var.value(), Some("sk-secret"));

        let json = serde_json::to_string(&var).unwrap();
        assert_eq!(json, "\"env.API_KEY\"");

        let back: EnvVar = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EnvVar::from_env("API_KEY"));
    }

    #[test]
    fn test_resolve_is_one_shot() {
        let mut var = EnvVar::from_env("API_KEY");
        var.resolve(&env(&[("API_KEY", "first")])).unwrap();
        var.resolve(&env(&[("API_KEY", "second")])).unwrap();
        assert_eq!(var.value(), Some("first"));
    }

    #[test]
    fn test_empty_variable_counts_as_missing() {
        let mut var = EnvVar::from_env("API_KEY");
        assert_eq!(var.resolve(&env(&[("API_KEY", "")])), Err("API_KEY".to_string()));
        assert!(!var.is_resolved());
    }

    #[test]
    fn test_debug_never_prints_secret() {
        let var = EnvVar::literal("sk-abcdefghijklmnopqrstuvwxyz");
        let printed = format!("{var:?}");
        assert!(!printed.contains("efghijklmnop"));

        let mut var = EnvVar::from_env("API_KEY");
        var.resolve(&env(&[("API_KEY", "sk-live-value")])).unwrap();
        assert_eq!(format!("{var:?}"), "EnvVar(\"env.API_KEY\")");
    }

    #[test]
    fn test_resolve_env_optional_missing_warns() {
        let mut pair = Pair {
            primary: EnvVar::from_env("PRIMARY"),
            secondary: Some(EnvVar::from_env("SECONDARY"))
        };
        let warnings = resolve_env(&mut pair, &env(&[("PRIMARY", "p")]), "entry").unwrap();
        assert_eq!(
            warnings,
            vec![EnvWarning {
                var: "SECONDARY".to_string(),
                path: "entry.secondary".to_string()
            }]
        );
        assert_eq!(pair.primary.value(), Some("p"));
        assert_eq!(pair.secondary.as_ref().and_then(EnvVar::value), None);
    }

    #[test]
    fn test_resolve_env_required_missing_errors() {
        let mut pair = Pair {
            primary: EnvVar::from_env("PRIMARY"),
            secondary: None
        };
        let err = resolve_env(&mut pair, &env(&[]), "entry").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::EnvReferenceMissing { ref var, ref path }
                if var == "PRIMARY" && path == "entry.primary"
        ));
    }

    #[test]
    fn test_env_references_lists_names() {
        let pair = Pair {
            primary: EnvVar::literal("inline"),
            secondary: Some(EnvVar::from_env("SECONDARY"))
        };
        let refs = env_references(&pair, "entry");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].var, "SECONDARY");
        assert!(!refs[0].required);
    }
}
