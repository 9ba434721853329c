//! # Configuration Validation
//!
//! Document-level validation of the config file.
//!
//! Entity-level rules (weights, pool sizes, cross-field constraints) live on
//! the entity types in `gw_core` and run during reconciliation, where a
//! failing entity is skipped without failing the load. What runs here decides
//! whether the document is usable at all.

use crate::config::{GatewayConfigFile, SCHEMA_ID};
use crate::file_loader::parse_document;
use serde_json::Value;

/// Outcome of validating a config document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaReport {
    pub valid: bool,
    /// Human-readable findings. A valid document may still carry some.
    pub diagnostics: Vec<String>
}

impl SchemaReport {
    #[must_use]
    pub fn summary(&self) -> String {
        self.diagnostics.join("; ")
    }
}

/// Pass/fail validation of a raw config document.
pub trait SchemaValidator: Send + Sync {
    fn validate(&self, document: &Value) -> SchemaReport;
}

const OBJECT_SECTIONS: &[&str] = &[
    "client",
    "providers",
    "mcp",
    "governance",
    "config_store",
    "logs_store",
    "vector_store"
];
const ARRAY_SECTIONS: &[&str] = &["plugins"];
const STRING_SECTIONS: &[&str] = &["$schema", "encryption_key"];

/// Built-in validator: checks section shapes, then that the document parses.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralValidator;

impl SchemaValidator for StructuralValidator {
    fn validate(&self, document: &Value) -> SchemaReport {
        let Some(root) = document.as_object() else {
            return SchemaReport {
                valid: false,
                diagnostics: vec!["config document must be an object".to_string()]
            };
        };

        let mut diagnostics = Vec::new();
        let mut valid = true;

        for (section, value) in root {
            let expected = if OBJECT_SECTIONS.contains(&section.as_str()) {
                value.is_object()
            } else if ARRAY_SECTIONS.contains(&section.as_str()) {
                value.is_array()
            } else if STRING_SECTIONS.contains(&section.as_str()) {
                value.is_string()
            } else {
                diagnostics.push(format!("unknown top-level section {section} is ignored"));
                continue;
            };
            if !expected && !value.is_null() {
                valid = false;
                diagnostics.push(format!("section {section} has the wrong type"));
            }
        }

        if valid && let Err(e) = parse_document(document.clone()) {
            valid = false;
            diagnostics.push(e.to_string());
        }

        SchemaReport { valid, diagnostics }
    }
}

/// Returns an operator warning when the schema identifier is missing or not
/// the one this build understands. Never fatal.
#[must_use]
pub fn check_schema_identifier(file: &GatewayConfigFile) -> Option<String> {
    match file.schema.as_deref() {
        None => Some(format!(
            "config file declares no $schema; expected {SCHEMA_ID}"
        )),
        Some(id) if id == SCHEMA_ID || id.ends_with(&format!("/{SCHEMA_ID}")) => None,
        Some(other) => Some(format!(
            "config file declares $schema {other}; expected {SCHEMA_ID}"
        ))
    }
}
