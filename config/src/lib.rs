//! # Configuration System
//!
//! Configuration for the gateway control plane.
//!
//! This crate provides:
//! - The declarative config file model ([`GatewayConfigFile`])
//! - Config file loading (JSON/YAML)
//! - Process settings from environment variables (12-factor app principles)
//! - Settings precedence (CLI > env > defaults)
//! - Schema identifier checks and structural validation
//! - Encryption key resolution and provider auto-detection
//!
//! Nothing here touches the config store. Turning a loaded file into stored
//! state is the reconciler's job.

pub mod autodetect;
pub mod config;
pub mod encryption_key;
pub mod file_loader;
pub mod loader;
pub mod precedence;
pub mod validator;

pub use autodetect::{WELL_KNOWN_PROVIDERS, auto_detect_providers};
pub use config::{
    GatewayConfigFile, GatewaySettings, McpSection, SCHEMA_ID, SettingsOverrides,
    StoreConnectionConfig
};
pub use encryption_key::{ENCRYPTION_KEY_ENV, KeySource, ResolvedKey, resolve_encryption_key};
pub use file_loader::{ConfigFileError, load_document, load_from_file, parse_document};
pub use loader::load_from_env;
pub use precedence::merge_settings;
pub use validator::{SchemaReport, SchemaValidator, StructuralValidator, check_schema_identifier};
