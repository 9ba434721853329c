//! # Configuration File Loading
//!
//! Loads the gateway config file from JSON or YAML.
//!
//! Supports automatic format detection based on file extension. Loading is a
//! two-step affair: the raw document is read first so schema validation can
//! see exactly what the operator wrote, then it is parsed into
//! [`GatewayConfigFile`].

use crate::config::GatewayConfigFile;
use errors::ConfigError;
use serde_json::Value;
use std::path::Path;

/// Configuration file loading error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(String),

    #[error("Failed to parse YAML: {0}")]
    YamlParse(String),

    #[error("Config file has no extension")]
    NoExtension,

    #[error("Unsupported config file format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid config document: {0}")]
    InvalidDocument(String)
}

impl ConfigFileError {
    /// Maps into the control-plane taxonomy, tagging the offending path.
    #[must_use]
    pub fn into_config_error(self, path: &Path) -> ConfigError {
        let path = path.display().to_string();
        match self {
            Self::FileNotFound(reason) => ConfigError::Io { path, reason },
            other => ConfigError::Parse {
                path,
                reason: other.to_string()
            }
        }
    }
}

/// Read a config file into an untyped document.
///
/// # M-CANONICAL-DOCS
///
/// ## Supported Formats
/// - `.json`: JSON format
/// - `.yaml`: YAML format
/// - `.yml`: YAML format
///
/// ## Error Handling
/// Returns `ConfigFileError` for:
/// - File not found
/// - Invalid file extension
/// - Parse errors for detected format
pub fn load_document(path: &Path) -> Result<Value, ConfigFileError> {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or(ConfigFileError::NoExtension)?;

    let contents = std::fs::read_to_string(path)
        .map_err(|e| ConfigFileError::FileNotFound(format!("{}: {e}", path.display())))?;

    match extension.to_lowercase().as_str() {
        "json" => {
            serde_json::from_str(&contents).map_err(|e| ConfigFileError::JsonParse(e.to_string()))
        }
        "yaml" | "yml" => {
            serde_yaml::from_str(&contents).map_err(|e| ConfigFileError::YamlParse(e.to_string()))
        }
        other => Err(ConfigFileError::UnsupportedFormat(other.to_string()))
    }
}

/// Parse a document into the typed config file model.
pub fn parse_document(document: Value) -> Result<GatewayConfigFile, ConfigFileError> {
    serde_json::from_value(document).map_err(|e| ConfigFileError::InvalidDocument(e.to_string()))
}

/// Load configuration from file with auto-detection.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Loads the config file, detecting the format from its extension.
///
/// ## Usage
/// ```rust,no_run
/// use config::load_from_file;
/// use std::path::Path;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let file = load_from_file(Path::new("config.json"))?;
///     println!("providers declared: {}", file.providers.map_or(0, |p| p.len()));
///     Ok(())
/// }
/// ```
pub fn load_from_file(path: &Path) -> Result<GatewayConfigFile, ConfigFileError> {
    parse_document(load_document(path)?)
}
