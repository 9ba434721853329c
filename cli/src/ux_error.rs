use colored::Colorize;
use errors::{ConfigError, StorageError};
use std::path::Path;

/// An operator-facing error: what failed, why, and what to do about it.
#[derive(Debug)]
pub struct UxError {
    pub what: String,
    pub why: Option<String>,
    pub how_to_fix: Vec<String>,
    pub suggested_command: Option<String>
}

impl UxError {
    pub fn new(what: impl Into<String>) -> Self {
        Self {
            what: what.into(),
            why: None,
            how_to_fix: Vec::new(),
            suggested_command: None
        }
    }

    pub fn why(mut self, reason: impl Into<String>) -> Self {
        self.why = Some(reason.into());
        self
    }

    pub fn fix(mut self, suggestion: impl Into<String>) -> Self {
        self.how_to_fix.push(suggestion.into());
        self
    }

    pub fn suggest(mut self, cmd: impl Into<String>) -> Self {
        self.suggested_command = Some(cmd.into());
        self
    }

    pub fn display(&self) {
        eprintln!();
        eprintln!("{} {}", "error:".red().bold(), self.what.white().bold());

        if let Some(why) = &self.why {
            eprintln!("       {}", why.dimmed());
        }

        if !self.how_to_fix.is_empty() {
            eprintln!();
            eprintln!("{}", "How to fix:".yellow().bold());
            for (i, fix) in self.how_to_fix.iter().enumerate() {
                eprintln!("  {}. {}", i + 1, fix);
            }
        }

        if let Some(cmd) = &self.suggested_command {
            eprintln!();
            eprintln!("{}", "Try this:".green().bold());
            eprintln!("  $ {}", cmd.cyan());
        }
        eprintln!();
    }
}

impl std::fmt::Display for UxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.what)
    }
}

impl std::error::Error for UxError {}

pub fn config_not_found(app_dir: &Path) -> UxError {
    UxError::new(format!("No config file found in '{}'", app_dir.display()))
        .why("Expected config.json in the app directory or an explicit path")
        .fix("Pass the config file path as an argument")
        .fix("Or set GATEWAY_CONFIG_PATH / GATEWAY_APP_DIR")
        .suggest("gatewayctl check ./config.json")
}

/// Maps a control-plane error to operator guidance.
pub fn from_config_error(error: &ConfigError) -> UxError {
    match error {
        ConfigError::Io { path, reason } => UxError::new(format!("Cannot read config file '{path}'"))
            .why(reason.clone())
            .fix("Check the path and file permissions"),
        ConfigError::Parse { path, reason } => {
            UxError::new(format!("Config file '{path}' is not a valid config document"))
                .why(reason.clone())
                .fix("Use a .json, .yaml or .yml file")
                .fix("Fix the syntax error reported above")
                .suggest(format!("gatewayctl check {path}"))
        }
        ConfigError::ValidationFailure { entity, reason } => {
            UxError::new(format!("Validation failed for {entity}"))
                .why(reason.clone())
                .suggest("gatewayctl check")
        }
        ConfigError::EnvReferenceMissing { var, path } => {
            UxError::new(format!("Environment variable {var} is not set"))
                .why(format!("It is referenced by {path}"))
                .fix(format!("Export {var} before starting the gateway"))
                .fix("Or replace the env reference with a literal value")
        }
        ConfigError::Storage(StorageError::EncryptionError { reason, .. }) => {
            UxError::new("The config store could not be decrypted")
                .why(reason.clone())
                .fix(format!(
                    "Use the encryption key the store was written with ({})",
                    config::ENCRYPTION_KEY_ENV
                ))
        }
        ConfigError::Storage(StorageError::ConnectionError { backend, reason }) => {
            UxError::new(format!("Cannot open the {backend} config store"))
                .why(reason.clone())
                .fix("Supported config_store types are 'memory' and 'file'")
                .fix("A file store needs config.path or --store")
        }
        other => UxError::new(other.to_string())
    }
}
