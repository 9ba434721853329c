//! # Environment Variable Loader
//!
//! Loads process settings from environment variables following 12-factor app
//! principles.
//!
//! # Naming Convention
//! - `GATEWAY_*`: every process-level setting
//!
//! Secret values inside the config file are not read here. Those are
//! `env.NAME` references resolved per entity at load time.

use crate::config::SettingsOverrides;
use errors::ConfigError;
use std::env;
use std::path::PathBuf;

pub const CONFIG_PATH_ENV: &str = "GATEWAY_CONFIG_PATH";
pub const APP_DIR_ENV: &str = "GATEWAY_APP_DIR";
pub const LOG_LEVEL_ENV: &str = "GATEWAY_LOG_LEVEL";
pub const STORE_PATH_ENV: &str = "GATEWAY_STORE_PATH";

/// Load settings overrides from environment variables.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Reads the `GATEWAY_*` variables into a partial settings layer. Unset
/// variables stay `None` so lower layers show through in
/// [`merge_settings`](crate::merge_settings).
///
/// ## Environment Variables
/// - `GATEWAY_CONFIG_PATH`: Config file (default: `<app_dir>/config.json`)
/// - `GATEWAY_APP_DIR`: Application directory (default: ".")
/// - `GATEWAY_LOG_LEVEL`: Logging level (trace/debug/info/warn/error)
/// - `GATEWAY_STORE_PATH`: Snapshot file for the config store (default: in-memory)
///
/// ## Error Handling
/// Returns `ConfigError::ValidationFailure` for an unknown log level.
pub fn load_from_env() -> Result<SettingsOverrides, ConfigError> {
    let log_level = parse_env::<String>(LOG_LEVEL_ENV).ok();
    if let Some(level) = &log_level
        && !crate::GatewaySettings::is_valid_log_level(level)
    {
        return Err(ConfigError::validation(
            "settings",
            format!("{LOG_LEVEL_ENV}={level} is not a log level")
        ));
    }

    Ok(SettingsOverrides {
        config_path: parse_env::<PathBuf>(CONFIG_PATH_ENV).ok(),
        app_dir: parse_env::<PathBuf>(APP_DIR_ENV).ok(),
        log_level,
        store_path: parse_env::<PathBuf>(STORE_PATH_ENV).ok()
    })
}

fn parse_env<T>(key: &str) -> Result<T, Box<dyn std::error::Error>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static
{
    match env::var(key) {
        Ok(s) if s.trim().is_empty() => Err(format!("{key} is empty").into()),
        Ok(s) => s
            .parse::<T>()
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error>),
        Err(e) => Err(Box::new(e) as Box<dyn std::error::Error>)
    }
}
