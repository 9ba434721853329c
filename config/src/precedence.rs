//! # Configuration Precedence
//!
//! Merges process settings from multiple sources with precedence rules.
//!
//! # Precedence Order
//! 1. CLI arguments (highest priority)
//! 2. Environment variables
//! 3. Default values (lowest priority)

use crate::config::{GatewaySettings, SettingsOverrides};

/// Merge settings layers over the defaults, lowest priority first.
///
/// # M-CANONICAL-DOCS
///
/// ## Usage
/// ```rust,no_run
/// use config::{GatewaySettings, SettingsOverrides, load_from_env, merge_settings};
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let from_env = load_from_env()?;
///     let settings = merge_settings(
///         GatewaySettings::default(),
///         &[("env", from_env), ("cli", SettingsOverrides::default())]
///     );
///     println!("log level: {}", settings.log_level);
///     Ok(())
/// }
/// ```
pub fn merge_settings(
    defaults: GatewaySettings,
    layers: &[(&str, SettingsOverrides)]
) -> GatewaySettings {
    layers
        .iter()
        .fold(defaults, |base, (source, layer)| merge_with_logging(base, layer, source))
}

fn merge_with_logging(
    mut base: GatewaySettings,
    layer: &SettingsOverrides,
    source_name: &str
) -> GatewaySettings {
    let mut changes = Vec::new();

    if let Some(path) = &layer.config_path
        && base.config_path.as_ref() != Some(path)
    {
        changes.push(format!("config_path = {}", path.display()));
        base.config_path = Some(path.clone());
    }
    if let Some(dir) = &layer.app_dir
        && &base.app_dir != dir
    {
        changes.push(format!("app_dir = {}", dir.display()));
        base.app_dir.clone_from(dir);
    }
    if let Some(level) = &layer.log_level
        && &base.log_level != level
    {
        changes.push(format!("log_level = {level}"));
        base.log_level.clone_from(level);
    }
    if let Some(path) = &layer.store_path
        && base.store_path.as_ref() != Some(path)
    {
        changes.push(format!("store_path = {}", path.display()));
        base.store_path = Some(path.clone());
    }

    if !changes.is_empty() {
        tracing::info!("Settings from {}: {:?}", source_name, changes);
    }

    base
}
