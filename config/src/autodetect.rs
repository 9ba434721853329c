//! Provider auto-detection for first boot without a config file.

use gw_core::{EnvLookup, EnvVar, Key, ProviderConfig};
use std::collections::BTreeMap;

/// Provider name and the variable that conventionally holds its API key.
pub const WELL_KNOWN_PROVIDERS: &[(&str, &str)] = &[
    ("openai", "OPENAI_API_KEY"),
    ("anthropic", "ANTHROPIC_API_KEY"),
    ("mistral", "MISTRAL_API_KEY"),
    ("groq", "GROQ_API_KEY"),
    ("cohere", "COHERE_API_KEY"),
    ("gemini", "GEMINI_API_KEY"),
    ("openrouter", "OPENROUTER_API_KEY"),
    ("perplexity", "PERPLEXITY_API_KEY"),
    ("cerebras", "CEREBRAS_API_KEY")
];

/// One provider per well-known variable that is set. Keys are stored as
/// `env.NAME` references so the secret itself is never persisted.
#[must_use]
pub fn auto_detect_providers(env: &dyn EnvLookup) -> BTreeMap<String, ProviderConfig> {
    WELL_KNOWN_PROVIDERS
        .iter()
        .filter(|(_, var)| env.var(var).is_some_and(|v| !v.is_empty()))
        .map(|(provider, var)| {
            tracing::info!("Detected {} credentials in {}", provider, var);
            let key = Key {
                id: format!("{provider}-env"),
                name: format!("{provider}-env"),
                value: EnvVar::from_env(*var),
                ..Key::default()
            };
            (
                (*provider).to_string(),
                ProviderConfig {
                    keys: vec![key],
                    ..ProviderConfig::default()
                }
            )
        })
        .collect()
}
