//! Row codec: turns [`Record`]s into stored payloads and back.
//!
//! Provider rows never carry their keys and virtual-key rows never carry
//! their associations; those live in their own rows and are reattached on
//! read.

use errors::StorageError;
use gw_core::{
    ClientConfig, EntityKind, McpClientConfig, PluginConfig, ProviderConfig, Record, RecordRef,
    VirtualKey
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncryptionStatus {
    PlainText,
    Encrypted
}

/// A persisted row as the backend sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRow {
    pub address: RecordRef,
    /// Insertion order; listings return rows in this order.
    pub seq: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,
    pub payload: String,
    pub encryption_status: EncryptionStatus
}

fn to_json<T: Serialize>(kind: EntityKind, value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(|e| StorageError::SerializationError {
        error_type: kind.to_string(),
        reason: e.to_string()
    })
}

fn from_json<T: DeserializeOwned>(kind: EntityKind, payload: &str) -> Result<T, StorageError> {
    serde_json::from_str(payload).map_err(|e| StorageError::SerializationError {
        error_type: kind.to_string(),
        reason: e.to_string()
    })
}

/// Plaintext payload for a record.
pub fn encode_payload(record: &Record) -> Result<String, StorageError> {
    let kind = record.kind();
    match record {
        Record::ClientConfig(c) => to_json(kind, c),
        Record::Provider { config, .. } => to_json(
            kind,
            &ProviderConfig {
                keys: Vec::new(),
                ..config.clone()
            }
        ),
        Record::Key { key, .. } => to_json(kind, key),
        Record::Budget(b) => to_json(kind, b),
        Record::RateLimit(r) => to_json(kind, r),
        Record::Customer(c) => to_json(kind, c),
        Record::Team(t) => to_json(kind, t),
        Record::VirtualKey(v) => to_json(
            kind,
            &VirtualKey {
                provider_configs: Vec::new(),
                mcp_configs: Vec::new(),
                ..v.clone()
            }
        ),
        Record::VirtualKeyProviderConfig { config, .. } => to_json(kind, config),
        Record::VirtualKeyMcpConfig { config, .. } => to_json(kind, config),
        Record::RoutingRule(r) => to_json(kind, r),
        Record::McpClient(m) => to_json(kind, m),
        Record::Plugin(p) => to_json(kind, p)
    }
}

/// Rebuilds a record from its address and plaintext payload.
pub fn decode_payload(address: &RecordRef, payload: &str) -> Result<Record, StorageError> {
    let kind = address.kind;
    let parent = || {
        address.parent.clone().ok_or_else(|| StorageError::SerializationError {
            error_type: kind.to_string(),
            reason: format!("row {address} has no parent")
        })
    };
    Ok(match kind {
        EntityKind::ClientConfig => Record::ClientConfig(from_json::<ClientConfig>(kind, payload)?),
        EntityKind::Provider => Record::Provider {
            id: address.id.clone(),
            config: from_json(kind, payload)?
        },
        EntityKind::Key => Record::Key {
            provider: parent()?,
            key: from_json(kind, payload)?
        },
        EntityKind::Budget => Record::Budget(from_json(kind, payload)?),
        EntityKind::RateLimit => Record::RateLimit(from_json(kind, payload)?),
        EntityKind::Customer => Record::Customer(from_json(kind, payload)?),
        EntityKind::Team => Record::Team(from_json(kind, payload)?),
        EntityKind::VirtualKey => Record::VirtualKey(from_json(kind, payload)?),
        EntityKind::VirtualKeyProviderConfig => Record::VirtualKeyProviderConfig {
            virtual_key_id: parent()?,
            config: from_json(kind, payload)?
        },
        EntityKind::VirtualKeyMcpConfig => Record::VirtualKeyMcpConfig {
            virtual_key_id: parent()?,
            config: from_json(kind, payload)?
        },
        EntityKind::RoutingRule => Record::RoutingRule(from_json(kind, payload)?),
        EntityKind::McpClient => Record::McpClient(from_json::<McpClientConfig>(kind, payload)?),
        EntityKind::Plugin => Record::Plugin(from_json::<PluginConfig>(kind, payload)?)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gw_core::{EnvVar, Key};

    #[test]
    fn test_provider_payload_drops_keys() {
        let record = Record::Provider {
            id: "openai".to_string(),
            config: ProviderConfig {
                keys: vec![Key {
                    id: "k1".to_string(),
                    value: EnvVar::literal("sk-1"),
                    ..Key::default()
                }],
                ..ProviderConfig::default()
            }
        };
        let payload = encode_payload(&record).unwrap();
        assert!(!payload.contains("sk-1"));

        let Record::Provider { config, .. } = decode_payload(&record.reference(), &payload).unwrap()
        else {
            panic!("expected a provider record");
        };
        assert!(config.keys.is_empty());
    }

    #[test]
    fn test_env_reference_persisted_as_reference() {
        let mut value = EnvVar::from_env("OPENAI_API_KEY");
        let env: std::collections::HashMap<String, String> =
            [("OPENAI_API_KEY".to_string(), "sk-resolved".to_string())].into();
        value.resolve(&env).unwrap();

        let record = Record::Key {
            provider: "openai".to_string(),
            key: Key {
                id: "k1".to_string(),
                value,
                ..Key::default()
            }
        };
        let payload = encode_payload(&record).unwrap();
        assert!(payload.contains("env.OPENAI_API_KEY"));
        assert!(!payload.contains("sk-resolved"));
    }

    #[test]
    fn test_child_row_without_parent_is_rejected() {
        let address = RecordRef::new(EntityKind::Key, "k1");
        assert!(matches!(
            decode_payload(&address, "{}"),
            Err(StorageError::SerializationError { .. })
        ));
    }
}
