//! Governance entities: budgets, rate limits, customers, teams, virtual keys
//! and routing rules.
//!
//! Every entity is addressed by a stable, file-declared id. Usage counters
//! (`current_usage`, `last_reset`) are owned by the serving engine and are
//! never part of an entity's declared content.

use crate::redact::{Redact, mask_secret, redact_json};
use crate::validation_error;
use chrono::{DateTime, Utc};
use errors::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use validator::Validate;

fn default_true() -> bool {
    true
}

fn require_id(kind: &str, id: &str) -> Result<(), ConfigError> {
    if id.trim().is_empty() {
        return Err(ConfigError::validation(kind, "id must not be empty"));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Validate)]
pub struct Budget {
    #[serde(default)]
    pub id: String,
    #[validate(range(min = 0.0))]
    pub max_limit: f64,
    /// Duration string such as `30s`, `1h`, `1d`, `1M`.
    pub reset_duration: String,
    #[serde(default)]
    pub current_usage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reset: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>
}

impl Budget {
    pub fn check(&self) -> Result<(), ConfigError> {
        require_id("budget", &self.id)?;
        self.validate()
            .map_err(|e| validation_error(format!("budget {}", self.id), &e))?;
        if !is_valid_duration(&self.reset_duration) {
            return Err(ConfigError::validation(
                format!("budget {}", self.id),
                format!("invalid reset_duration {}", self.reset_duration)
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Validate)]
pub struct RateLimit {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1))]
    pub token_max_limit: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_reset_duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1))]
    pub request_max_limit: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_reset_duration: Option<String>,
    #[serde(default)]
    pub token_current_usage: i64,
    #[serde(default)]
    pub request_current_usage: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>
}

impl RateLimit {
    pub fn check(&self) -> Result<(), ConfigError> {
        require_id("rate_limit", &self.id)?;
        let entity = format!("rate_limit {}", self.id);
        self.validate().map_err(|e| validation_error(&entity, &e))?;
        if self.token_max_limit.is_none() && self.request_max_limit.is_none() {
            return Err(ConfigError::validation(
                entity,
                "at least one of token_max_limit or request_max_limit is required"
            ));
        }
        for duration in [&self.token_reset_duration, &self.request_reset_duration]
            .into_iter()
            .flatten()
        {
            if !is_valid_duration(duration) {
                return Err(ConfigError::validation(
                    entity,
                    format!("invalid reset duration {duration}")
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Customer {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>
}

impl Customer {
    pub fn check(&self) -> Result<(), ConfigError> {
        require_id("customer", &self.id)?;
        if self.name.trim().is_empty() {
            return Err(ConfigError::validation(
                format!("customer {}", self.id),
                "name must not be empty"
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Team {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>
}

impl Team {
    pub fn check(&self) -> Result<(), ConfigError> {
        require_id("team", &self.id)?;
        if self.name.trim().is_empty() {
            return Err(ConfigError::validation(
                format!("team {}", self.id),
                "name must not be empty"
            ));
        }
        Ok(())
    }
}

impl Redact for Team {
    fn redacted(&self) -> Self {
        Self {
            config: self.config.as_ref().map(redact_json),
            ..self.clone()
        }
    }
}

/// Routing for one provider reachable through a virtual key.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Validate)]
pub struct VirtualKeyProviderConfig {
    #[serde(default)]
    pub id: String,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0))]
    pub weight: Option<f64>,
    #[serde(default)]
    pub allowed_models: Vec<String>,
    /// Key names or ids of the provider this virtual key may use; empty means all.
    #[serde(default)]
    pub allowed_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>
}

/// Tool permissions for one MCP client reachable through a virtual key.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VirtualKeyMcpConfig {
    #[serde(default)]
    pub id: String,
    pub mcp_client_name: String,
    #[serde(default)]
    pub tools_to_execute: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>
}

/// An issued credential mapping to provider routes and MCP tool permissions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct VirtualKey {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The secret presented by clients. Generated when left empty.
    #[serde(default)]
    pub value: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_id: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub provider_configs: Vec<VirtualKeyProviderConfig>,
    #[serde(default)]
    pub mcp_configs: Vec<VirtualKeyMcpConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>
}

impl Default for VirtualKey {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            description: None,
            value: String::new(),
            is_active: true,
            team_id: None,
            customer_id: None,
            budget_id: None,
            rate_limit_id: None,
            provider_configs: Vec::new(),
            mcp_configs: Vec::new(),
            config_hash: None
        }
    }
}

/// Prefix of generated virtual key secrets.
pub const VIRTUAL_KEY_PREFIX: &str = "sk-gw-";

impl VirtualKey {
    pub fn check(&self) -> Result<(), ConfigError> {
        require_id("virtual_key", &self.id)?;
        let entity = format!("virtual_key {}", self.id);
        self.validate().map_err(|e| validation_error(&entity, &e))?;
        if self.team_id.is_some() && self.customer_id.is_some() {
            return Err(ConfigError::validation(
                entity,
                "a virtual key belongs to a team or a customer, not both"
            ));
        }
        let mut providers = HashSet::new();
        for pc in &self.provider_configs {
            if !providers.insert(pc.provider.as_str()) {
                return Err(ConfigError::validation(
                    entity,
                    format!("provider {} is configured twice", pc.provider)
                ));
            }
        }
        let mut clients = HashSet::new();
        for mc in &self.mcp_configs {
            if !clients.insert(mc.mcp_client_name.as_str()) {
                return Err(ConfigError::validation(
                    entity,
                    format!("mcp client {} is configured twice", mc.mcp_client_name)
                ));
            }
        }
        Ok(())
    }

    /// Fills in a secret for keys declared without one.
    pub fn ensure_value(&mut self) {
        if self.value.is_empty() {
            self.value = format!("{VIRTUAL_KEY_PREFIX}{}", utils::generate_uuid().replace('-', ""));
        }
    }
}

impl Redact for VirtualKey {
    fn redacted(&self) -> Self {
        Self {
            value: if crate::redact::is_redacted(&self.value) {
                self.value.clone()
            } else {
                mask_secret(&self.value)
            },
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingScope {
    #[default]
    Global,
    Customer,
    Team,
    VirtualKey
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Validate)]
pub struct RoutingTarget {
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub weight: f64
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RoutingRule {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Expression evaluated by the serving engine against each request.
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    #[validate(nested)]
    pub targets: Vec<RoutingTarget>,
    #[serde(default)]
    pub fallbacks: Vec<String>,
    #[serde(default)]
    pub scope: RoutingScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_id: Option<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>
}

impl RoutingRule {
    pub fn check(&self) -> Result<(), ConfigError> {
        require_id("routing_rule", &self.id)?;
        let entity = format!("routing_rule {}", self.id);
        self.validate().map_err(|e| validation_error(&entity, &e))?;
        if self.targets.is_empty() {
            return Err(ConfigError::validation(entity, "at least one target is required"));
        }
        if self.scope != RoutingScope::Global && self.scope_id.is_none() {
            return Err(ConfigError::validation(entity, "scoped rules require scope_id"));
        }
        Ok(())
    }
}

/// Every governance collection, as declared in a file or held in memory.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GovernanceConfig {
    #[serde(default)]
    pub budgets: Vec<Budget>,
    #[serde(default)]
    pub rate_limits: Vec<RateLimit>,
    #[serde(default)]
    pub customers: Vec<Customer>,
    #[serde(default)]
    pub teams: Vec<Team>,
    #[serde(default)]
    pub virtual_keys: Vec<VirtualKey>,
    #[serde(default)]
    pub routing_rules: Vec<RoutingRule>
}

impl GovernanceConfig {
    #[must_use]
    pub fn budget(&self, id: &str) -> Option<&Budget> {
        self.budgets.iter().find(|b| b.id == id)
    }

    #[must_use]
    pub fn rate_limit(&self, id: &str) -> Option<&RateLimit> {
        self.rate_limits.iter().find(|r| r.id == id)
    }

    #[must_use]
    pub fn customer(&self, id: &str) -> Option<&Customer> {
        self.customers.iter().find(|c| c.id == id)
    }

    #[must_use]
    pub fn team(&self, id: &str) -> Option<&Team> {
        self.teams.iter().find(|t| t.id == id)
    }

    #[must_use]
    pub fn virtual_key(&self, id: &str) -> Option<&VirtualKey> {
        self.virtual_keys.iter().find(|v| v.id == id)
    }

    /// Looks up an active virtual key by the secret a client presented.
    #[must_use]
    pub fn virtual_key_by_value(&self, value: &str) -> Option<&VirtualKey> {
        self.virtual_keys.iter().find(|v| v.is_active && v.value == value)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.budgets.is_empty()
            && self.rate_limits.is_empty()
            && self.customers.is_empty()
            && self.teams.is_empty()
            && self.virtual_keys.is_empty()
            && self.routing_rules.is_empty()
    }
}

/// Accepts `<n><unit>` with unit one of s, m, h, d, w, M, Y.
#[must_use]
pub fn is_valid_duration(raw: &str) -> bool {
    let Some(unit) = raw.chars().last() else {
        return false;
    };
    let digits = &raw[..raw.len() - unit.len_utf8()];
    matches!(unit, 's' | 'm' | 'h' | 'd' | 'w' | 'M' | 'Y')
        && !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit())
        && digits.parse::<u64>().is_ok_and(|n| n > 0)
}
