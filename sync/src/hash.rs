//! # Hash Generator
//!
//! Deterministic content hashes for every reconciled entity.
//!
//! A hash covers the fields an operator declares and nothing else: ids,
//! stored hashes, usage counters and fields the admin surface owns (key
//! status and description) are left out, as are child collections with their
//! own hashes (provider keys, virtual-key associations). Secret-bearing fields
//! hash by their declared form, so `env.NAME` hashes the same no matter what
//! the variable holds.

use errors::ConfigError;
use gw_core::{
    Budget, ClientConfig, Customer, Key, McpClientConfig, PluginConfig, ProviderConfig, RateLimit,
    RoutingRule, Team, VirtualKey, VirtualKeyMcpConfig, VirtualKeyProviderConfig
};
use std::collections::BTreeMap;
use utils::{ContentHasher, HashError};

pub trait ConfigHashable {
    /// Mixed into every digest so different entity types never collide.
    const HASH_KIND: &'static str;

    /// Short description used in logs and errors.
    fn hash_label(&self) -> String;

    fn write_fields(&self, hasher: &mut ContentHasher) -> Result<(), HashError>;

    /// Hex SHA-256 of the semantically significant fields.
    fn compute_hash(&self) -> Result<String, ConfigError> {
        let mut hasher = ContentHasher::new(Self::HASH_KIND);
        self.write_fields(&mut hasher)
            .map_err(|e| ConfigError::HashGenerationFailure {
                entity: self.hash_label(),
                reason: e.to_string()
            })?;
        Ok(hasher.finish())
    }
}

impl ConfigHashable for ClientConfig {
    const HASH_KIND: &'static str = "client_config";

    fn hash_label(&self) -> String {
        "client_config".to_string()
    }

    fn write_fields(&self, h: &mut ContentHasher) -> Result<(), HashError> {
        h.bool("drop_excess_requests", self.drop_excess_requests)
            .int("initial_pool_size", i64::from(self.initial_pool_size))
            .set("prometheus_labels", &self.prometheus_labels)
            .bool("enable_logging", self.enable_logging)
            .bool("disable_content_logging", self.disable_content_logging)
            .int("log_retention_days", i64::from(self.log_retention_days))
            .bool("enable_governance", self.enable_governance)
            .bool("enforce_governance_header", self.enforce_governance_header)
            .bool("allow_direct_keys", self.allow_direct_keys)
            .set("allowed_origins", &self.allowed_origins)
            .set("allowed_headers", &self.allowed_headers)
            .int("max_request_body_size_mb", i64::from(self.max_request_body_size_mb))
            .int("mcp_agent_depth", i64::from(self.mcp_agent_depth))
            .int(
                "mcp_tool_execution_timeout",
                i64::try_from(self.mcp_tool_execution_timeout).unwrap_or(i64::MAX)
            );
        match &self.header_filter_config {
            Some(filter) => {
                h.set("header_allowlist", &filter.allowlist)
                    .set("header_denylist", &filter.denylist);
            }
            None => {
                h.opt_str("header_filter_config", None);
            }
        }
        Ok(())
    }
}

impl ConfigHashable for ProviderConfig {
    const HASH_KIND: &'static str = "provider";

    fn hash_label(&self) -> String {
        "provider".to_string()
    }

    fn write_fields(&self, h: &mut ContentHasher) -> Result<(), HashError> {
        h.json("network_config", &self.network_config)?
            .json("concurrency_and_buffer_size", &self.concurrency_and_buffer_size)?
            .json("proxy_config", &self.proxy_config)?
            .bool("send_back_raw_response", self.send_back_raw_response)
            .json("custom_provider_config", &self.custom_provider_config)?
            .int("pricing_overrides", self.pricing_overrides.len() as i64);
        let mut overrides: Vec<_> = self.pricing_overrides.iter().collect();
        overrides.sort_by(|a, b| a.model.cmp(&b.model));
        for pricing in overrides {
            h.str("model", &pricing.model)
                .float("input_cost_per_token", pricing.input_cost_per_token)?
                .float("output_cost_per_token", pricing.output_cost_per_token)?;
        }
        Ok(())
    }
}

impl ConfigHashable for Key {
    const HASH_KIND: &'static str = "key";

    fn hash_label(&self) -> String {
        format!("key {}", if self.name.is_empty() { &self.id } else { &self.name })
    }

    fn write_fields(&self, h: &mut ContentHasher) -> Result<(), HashError> {
        h.str("name", &self.name)
            .str("value", &self.value.reference())
            .set("models", &self.models)
            .float("weight", self.effective_weight())?
            .bool("enabled", self.is_enabled())
            .json("azure_key_config", &self.azure_key_config)?
            .json("vertex_key_config", &self.vertex_key_config)?
            .json("bedrock_key_config", &self.bedrock_key_config)?;
        Ok(())
    }
}

impl ConfigHashable for Budget {
    const HASH_KIND: &'static str = "budget";

    fn hash_label(&self) -> String {
        format!("budget {}", self.id)
    }

    fn write_fields(&self, h: &mut ContentHasher) -> Result<(), HashError> {
        h.float("max_limit", self.max_limit)?
            .str("reset_duration", &self.reset_duration);
        Ok(())
    }
}

impl ConfigHashable for RateLimit {
    const HASH_KIND: &'static str = "rate_limit";

    fn hash_label(&self) -> String {
        format!("rate_limit {}", self.id)
    }

    fn write_fields(&self, h: &mut ContentHasher) -> Result<(), HashError> {
        h.opt_int("token_max_limit", self.token_max_limit)
            .opt_str("token_reset_duration", self.token_reset_duration.as_deref())
            .opt_int("request_max_limit", self.request_max_limit)
            .opt_str("request_reset_duration", self.request_reset_duration.as_deref());
        Ok(())
    }
}

impl ConfigHashable for Customer {
    const HASH_KIND: &'static str = "customer";

    fn hash_label(&self) -> String {
        format!("customer {}", self.id)
    }

    fn write_fields(&self, h: &mut ContentHasher) -> Result<(), HashError> {
        h.str("name", &self.name)
            .opt_str("budget_id", self.budget_id.as_deref())
            .opt_str("rate_limit_id", self.rate_limit_id.as_deref());
        Ok(())
    }
}

impl ConfigHashable for Team {
    const HASH_KIND: &'static str = "team";

    fn hash_label(&self) -> String {
        format!("team {}", self.id)
    }

    fn write_fields(&self, h: &mut ContentHasher) -> Result<(), HashError> {
        h.str("name", &self.name)
            .opt_str("customer_id", self.customer_id.as_deref())
            .opt_str("budget_id", self.budget_id.as_deref())
            .opt_str("rate_limit_id", self.rate_limit_id.as_deref())
            .json("profile", &self.profile)?
            .json("config", &self.config)?
            .json("claims", &self.claims)?;
        Ok(())
    }
}

impl ConfigHashable for VirtualKey {
    const HASH_KIND: &'static str = "virtual_key";

    fn hash_label(&self) -> String {
        format!("virtual_key {}", self.name)
    }

    fn write_fields(&self, h: &mut ContentHasher) -> Result<(), HashError> {
        h.str("name", &self.name)
            .opt_str("description", self.description.as_deref())
            .str("value", &self.value)
            .bool("is_active", self.is_active)
            .opt_str("team_id", self.team_id.as_deref())
            .opt_str("customer_id", self.customer_id.as_deref())
            .opt_str("budget_id", self.budget_id.as_deref())
            .opt_str("rate_limit_id", self.rate_limit_id.as_deref());
        Ok(())
    }
}

impl ConfigHashable for VirtualKeyProviderConfig {
    const HASH_KIND: &'static str = "virtual_key_provider_config";

    fn hash_label(&self) -> String {
        format!("virtual_key_provider_config {}", self.provider)
    }

    fn write_fields(&self, h: &mut ContentHasher) -> Result<(), HashError> {
        h.str("provider", &self.provider)
            .opt_float("weight", self.weight)?
            .set("allowed_models", &self.allowed_models)
            .set("allowed_keys", &self.allowed_keys)
            .opt_str("budget_id", self.budget_id.as_deref())
            .opt_str("rate_limit_id", self.rate_limit_id.as_deref());
        Ok(())
    }
}

impl ConfigHashable for VirtualKeyMcpConfig {
    const HASH_KIND: &'static str = "virtual_key_mcp_config";

    fn hash_label(&self) -> String {
        format!("virtual_key_mcp_config {}", self.mcp_client_name)
    }

    fn write_fields(&self, h: &mut ContentHasher) -> Result<(), HashError> {
        h.str("mcp_client_name", &self.mcp_client_name)
            .set("tools_to_execute", &self.tools_to_execute);
        Ok(())
    }
}

impl ConfigHashable for RoutingRule {
    const HASH_KIND: &'static str = "routing_rule";

    fn hash_label(&self) -> String {
        format!("routing_rule {}", self.id)
    }

    fn write_fields(&self, h: &mut ContentHasher) -> Result<(), HashError> {
        h.str("name", &self.name)
            .opt_str("description", self.description.as_deref())
            .bool("enabled", self.enabled)
            .str("condition", &self.condition)
            .int("targets", self.targets.len() as i64);
        let mut targets: Vec<_> = self.targets.iter().collect();
        targets.sort_by(|a, b| {
            (&a.provider, &a.model)
                .cmp(&(&b.provider, &b.model))
                .then(a.weight.total_cmp(&b.weight))
        });
        for target in targets {
            h.str("provider", &target.provider)
                .opt_str("model", target.model.as_deref())
                .float("weight", target.weight)?;
        }
        let fallbacks: Vec<&str> = self.fallbacks.iter().map(String::as_str).collect();
        h.list("fallbacks", &fallbacks)
            .json("scope", &self.scope)?
            .opt_str("scope_id", self.scope_id.as_deref())
            .int("priority", i64::from(self.priority));
        Ok(())
    }
}

impl ConfigHashable for McpClientConfig {
    const HASH_KIND: &'static str = "mcp_client";

    fn hash_label(&self) -> String {
        format!("mcp_client {}", self.name)
    }

    fn write_fields(&self, h: &mut ContentHasher) -> Result<(), HashError> {
        let headers: BTreeMap<String, String> = self
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), value.reference()))
            .collect();
        h.str("name", &self.name)
            .json("connection", &self.connection)?
            .map("headers", &headers)
            .set("tools_to_execute", &self.tools_to_execute)
            .set("tools_to_auto_execute", &self.tools_to_auto_execute)
            .int("tool_pricing", self.tool_pricing.len() as i64);
        for (tool, price) in &self.tool_pricing {
            h.float(tool, *price)?;
        }
        Ok(())
    }
}

impl ConfigHashable for PluginConfig {
    const HASH_KIND: &'static str = "plugin";

    fn hash_label(&self) -> String {
        format!("plugin {}", self.name)
    }

    fn write_fields(&self, h: &mut ContentHasher) -> Result<(), HashError> {
        h.str("name", &self.name)
            .bool("enabled", self.enabled)
            .opt_str("path", self.path.as_deref())
            .opt_int("version", self.version)
            .json("config", &self.effective_config())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gw_core::{EnvVar, KeyStatus, PricingOverride, RoutingScope, RoutingTarget};
    use serde_json::json;

    fn key() -> Key {
        Key {
            id: "k1".to_string(),
            name: "primary".to_string(),
            value: EnvVar::from_env("OPENAI_API_KEY"),
            models: vec!["gpt-4o".to_string(), "gpt-4o-mini".to_string()],
            ..Key::default()
        }
    }

    #[test]
    fn test_key_hash_ignores_bookkeeping() {
        let base = key().compute_hash().unwrap();

        let mut other = key();
        other.id = "different".to_string();
        other.status = KeyStatus::Failing;
        other.description = Some("rotated by ops".to_string());
        other.config_hash = Some("stale".to_string());
        other.models.reverse();
        assert_eq!(other.compute_hash().unwrap(), base);

        other.weight = Some(1.0);
        assert_eq!(other.compute_hash().unwrap(), base);

        other.weight = Some(0.5);
        assert_ne!(other.compute_hash().unwrap(), base);
    }

    #[test]
    fn test_resolution_does_not_change_hash() {
        let base = key().compute_hash().unwrap();
        let mut resolved = key();
        let env: std::collections::HashMap<String, String> =
            [("OPENAI_API_KEY".to_string(), "sk-live".to_string())].into();
        resolved.value.resolve(&env).unwrap();
        assert_eq!(resolved.compute_hash().unwrap(), base);

        let mut literal = key();
        literal.value = EnvVar::literal("env.OPENAI_API_KEY-but-literal");
        assert_ne!(literal.compute_hash().unwrap(), base);
    }

    #[test]
    fn test_non_finite_weight_fails() {
        let mut k = key();
        k.weight = Some(f64::NAN);
        assert!(matches!(
            k.compute_hash(),
            Err(ConfigError::HashGenerationFailure { entity, .. }) if entity == "key primary"
        ));
    }

    #[test]
    fn test_provider_hash_excludes_keys() {
        let provider = ProviderConfig::default();
        let with_keys = ProviderConfig {
            keys: vec![key()],
            ..ProviderConfig::default()
        };
        assert_eq!(provider.compute_hash().unwrap(), with_keys.compute_hash().unwrap());

        let raw = ProviderConfig {
            send_back_raw_response: true,
            ..ProviderConfig::default()
        };
        assert_ne!(provider.compute_hash().unwrap(), raw.compute_hash().unwrap());
    }

    #[test]
    fn test_pricing_override_order_irrelevant() {
        let pricing = |model: &str, cost: f64| PricingOverride {
            model: model.to_string(),
            input_cost_per_token: cost,
            output_cost_per_token: cost * 2.0
        };
        let provider = ProviderConfig {
            pricing_overrides: vec![pricing("gpt-4o", 0.5), pricing("gpt-4o-mini", 0.1)],
            ..ProviderConfig::default()
        };
        let mut reordered = provider.clone();
        reordered.pricing_overrides.reverse();
        assert_eq!(provider.compute_hash().unwrap(), reordered.compute_hash().unwrap());

        reordered.pricing_overrides[0].input_cost_per_token = 0.2;
        assert_ne!(provider.compute_hash().unwrap(), reordered.compute_hash().unwrap());
    }

    #[test]
    fn test_routing_target_order_irrelevant() {
        let target = |provider: &str, model: Option<&str>, weight: f64| RoutingTarget {
            provider: provider.to_string(),
            model: model.map(str::to_string),
            weight
        };
        let rule = RoutingRule {
            id: "r1".to_string(),
            name: "split".to_string(),
            description: None,
            enabled: true,
            condition: String::new(),
            targets: vec![
                target("openai", Some("gpt-4o"), 0.7),
                target("anthropic", None, 0.3),
                target("openai", None, 0.0)
            ],
            fallbacks: vec!["anthropic".to_string()],
            scope: RoutingScope::Global,
            scope_id: None,
            priority: 0,
            config_hash: None
        };
        let mut reordered = rule.clone();
        reordered.targets.rotate_left(1);
        assert_eq!(rule.compute_hash().unwrap(), reordered.compute_hash().unwrap());

        reordered.targets[0].weight = 0.4;
        assert_ne!(rule.compute_hash().unwrap(), reordered.compute_hash().unwrap());
    }

    #[test]
    fn test_virtual_key_hash_excludes_associations() {
        let vk = VirtualKey {
            id: "vk1".to_string(),
            name: "frontend".to_string(),
            value: "sk-gw-abc".to_string(),
            ..VirtualKey::default()
        };
        let with_assoc = VirtualKey {
            provider_configs: vec![VirtualKeyProviderConfig {
                provider: "openai".to_string(),
                ..VirtualKeyProviderConfig::default()
            }],
            ..vk.clone()
        };
        assert_eq!(vk.compute_hash().unwrap(), with_assoc.compute_hash().unwrap());
    }

    #[test]
    fn test_budget_usage_excluded() {
        let budget = Budget {
            id: "b1".to_string(),
            max_limit: 50.0,
            reset_duration: "1M".to_string(),
            ..Budget::default()
        };
        let used = Budget {
            current_usage: 42.5,
            ..budget.clone()
        };
        assert_eq!(budget.compute_hash().unwrap(), used.compute_hash().unwrap());
    }

    #[test]
    fn test_plugin_empty_config_is_no_config() {
        let plugin = PluginConfig {
            name: "telemetry".to_string(),
            enabled: true,
            ..PluginConfig::default()
        };
        let empty = PluginConfig {
            config: Some(json!({})),
            ..plugin.clone()
        };
        assert_eq!(plugin.compute_hash().unwrap(), empty.compute_hash().unwrap());
    }

    #[test]
    fn test_team_config_key_order_irrelevant() {
        let a = Team {
            id: "t1".to_string(),
            name: "ml".to_string(),
            config: Some(json!({"a": 1, "b": {"y": 2, "x": 1}})),
            ..Team::default()
        };
        let b = Team {
            config: Some(serde_json::from_str(r#"{"b": {"x": 1, "y": 2}, "a": 1}"#).unwrap()),
            ..a.clone()
        };
        assert_eq!(a.compute_hash().unwrap(), b.compute_hash().unwrap());
    }

    #[test]
    fn test_different_kinds_do_not_collide() {
        let customer = Customer {
            id: "x".to_string(),
            name: "acme".to_string(),
            ..Customer::default()
        };
        let team = Team {
            id: "x".to_string(),
            name: "acme".to_string(),
            ..Team::default()
        };
        assert_ne!(customer.compute_hash().unwrap(), team.compute_hash().unwrap());
    }
}
