//! MCP client configuration.

use crate::env::{EnvFields, EnvVar, Requirement};
use crate::redact::Redact;
use errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Wildcard entry in a tool allow-list.
pub const ALL_TOOLS: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StdioConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Names of environment variables forwarded to the child process.
    #[serde(default)]
    pub envs: Vec<String>
}

/// How the gateway reaches an MCP server. Exactly one transport per client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "connection_type", rename_all = "snake_case")]
pub enum McpConnection {
    Stdio { stdio_config: StdioConfig },
    Http { connection_string: EnvVar },
    Sse { connection_string: EnvVar },
    Websocket { connection_string: EnvVar }
}

impl McpConnection {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Stdio { .. } => "stdio",
            Self::Http { .. } => "http",
            Self::Sse { .. } => "sse",
            Self::Websocket { .. } => "websocket"
        }
    }

    #[must_use]
    pub fn connection_string(&self) -> Option<&EnvVar> {
        match self {
            Self::Stdio { .. } => None,
            Self::Http { connection_string }
            | Self::Sse { connection_string }
            | Self::Websocket { connection_string } => Some(connection_string)
        }
    }

    pub fn connection_string_mut(&mut self) -> Option<&mut EnvVar> {
        match self {
            Self::Stdio { .. } => None,
            Self::Http { connection_string }
            | Self::Sse { connection_string }
            | Self::Websocket { connection_string } => Some(connection_string)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpClientConfig {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub connection: McpConnection,
    #[serde(default)]
    pub headers: BTreeMap<String, EnvVar>,
    #[serde(default)]
    pub tools_to_execute: Vec<String>,
    #[serde(default)]
    pub tools_to_auto_execute: Vec<String>,
    #[serde(default)]
    pub tool_pricing: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>
}

impl McpClientConfig {
    /// Structural checks run by the admin layer before a client is admitted.
    pub fn check(&self) -> Result<(), ConfigError> {
        let entity = format!("mcp_client {}", self.name);
        if self.name.is_empty()
            || !self.name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ConfigError::validation(
                entity,
                "name must be non-empty and contain only ASCII letters, digits and underscores"
            ));
        }
        match &self.connection {
            McpConnection::Stdio { stdio_config } if stdio_config.command.trim().is_empty() => {
                return Err(ConfigError::validation(entity, "stdio command must not be empty"));
            }
            McpConnection::Http { connection_string }
            | McpConnection::Sse { connection_string }
            | McpConnection::Websocket { connection_string }
                if connection_string.is_empty() =>
            {
                return Err(ConfigError::validation(
                    entity,
                    "connection_string must not be empty"
                ));
            }
            _ => {}
        }
        let allows_all = self.tools_to_execute.iter().any(|t| t == ALL_TOOLS);
        if !allows_all {
            if let Some(tool) = self
                .tools_to_auto_execute
                .iter()
                .find(|t| t.as_str() != ALL_TOOLS && !self.tools_to_execute.contains(t))
            {
                return Err(ConfigError::validation(
                    entity,
                    format!("auto-executed tool {tool} is not in tools_to_execute")
                ));
            }
        }
        if let Some((tool, _)) = self
            .tool_pricing
            .iter()
            .find(|(_, price)| !price.is_finite() || **price < 0.0)
        {
            return Err(ConfigError::validation(
                entity,
                format!("tool {tool} has an invalid price")
            ));
        }
        Ok(())
    }

    /// Whether `tool` may be executed through this client.
    #[must_use]
    pub fn allows_tool(&self, tool: &str) -> bool {
        self.tools_to_execute.iter().any(|t| t == ALL_TOOLS || t == tool)
    }
}

impl EnvFields for McpClientConfig {
    fn visit_env_fields(&mut self, path: &str, visit: &mut dyn FnMut(&str, &mut EnvVar, Requirement)) {
        if let Some(conn) = self.connection.connection_string_mut() {
            visit(&format!("{path}.connection_string"), conn, Requirement::Required);
        }
        for (name, value) in &mut self.headers {
            visit(&format!("{path}.headers.{name}"), value, Requirement::Optional);
        }
    }
}

impl Redact for McpClientConfig {
    fn redacted(&self) -> Self {
        let mut client = self.clone();
        if let Some(conn) = client.connection.connection_string_mut() {
            *conn = conn.redacted();
        }
        for value in client.headers.values_mut() {
            *value = value.redacted();
        }
        client
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::resolve_env;
    use std::collections::HashMap;

    fn http_client(name: &str) -> McpClientConfig {
        McpClientConfig {
            id: String::new(),
            name: name.to_string(),
            connection: McpConnection::Http {
                connection_string: EnvVar::from_env("MCP_URL")
            },
            headers: [("Authorization".to_string(), EnvVar::from_env("MCP_TOKEN"))].into(),
            tools_to_execute: vec!["search".to_string(), "fetch".to_string()],
            tools_to_auto_execute: vec!["search".to_string()],
            tool_pricing: BTreeMap::new(),
            config_hash: None
        }
    }

    #[test]
    fn test_connection_is_tagged() {
        let json = r#"{"name":"files","connection_type":"stdio","stdio_config":{"command":"npx","args":["-y","server-files"]},"tools_to_execute":["*"]}"#;
        let client: McpClientConfig = serde_json::from_str(json).unwrap();
        assert_eq!(client.connection.kind(), "stdio");
        assert!(client.allows_tool("read_file"));
        assert!(client.check().is_ok());

        let back = serde_json::to_value(&client).unwrap();
        assert_eq!(back["connection_type"], "stdio");
        assert_eq!(back["stdio_config"]["command"], "npx");
    }

    #[test]
    fn test_invalid_name_rejected() {
        assert!(http_client("web-search").check().is_err());
        assert!(http_client("web_search").check().is_ok());
    }

    #[test]
    fn test_auto_execute_must_be_allowed() {
        let mut client = http_client("web");
        client.tools_to_auto_execute = vec!["delete".to_string()];
        assert!(client.check().is_err());
    }

    #[test]
    fn test_missing_connection_string_is_fatal_headers_are_not() {
        let mut client = http_client("web");
        let env: HashMap<String, String> = HashMap::new();
        assert!(resolve_env(&mut client, &env, "mcp.web").is_err());

        let mut client = http_client("web");
        let env: HashMap<String, String> =
            [("MCP_URL".to_string(), "https://mcp.internal/rpc".to_string())].into();
        let warnings = resolve_env(&mut client, &env, "mcp.web").unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].var, "MCP_TOKEN");
    }

    #[test]
    fn test_redaction_covers_connection_and_headers() {
        let mut client = http_client("web");
        client.connection = McpConnection::Sse {
            connection_string: EnvVar::literal("https://mcp.internal/sse?token=abcdef123456")
        };
        let redacted = client.redacted();
        let McpConnection::Sse { connection_string } = &redacted.connection else {
            panic!("transport changed during redaction");
        };
        assert!(crate::redact::is_redacted(&connection_string.reference()));
        assert_eq!(redacted.headers["Authorization"].reference(), "env.MCP_TOKEN");
    }
}
