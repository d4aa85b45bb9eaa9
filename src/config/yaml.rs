use serde::Deserialize;
use std::path::PathBuf;

use super::ConfigError;

/// Complete YAML configuration structure
///
/// Every field is optional so a file may set only what it needs. Values
/// present here win over environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 5000
///   public_host: "voice.example.com"
///   tls:
///     cert_path: "/etc/callbridge/cert.pem"
///     key_path: "/etc/callbridge/key.pem"
///
/// realtime:
///   api_key: "sk-..."
///   model: "gpt-4o-realtime-preview"
///   voice: "alloy"
///   audio_format: "g711_ulaw"
///   respond_after_tool_output: true
///
/// onprem:
///   timeout_ms: 10000
///   orphan_ttl_seconds: 60
///   reap_interval_seconds: 30
///   poller_token: "shared-secret"
///
/// bridge:
///   prestart_audio_policy: "buffer"
///   prestart_buffer_frames: 500
///
/// servicenow:
///   instance_url: "https://example.service-now.com"
///   username: "integration"
///   password: "secret"
///   assignment_group_id: "a1b2c3"
///
/// documentation:
///   search_url: "http://docs-search:8000/search"
///   top_k: 3
///
/// llm:
///   provider: "anthropic"
///   model: "claude-sonnet-4-5-20250929"
///   anthropic_api_key: "sk-ant-..."
///
/// security:
///   cors_allowed_origins: "https://ops.example.com"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub realtime: Option<RealtimeYaml>,
    pub onprem: Option<OnPremYaml>,
    pub bridge: Option<BridgeYaml>,
    pub servicenow: Option<ServiceNowYaml>,
    pub documentation: Option<DocumentationYaml>,
    pub llm: Option<LlmYaml>,
    pub security: Option<SecurityYaml>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub public_host: Option<String>,
    pub tls: Option<TlsYaml>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TlsYaml {
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RealtimeYaml {
    pub api_key: Option<String>,
    pub url: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub instructions: Option<String>,
    pub audio_format: Option<String>,
    pub transcribe_input: Option<bool>,
    pub respond_after_tool_output: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct OnPremYaml {
    pub timeout_ms: Option<u64>,
    pub orphan_ttl_seconds: Option<u64>,
    pub reap_interval_seconds: Option<u64>,
    pub poller_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BridgeYaml {
    pub prestart_audio_policy: Option<String>,
    pub prestart_buffer_frames: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServiceNowYaml {
    pub instance_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub assignment_group_id: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DocumentationYaml {
    pub search_url: Option<String>,
    pub top_k: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LlmYaml {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    /// Comma-separated list, or `*`.
    pub cors_allowed_origins: Option<String>,
}

impl YamlConfig {
    /// Load YAML configuration from a file
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;

        let config: YamlConfig = serde_yaml::from_str(&contents)?;

        Ok(config)
    }
}
