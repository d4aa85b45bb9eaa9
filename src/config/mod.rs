//! Configuration module for the callbridge server
//!
//! Configuration comes from .env files, environment variables and an optional
//! YAML file. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable readers
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//! - `secret`: Zeroizing credential strings
//!
//! # Example
//! ```rust,no_run
//! use callbridge::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable base
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

mod env;
mod merge;
mod secret;
mod validation;
mod yaml;

pub use secret::SecretString;
pub use yaml::YamlConfig;

use crate::core::bridge::BridgeSettings;
use crate::core::llm::{LlmConfig, LlmProvider};
use crate::core::onprem::{DEFAULT_ONPREM_TIMEOUT, DEFAULT_ORPHAN_TTL, OnPremConfig};
use crate::core::realtime::RealtimeSettings;
use crate::core::tools::{DEFAULT_TOP_K, ServiceNowConfig};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_ONPREM_REAP_INTERVAL_SECONDS: u64 = 30;
pub const DEFAULT_SERVICENOW_TIMEOUT_SECONDS: u64 = 15;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse YAML config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// On-prem RPC settings.
#[derive(Debug, Clone)]
pub struct OnPremSettings {
    pub timeout_ms: u64,
    pub orphan_ttl_seconds: u64,
    pub reap_interval_seconds: u64,
    /// When set, `/poll` and `/submit_response` require this bearer token.
    pub poller_token: Option<SecretString>,
}

impl Default for OnPremSettings {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_ONPREM_TIMEOUT.as_millis() as u64,
            orphan_ttl_seconds: DEFAULT_ORPHAN_TTL.as_secs(),
            reap_interval_seconds: DEFAULT_ONPREM_REAP_INTERVAL_SECONDS,
            poller_token: None,
        }
    }
}

impl OnPremSettings {
    pub fn bridge_config(&self) -> OnPremConfig {
        OnPremConfig {
            timeout: Duration::from_millis(self.timeout_ms),
            orphan_ttl: Duration::from_secs(self.orphan_ttl_seconds),
        }
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_seconds)
    }
}

#[derive(Debug, Clone)]
pub struct DocumentationSettings {
    /// Search endpoint. Documentation tools are disabled when unset.
    pub search_url: Option<String>,
    pub top_k: usize,
}

impl Default for DocumentationSettings {
    fn default() -> Self {
        Self {
            search_url: None,
            top_k: DEFAULT_TOP_K,
        }
    }
}

/// Assistant LLM selection.
#[derive(Debug, Clone, Default)]
pub struct LlmSettings {
    pub provider: LlmProvider,
    pub model: Option<String>,
    pub anthropic_api_key: Option<SecretString>,
    pub base_url: Option<String>,
}

impl LlmSettings {
    /// Client settings for the selected provider, if its key is configured.
    ///
    /// The OpenAI provider shares the realtime API key.
    pub fn llm_config(&self, openai_api_key: Option<&SecretString>) -> Option<LlmConfig> {
        let api_key = match self.provider {
            LlmProvider::OpenAi => openai_api_key.cloned(),
            LlmProvider::Anthropic => self.anthropic_api_key.clone(),
        }?;
        Some(LlmConfig {
            provider: self.provider,
            api_key,
            model: self.model.clone(),
            base_url: self.base_url.clone(),
        })
    }
}

/// Server configuration
///
/// Everything needed to run the bridge: listener and TLS, the realtime AI
/// leg, the on-prem RPC queue, tool backends and CORS.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    /// Host used in the TwiML stream URL. Falls back to the request's Host header.
    pub public_host: Option<String>,

    /// Realtime AI credentials. Calls cannot be bridged without it.
    pub openai_api_key: Option<SecretString>,
    pub realtime: RealtimeSettings,
    pub bridge: BridgeSettings,

    pub onprem: OnPremSettings,

    // Tool backends
    pub servicenow: Option<ServiceNowConfig>,
    pub documentation: DocumentationSettings,
    pub llm: LlmSettings,

    // Security settings
    pub cors_allowed_origins: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            tls: None,
            public_host: None,
            openai_api_key: None,
            realtime: RealtimeSettings::default(),
            bridge: BridgeSettings::default(),
            onprem: OnPremSettings::default(),
            servicenow: None,
            documentation: DocumentationSettings::default(),
            llm: LlmSettings::default(),
            cors_allowed_origins: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables only
    ///
    /// Missing values fall back to defaults. The .env file, if any, is loaded
    /// into the environment by `main` before this runs.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = merge::merge_config(None)?;
        validation::validate_server_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;

        // Environment is the base, YAML overrides it.
        let config = merge::merge_config(Some(yaml_config))?;

        validation::validate_server_config(&config)?;

        Ok(config)
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    pub fn has_poller_auth(&self) -> bool {
        self.onprem.poller_token.is_some()
    }

    /// Assistant LLM settings, if the selected provider has a key.
    pub fn llm_config(&self) -> Option<LlmConfig> {
        self.llm.llm_config(self.openai_api_key.as_ref())
    }

    /// Chat channel settings. Chat always runs on Anthropic, so it needs
    /// `ANTHROPIC_API_KEY`; model and base URL are shared only when the
    /// assistant provider is Anthropic too.
    pub fn chat_config(&self) -> Option<LlmConfig> {
        let api_key = self.llm.anthropic_api_key.clone()?;
        let shared = self.llm.provider == LlmProvider::Anthropic;
        Some(LlmConfig {
            provider: LlmProvider::Anthropic,
            api_key,
            model: self.llm.model.clone().filter(|_| shared),
            base_url: self.llm.base_url.clone().filter(|_| shared),
        })
    }
}
