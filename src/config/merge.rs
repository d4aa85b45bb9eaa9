//! Builds a [`ServerConfig`] from environment variables with YAML overrides.

use std::time::Duration;

use super::env::{env_bool, env_parse, env_var, parse_value};
use super::validation;
use super::yaml::YamlConfig;
use super::{
    ConfigError, DEFAULT_ONPREM_REAP_INTERVAL_SECONDS, DEFAULT_SERVICENOW_TIMEOUT_SECONDS,
    DocumentationSettings, LlmSettings, OnPremSettings, SecretString, ServerConfig,
};
use crate::core::bridge::{BridgeSettings, PreStartPolicy};
use crate::core::llm::LlmProvider;
use crate::core::realtime::{AudioFormat, RealtimeSettings, RealtimeVoice};
use crate::core::tools::{DEFAULT_TOP_K, ServiceNowConfig};

/// YAML value if present, else the environment value.
fn pick<T>(yaml: Option<T>, env: Option<T>) -> Option<T> {
    yaml.or(env)
}

/// Parse a string from YAML, falling back to the env var `key`.
fn pick_parsed<T>(yaml: Option<String>, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match yaml {
        Some(raw) => parse_value(key, raw.trim()).map(Some),
        None => env_parse(key),
    }
}

/// Merge environment variables (base) with optional YAML overrides.
pub fn merge_config(yaml: Option<YamlConfig>) -> Result<ServerConfig, ConfigError> {
    let yaml = yaml.unwrap_or_default();
    let defaults = ServerConfig::default();

    // Server
    let server = yaml.server.unwrap_or_default();
    let host = pick(server.host, env_var("HOST")).unwrap_or(defaults.host);
    let port = match server.port {
        Some(port) => port,
        None => env_parse("PORT")?.unwrap_or(defaults.port),
    };
    let public_host = pick(server.public_host, env_var("PUBLIC_HOST"));
    let tls_yaml = server.tls.unwrap_or_default();
    let tls = validation::validate_tls(
        pick(tls_yaml.cert_path, env_var("TLS_CERT_PATH").map(Into::into)),
        pick(tls_yaml.key_path, env_var("TLS_KEY_PATH").map(Into::into)),
    )?;

    // Realtime AI leg
    let rt = yaml.realtime.unwrap_or_default();
    let openai_api_key =
        pick(rt.api_key, env_var("OPENAI_API_KEY")).map(SecretString::new);
    let rt_defaults = defaults.realtime;
    let realtime = RealtimeSettings {
        url: pick(rt.url, env_var("REALTIME_URL")).unwrap_or(rt_defaults.url),
        model: pick(rt.model, env_var("REALTIME_MODEL")).unwrap_or(rt_defaults.model),
        voice: pick_parsed::<RealtimeVoice>(rt.voice, "REALTIME_VOICE")?
            .unwrap_or(rt_defaults.voice),
        instructions: pick(rt.instructions, env_var("REALTIME_INSTRUCTIONS"))
            .unwrap_or(rt_defaults.instructions),
        audio_format: pick_parsed::<AudioFormat>(rt.audio_format, "REALTIME_AUDIO_FORMAT")?
            .unwrap_or(rt_defaults.audio_format),
        transcribe_input: pick(rt.transcribe_input, env_bool("REALTIME_TRANSCRIBE_INPUT")?)
            .unwrap_or(rt_defaults.transcribe_input),
    };

    // Session bridge
    let bridge_yaml = yaml.bridge.unwrap_or_default();
    let bridge = BridgeSettings {
        prestart_policy: pick_parsed::<PreStartPolicy>(
            bridge_yaml.prestart_audio_policy,
            "PRESTART_AUDIO_POLICY",
        )?
        .unwrap_or(defaults.bridge.prestart_policy),
        prestart_buffer_frames: match bridge_yaml.prestart_buffer_frames {
            Some(frames) => frames,
            None => env_parse("PRESTART_BUFFER_FRAMES")?
                .unwrap_or(defaults.bridge.prestart_buffer_frames),
        },
        respond_after_tool_output: pick(
            rt.respond_after_tool_output,
            env_bool("RESPOND_AFTER_TOOL_OUTPUT")?,
        )
        .unwrap_or(defaults.bridge.respond_after_tool_output),
    };

    // On-prem bridge
    let op = yaml.onprem.unwrap_or_default();
    let onprem = OnPremSettings {
        timeout_ms: pick(op.timeout_ms, env_parse("ONPREM_TIMEOUT_MS")?)
            .unwrap_or(defaults.onprem.timeout_ms),
        orphan_ttl_seconds: pick(
            op.orphan_ttl_seconds,
            env_parse("ONPREM_ORPHAN_TTL_SECONDS")?,
        )
        .unwrap_or(defaults.onprem.orphan_ttl_seconds),
        reap_interval_seconds: pick(
            op.reap_interval_seconds,
            env_parse("ONPREM_REAP_INTERVAL_SECONDS")?,
        )
        .unwrap_or(DEFAULT_ONPREM_REAP_INTERVAL_SECONDS),
        poller_token: pick(op.poller_token, env_var("ONPREM_POLLER_TOKEN"))
            .map(SecretString::new),
    };

    // Ticketing
    let sn = yaml.servicenow.unwrap_or_default();
    let instance_url = pick(sn.instance_url, env_var("SERVICENOW_INSTANCE_URL"));
    let username = pick(sn.username, env_var("SERVICENOW_USERNAME"));
    let password = pick(sn.password, env_var("SERVICENOW_PASSWORD"));
    let servicenow = if validation::validate_servicenow(
        instance_url.as_deref(),
        username.as_deref(),
        password.as_deref(),
    )? {
        let timeout_secs = pick(sn.timeout_seconds, env_parse("SERVICENOW_TIMEOUT_SECONDS")?)
            .unwrap_or(DEFAULT_SERVICENOW_TIMEOUT_SECONDS);
        Some(ServiceNowConfig {
            instance_url: instance_url.unwrap_or_default(),
            username: username.unwrap_or_default(),
            password: SecretString::new(password.unwrap_or_default()),
            assignment_group: pick(
                sn.assignment_group_id,
                env_var("SERVICENOW_ASSIGNMENT_GROUP_ID"),
            ),
            timeout: Duration::from_secs(timeout_secs),
        })
    } else {
        None
    };

    // Documentation search
    let docs = yaml.documentation.unwrap_or_default();
    let documentation = DocumentationSettings {
        search_url: pick(docs.search_url, env_var("DOCUMENTATION_SEARCH_URL")),
        top_k: pick(docs.top_k, env_parse("DOCUMENTATION_TOP_K")?).unwrap_or(DEFAULT_TOP_K),
    };

    // Assistant LLM
    let llm_yaml = yaml.llm.unwrap_or_default();
    let llm = LlmSettings {
        provider: pick_parsed::<LlmProvider>(llm_yaml.provider, "LLM_PROVIDER")?
            .unwrap_or_default(),
        model: pick(llm_yaml.model, env_var("LLM_MODEL")),
        anthropic_api_key: pick(llm_yaml.anthropic_api_key, env_var("ANTHROPIC_API_KEY"))
            .map(SecretString::new),
        base_url: pick(llm_yaml.base_url, env_var("LLM_BASE_URL")),
    };

    let security = yaml.security.unwrap_or_default();
    let cors_allowed_origins = pick(
        security.cors_allowed_origins,
        env_var("CORS_ALLOWED_ORIGINS"),
    );

    Ok(ServerConfig {
        host,
        port,
        tls,
        public_host,
        openai_api_key,
        realtime,
        bridge,
        onprem,
        servicenow,
        documentation,
        llm,
        cors_allowed_origins,
    })
}
