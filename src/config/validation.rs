use std::path::PathBuf;

use super::{ConfigError, ServerConfig, TlsConfig};

/// Certificate and key must be configured together.
pub(crate) fn validate_tls(
    cert_path: Option<PathBuf>,
    key_path: Option<PathBuf>,
) -> Result<Option<TlsConfig>, ConfigError> {
    match (cert_path, key_path) {
        (Some(cert_path), Some(key_path)) => Ok(Some(TlsConfig {
            cert_path,
            key_path,
        })),
        (None, None) => Ok(None),
        (Some(_), None) => Err(ConfigError::Validation(
            "TLS_CERT_PATH is set but TLS_KEY_PATH is missing".to_string(),
        )),
        (None, Some(_)) => Err(ConfigError::Validation(
            "TLS_KEY_PATH is set but TLS_CERT_PATH is missing".to_string(),
        )),
    }
}

/// Partial ServiceNow settings are a mistake, not a way to disable it.
pub(crate) fn validate_servicenow(
    instance_url: Option<&str>,
    username: Option<&str>,
    password: Option<&str>,
) -> Result<bool, ConfigError> {
    match (instance_url, username, password) {
        (None, None, None) => Ok(false),
        (Some(url), Some(_), Some(_)) => {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Validation(format!(
                    "SERVICENOW_INSTANCE_URL must be an http(s) URL, got '{url}'"
                )));
            }
            Ok(true)
        }
        _ => Err(ConfigError::Validation(
            "ServiceNow requires SERVICENOW_INSTANCE_URL, SERVICENOW_USERNAME and SERVICENOW_PASSWORD"
                .to_string(),
        )),
    }
}

/// Checks on the merged configuration.
pub(crate) fn validate_server_config(config: &ServerConfig) -> Result<(), ConfigError> {
    if config.onprem.timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "onprem timeout must be greater than zero".to_string(),
        ));
    }
    if config.onprem.reap_interval_seconds == 0 {
        return Err(ConfigError::Validation(
            "onprem reap interval must be greater than zero".to_string(),
        ));
    }
    if config.bridge.prestart_buffer_frames == 0 {
        return Err(ConfigError::Validation(
            "prestart buffer frames must be greater than zero".to_string(),
        ));
    }
    if config.documentation.top_k == 0 {
        return Err(ConfigError::Validation(
            "documentation top_k must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_tls_pairs() {
        assert!(validate_tls(None, None).unwrap().is_none());
        assert!(
            validate_tls(Some("c.pem".into()), Some("k.pem".into()))
                .unwrap()
                .is_some()
        );
        let err = validate_tls(Some("c.pem".into()), None).unwrap_err();
        assert!(err.to_string().contains("TLS_KEY_PATH"));
    }

    #[test]
    fn test_validate_servicenow() {
        assert!(!validate_servicenow(None, None, None).unwrap());
        assert!(validate_servicenow(Some("https://x.service-now.com"), Some("u"), Some("p")).unwrap());
        assert!(validate_servicenow(Some("https://x.service-now.com"), None, Some("p")).is_err());
        assert!(validate_servicenow(Some("x.service-now.com"), Some("u"), Some("p")).is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = ServerConfig::default();
        assert!(validate_server_config(&config).is_ok());

        config.onprem.timeout_ms = 0;
        assert!(validate_server_config(&config).is_err());
    }

    #[test]
    fn test_zero_buffer_rejected() {
        let mut config = ServerConfig::default();
        config.bridge.prestart_buffer_frames = 0;
        let err = validate_server_config(&config).unwrap_err();
        assert!(err.to_string().contains("prestart buffer"));
    }
}
