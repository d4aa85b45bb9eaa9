//! Environment variable readers.
//!
//! Blank values count as unset.

use std::env;
use std::fmt::Display;
use std::str::FromStr;

use super::ConfigError;

/// Raw value of `key`, trimmed.
pub(crate) fn env_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse `key` with `FromStr`.
pub(crate) fn env_parse<T>(key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    env_var(key)
        .map(|raw| parse_value(key, &raw))
        .transpose()
}

/// Accepts `true/false`, `1/0`, `yes/no`, `on/off`.
pub(crate) fn env_bool(key: &'static str) -> Result<Option<bool>, ConfigError> {
    env_var(key).map(|raw| parse_bool(key, &raw)).transpose()
}

pub(crate) fn parse_value<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
        key,
        message: format!("'{raw}': {e}"),
    })
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            message: format!("'{raw}' is not a boolean"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_env_var_blank_is_unset() {
        unsafe {
            env::set_var("CALLBRIDGE_TEST_BLANK", "   ");
        }
        assert_eq!(env_var("CALLBRIDGE_TEST_BLANK"), None);
        unsafe {
            env::remove_var("CALLBRIDGE_TEST_BLANK");
        }
    }

    #[test]
    #[serial]
    fn test_env_parse_reports_key() {
        unsafe {
            env::set_var("CALLBRIDGE_TEST_NUM", "ten");
        }
        let err = env_parse::<u64>("CALLBRIDGE_TEST_NUM").unwrap_err();
        assert!(err.to_string().contains("CALLBRIDGE_TEST_NUM"));
        unsafe {
            env::remove_var("CALLBRIDGE_TEST_NUM");
        }
    }

    #[test]
    fn test_parse_bool_variants() {
        assert!(parse_bool("K", "Yes").unwrap());
        assert!(!parse_bool("K", "0").unwrap());
        assert!(parse_bool("K", "maybe").is_err());
    }
}
