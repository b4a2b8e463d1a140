//! Environment configuration for both services.
//!
//! Every option is read from the process environment. `from_lookup` takes an
//! arbitrary lookup function so tests never have to mutate the real
//! environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::provider::helpers::normalize_base_url;

/// Default base URL of the context provider.
pub const DEFAULT_VAULT_URL: &str = "http://localhost:4000";
/// Default listen port of the MCP adapter.
pub const DEFAULT_MCP_PORT: u16 = 5058;
/// Default listen port of the vault-api provider.
pub const DEFAULT_VAULT_PORT: u16 = 4000;
/// Default bound on every request to the provider.
pub const DEFAULT_VAULT_TIMEOUT_MS: u64 = 5000;

/// Errors raised while reading configuration values.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} must be a boolean (true/false/1/0/yes/no/on/off), got {value:?}")]
    InvalidBool { key: &'static str, value: String },

    #[error("{key} must be a non-negative integer, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },

    #[error("{key} must not be empty")]
    Empty { key: &'static str },
}

/// Configuration of the MCP adapter (`mcp_vault` binary).
#[derive(Debug, Clone)]
pub struct Config {
    /// Provider base URL, trailing slashes stripped
    pub vault_url: String,
    /// Port to listen on
    pub port: u16,
    /// Include the raw document as a second content item of `getContext`
    pub include_raw_json: bool,
    /// Log every outgoing protocol message
    pub log_messages: bool,
    /// Log every HTTP request line
    pub log_http: bool,
    /// Answer streaming-transport POSTs with JSON instead of an event stream
    pub json_response: bool,
    /// Upper bound on a single provider request
    pub vault_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vault_url: DEFAULT_VAULT_URL.to_string(),
            port: DEFAULT_MCP_PORT,
            include_raw_json: false,
            log_messages: false,
            log_http: false,
            json_response: false,
            vault_timeout: Duration::from_millis(DEFAULT_VAULT_TIMEOUT_MS),
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let vault_url = match lookup("VAULT_URL") {
            Some(raw) => {
                let url = normalize_base_url(&raw);
                if url.is_empty() {
                    return Err(ConfigError::Empty { key: "VAULT_URL" });
                }
                url
            }
            None => defaults.vault_url,
        };

        Ok(Self {
            vault_url,
            port: parse_number(&lookup, "MCP_PORT")?.unwrap_or(defaults.port),
            include_raw_json: parse_bool(&lookup, "MCP_INCLUDE_JSON")?
                .unwrap_or(defaults.include_raw_json),
            log_messages: parse_bool(&lookup, "MCP_LOG_MESSAGES")?
                .unwrap_or(defaults.log_messages),
            log_http: parse_bool(&lookup, "MCP_LOG_HTTP")?.unwrap_or(defaults.log_http),
            json_response: parse_bool(&lookup, "MCP_JSON_RESPONSE")?
                .unwrap_or(defaults.json_response),
            vault_timeout: parse_number::<u64, _>(&lookup, "VAULT_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.vault_timeout),
        })
    }
}

/// Configuration of the data provider (`vault_api` binary).
#[derive(Debug, Clone)]
pub struct VaultConfig {
    pub port: u16,
    /// JSON file served instead of the built-in sample document
    pub context_file: Option<PathBuf>,
    pub log_http: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_VAULT_PORT,
            context_file: None,
            log_http: false,
        }
    }
}

impl VaultConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            port: parse_number(&lookup, "PORT")?.unwrap_or(DEFAULT_VAULT_PORT),
            context_file: lookup("VAULT_CONTEXT_FILE")
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from),
            log_http: parse_bool(&lookup, "VAULT_LOG_HTTP")?.unwrap_or(false),
        })
    }
}

fn parse_bool<F>(lookup: &F, key: &'static str) -> Result<Option<bool>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" | "" => Ok(Some(false)),
        _ => Err(ConfigError::InvalidBool { key, value: raw }),
    }
}

fn parse_number<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { key, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.vault_url, "http://localhost:4000");
        assert_eq!(config.port, 5058);
        assert!(!config.include_raw_json);
        assert!(!config.json_response);
        assert_eq!(config.vault_timeout, Duration::from_millis(5000));
    }

    #[test]
    fn overrides_are_applied_and_url_is_normalized() {
        let config = Config::from_lookup(lookup_from(&[
            ("VAULT_URL", "http://vault.internal:9000//"),
            ("MCP_PORT", "6000"),
            ("MCP_INCLUDE_JSON", "true"),
            ("MCP_LOG_MESSAGES", "1"),
            ("MCP_LOG_HTTP", "yes"),
            ("MCP_JSON_RESPONSE", "ON"),
            ("VAULT_TIMEOUT_MS", "250"),
        ]))
        .unwrap();

        assert_eq!(config.vault_url, "http://vault.internal:9000");
        assert_eq!(config.port, 6000);
        assert!(config.include_raw_json);
        assert!(config.log_messages);
        assert!(config.log_http);
        assert!(config.json_response);
        assert_eq!(config.vault_timeout, Duration::from_millis(250));
    }

    #[test]
    fn rejects_malformed_values() {
        let err = Config::from_lookup(lookup_from(&[("MCP_JSON_RESPONSE", "maybe")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBool { key: "MCP_JSON_RESPONSE", .. }));

        let err = Config::from_lookup(lookup_from(&[("MCP_PORT", "http")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { key: "MCP_PORT", .. }));

        let err = Config::from_lookup(lookup_from(&[("VAULT_URL", "///")])).unwrap_err();
        assert!(matches!(err, ConfigError::Empty { key: "VAULT_URL" }));
    }

    #[test]
    fn vault_config_reads_port_and_file() {
        let config = VaultConfig::from_lookup(lookup_from(&[
            ("PORT", "4100"),
            ("VAULT_CONTEXT_FILE", "/tmp/context.json"),
        ]))
        .unwrap();
        assert_eq!(config.port, 4100);
        assert_eq!(config.context_file, Some(PathBuf::from("/tmp/context.json")));
    }
}
