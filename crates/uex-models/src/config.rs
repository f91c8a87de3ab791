use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level configuration shared by the loader daemon and the tool engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct UexConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub blacklist: BlacklistConfig,
    #[serde(default)]
    pub routes: RouteConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
}

impl UexConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|source| ConfigError::Read {
            path: path.as_ref().display().to_string(),
            source,
        })?;
        Ok(Self::from_toml_str(&raw)?)
    }
}

/// Failure to read or parse a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// Path to the SQLite store file.
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sqlite_path: default_sqlite_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable holding the API bearer secret.
    #[serde(default = "default_secret_env")]
    pub secret_env: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            secret_env: default_secret_env(),
            timeout_seconds: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImportConfig {
    /// Seconds between staleness checks of the import daemon.
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,
    #[serde(default = "default_short_lifetime")]
    pub short_lifetime_seconds: u64,
    #[serde(default = "default_mid_lifetime")]
    pub mid_lifetime_seconds: u64,
    #[serde(default = "default_long_lifetime")]
    pub long_lifetime_seconds: u64,
    /// Version of this engine; a change rebuilds the store.
    #[serde(default = "default_plugin_version")]
    pub plugin_version: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            check_interval_seconds: default_check_interval(),
            short_lifetime_seconds: default_short_lifetime(),
            mid_lifetime_seconds: default_mid_lifetime(),
            long_lifetime_seconds: default_long_lifetime(),
            plugin_version: default_plugin_version(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlacklistConfig {
    /// Directory holding the human-editable blacklist files.
    #[serde(default = "default_blacklist_dir")]
    pub directory: String,
}

impl Default for BlacklistConfig {
    fn default() -> Self {
        Self {
            directory: default_blacklist_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteConfig {
    /// Routes returned when the caller does not ask for a count.
    #[serde(default = "default_route_count")]
    pub default_count: u32,
    /// Upper bound on routes returned in one response.
    #[serde(default = "default_route_max")]
    pub max_count: u32,
    /// Include distance, margin and terminal services in results.
    #[serde(default)]
    pub advanced_info: bool,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            default_count: default_route_count(),
            max_count: default_route_max(),
            advanced_info: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationConfig {
    /// Minimum similarity (0..1) for an approximate match to be accepted.
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,
    /// Maximum alternatives surfaced on a failed match.
    #[serde(default = "default_max_suggestions")]
    pub max_suggestions: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            match_threshold: default_match_threshold(),
            max_suggestions: default_max_suggestions(),
        }
    }
}

fn default_sqlite_path() -> String {
    "data/uex_cache.db".to_string()
}
fn default_base_url() -> String {
    "https://api.uexcorp.space/2.0".to_string()
}
fn default_secret_env() -> String {
    "UEX_API_KEY".to_string()
}
fn default_timeout() -> u64 {
    30
}
fn default_user_agent() -> String {
    concat!("uex/", env!("CARGO_PKG_VERSION")).to_string()
}
fn default_check_interval() -> u64 {
    300
}
fn default_short_lifetime() -> u64 {
    3600
}
fn default_mid_lifetime() -> u64 {
    86_400
}
fn default_long_lifetime() -> u64 {
    1_209_600
}
fn default_plugin_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
fn default_blacklist_dir() -> String {
    "data".to_string()
}
fn default_route_count() -> u32 {
    3
}
fn default_route_max() -> u32 {
    10
}
fn default_match_threshold() -> f64 {
    0.75
}
fn default_max_suggestions() -> usize {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_example_config() {
        let toml_str = r#"
[store]
sqlite_path = "/tmp/uex.db"

[api]
base_url = "http://localhost:8080"
secret_env = "MY_SECRET"

[import]
check_interval_seconds = 60
short_lifetime_seconds = 600

[blacklist]
directory = "/tmp/blacklists"

[routes]
default_count = 5
max_count = 8
advanced_info = true

[validation]
match_threshold = 0.8
"#;
        let config = UexConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.store.sqlite_path, "/tmp/uex.db");
        assert_eq!(config.api.secret_env, "MY_SECRET");
        assert_eq!(config.api.timeout_seconds, 30);
        assert_eq!(config.import.check_interval_seconds, 60);
        assert_eq!(config.import.short_lifetime_seconds, 600);
        assert_eq!(config.import.long_lifetime_seconds, 1_209_600);
        assert_eq!(config.routes.max_count, 8);
        assert!(config.routes.advanced_info);
        assert_eq!(config.validation.max_suggestions, 10);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = UexConfig::from_toml_str("").unwrap();
        assert_eq!(config, UexConfig::default());
        assert_eq!(config.routes.default_count, 3);
        assert_eq!(config.import.plugin_version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn roundtrip_config() {
        let config = UexConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed = UexConfig::from_toml_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn load_missing_file_fails() {
        let result = UexConfig::load("/nonexistent/uex.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
