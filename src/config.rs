//! Client configuration loaded from environment variables.
//!
//! `from_env` loads a `.env` file when present and then reads the process
//! environment. `from_lookup` is the same parser over any key lookup.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_SESSION_FILE: &str = "ourroots.session.json";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_RETRIES: usize = 3;

/// Which identity provider adapter to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Auth0,
    Cognito,
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auth0" => Ok(Self::Auth0),
            "cognito" => Ok(Self::Cognito),
            _ => Err("expected `auth0` or `cognito`".to_string()),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Auth0 => write!(f, "auth0"),
            ProviderKind::Cognito => write!(f, "cognito"),
        }
    }
}

/// Where the session blob and refresh flag are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Persisted to a JSON file, survives restarts
    #[default]
    Local,
    /// Held in memory for the life of the process
    Session,
}

impl FromStr for StorageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "session" => Ok(Self::Session),
            _ => Err("expected `local` or `session`".to_string()),
        }
    }
}

/// Full client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    pub provider: ProviderKind,
    /// Issuer / authority base URL
    pub auth_domain: String,
    /// Base URL for the authorize, token, userinfo and logout endpoints
    pub auth_endpoint_domain: String,
    pub client_id: String,
    pub redirect_url: String,
    pub post_logout_redirect_url: String,
    /// Backend REST base URL, without a trailing slash
    pub api_base_url: String,
    #[serde(default)]
    pub session_storage: StorageKind,
    #[serde(default = "default_session_file")]
    pub session_file: PathBuf,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

fn default_session_file() -> PathBuf {
    PathBuf::from(DEFAULT_SESSION_FILE)
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_max_retries() -> usize {
    DEFAULT_MAX_RETRIES
}

impl AuthConfig {
    /// Load configuration from the environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Parse configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let provider = parse_var(&get, "OURROOTS_AUTH_PROVIDER")?
            .ok_or(ConfigError::Missing("OURROOTS_AUTH_PROVIDER"))?;

        // The public search client derives its API from the admin domain
        let api_base_url = match get("OURROOTS_ADMIN_DOMAIN") {
            Some(admin_domain) => api_base_from_admin_domain(&admin_domain),
            None => required("OURROOTS_API_BASE_URL")?
                .trim_end_matches('/')
                .to_string(),
        };

        Ok(Self {
            provider,
            auth_domain: required("OURROOTS_AUTH_DOMAIN")?,
            auth_endpoint_domain: required("OURROOTS_AUTH_ENDPOINT_DOMAIN")?,
            client_id: required("OURROOTS_AUTH_CLIENT_ID")?,
            redirect_url: required("OURROOTS_AUTH_REDIRECT_URL")?,
            post_logout_redirect_url: required("OURROOTS_AUTH_POST_LOGOUT_REDIRECT_URL")?,
            api_base_url,
            session_storage: parse_var(&get, "OURROOTS_SESSION_STORAGE")?.unwrap_or_default(),
            session_file: get("OURROOTS_SESSION_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(default_session_file),
            request_timeout_secs: parse_var(&get, "OURROOTS_REQUEST_TIMEOUT_SECS")?
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
            max_retries: parse_var(&get, "OURROOTS_MAX_RETRIES")?.unwrap_or(DEFAULT_MAX_RETRIES),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// `https://admin.example.org/` becomes `https://admin.example.org/api`
pub fn api_base_from_admin_domain(admin_domain: &str) -> String {
    format!("{}/api", admin_domain.trim_end_matches('/'))
}

fn parse_var<T, G>(get: &G, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(None),
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Invalid {
                key,
                value,
                reason: e.to_string(),
            }),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Configuration used by unit tests across the crate
    pub(crate) fn sample_config(provider: ProviderKind) -> AuthConfig {
        AuthConfig {
            provider,
            auth_domain: "https://ourroots.auth.example".to_string(),
            auth_endpoint_domain: "https://login.ourroots.example".to_string(),
            client_id: "client-123".to_string(),
            redirect_url: "http://localhost:8080/callback".to_string(),
            post_logout_redirect_url: "http://localhost:8080/".to_string(),
            api_base_url: "http://localhost:3000".to_string(),
            session_storage: StorageKind::Session,
            session_file: default_session_file(),
            request_timeout_secs: 5,
            max_retries: 3,
        }
    }

    fn base_vars() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("OURROOTS_AUTH_PROVIDER", "auth0"),
            ("OURROOTS_AUTH_DOMAIN", "https://ourroots.auth0.com"),
            ("OURROOTS_AUTH_ENDPOINT_DOMAIN", "https://login.ourroots.org"),
            ("OURROOTS_AUTH_CLIENT_ID", "client-123"),
            ("OURROOTS_AUTH_REDIRECT_URL", "http://localhost:8080/callback"),
            ("OURROOTS_AUTH_POST_LOGOUT_REDIRECT_URL", "http://localhost:8080/"),
            ("OURROOTS_API_BASE_URL", "http://localhost:3000/"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<AuthConfig, ConfigError> {
        AuthConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn test_defaults_applied() {
        let config = load(&base_vars()).unwrap();
        assert_eq!(config.provider, ProviderKind::Auth0);
        assert_eq!(config.api_base_url, "http://localhost:3000");
        assert_eq!(config.session_storage, StorageKind::Local);
        assert_eq!(config.session_file, PathBuf::from("ourroots.session.json"));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_admin_domain_overrides_api_base() {
        let mut vars = base_vars();
        vars.remove("OURROOTS_API_BASE_URL");
        vars.insert("OURROOTS_ADMIN_DOMAIN", "https://admin.ourroots.org/");
        let config = load(&vars).unwrap();
        assert_eq!(config.api_base_url, "https://admin.ourroots.org/api");
    }

    #[test]
    fn test_missing_and_invalid_values() {
        let mut vars = base_vars();
        vars.remove("OURROOTS_AUTH_CLIENT_ID");
        assert!(matches!(
            load(&vars),
            Err(ConfigError::Missing("OURROOTS_AUTH_CLIENT_ID"))
        ));

        let mut vars = base_vars();
        vars.insert("OURROOTS_AUTH_PROVIDER", "okta");
        match load(&vars) {
            Err(ConfigError::Invalid { key, value, .. }) => {
                assert_eq!(key, "OURROOTS_AUTH_PROVIDER");
                assert_eq!(value, "okta");
            }
            other => panic!("expected invalid provider, got {:?}", other),
        }

        let mut vars = base_vars();
        vars.insert("OURROOTS_MAX_RETRIES", "lots");
        assert!(matches!(load(&vars), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_session_storage_kind() {
        let mut vars = base_vars();
        vars.insert("OURROOTS_SESSION_STORAGE", "Session");
        vars.insert("OURROOTS_AUTH_PROVIDER", "cognito");
        let config = load(&vars).unwrap();
        assert_eq!(config.session_storage, StorageKind::Session);
        assert_eq!(config.provider, ProviderKind::Cognito);
    }
}
