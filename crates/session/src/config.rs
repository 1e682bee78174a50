//! Session client configuration (environment-driven, with dev defaults).

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_API_URL: &str = "http://localhost:8080";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Paths of the authentication endpoints, relative to the API base URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthEndpoints {
    pub login: String,
    pub validate: String,
    pub refresh: String,
    pub change_password: String,
}

impl Default for AuthEndpoints {
    fn default() -> Self {
        Self {
            login: "/auth/login".to_string(),
            validate: "/auth/validate".to_string(),
            refresh: "/auth/refresh".to_string(),
            change_password: "/auth/change-password".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub api_url: String,
    pub request_timeout_secs: u64,
    /// SQLite file for the durable credential store; in-memory when unset.
    pub session_db: Option<PathBuf>,
    pub endpoints: AuthEndpoints,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            session_db: None,
            endpoints: AuthEndpoints::default(),
        }
    }
}

impl SessionConfig {
    /// Build from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (env-style keys).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("RISKDESK_API_URL") {
            let url = url.trim().trim_end_matches('/').to_string();
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Invalid {
                    key: "RISKDESK_API_URL",
                    message: format!("expected an http(s) URL, got '{url}'"),
                });
            }
            config.api_url = url;
        }

        if let Some(raw) = lookup("RISKDESK_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|e| ConfigError::Invalid {
                key: "RISKDESK_REQUEST_TIMEOUT_SECS",
                message: format!("{e}"),
            })?;
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    key: "RISKDESK_REQUEST_TIMEOUT_SECS",
                    message: "must be greater than zero".to_string(),
                });
            }
            config.request_timeout_secs = secs;
        }

        if let Some(path) = lookup("RISKDESK_SESSION_DB").filter(|p| !p.trim().is_empty()) {
            config.session_db = Some(PathBuf::from(path));
        }

        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = SessionConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn reads_overrides() {
        let config = SessionConfig::from_lookup(lookup(&[
            ("RISKDESK_API_URL", "https://risk.example.com/api/"),
            ("RISKDESK_REQUEST_TIMEOUT_SECS", "5"),
            ("RISKDESK_SESSION_DB", "/var/lib/riskdesk/session.db"),
        ]))
        .unwrap();

        assert_eq!(config.api_url, "https://risk.example.com/api");
        assert_eq!(config.request_timeout_secs, 5);
        assert_eq!(
            config.session_db,
            Some(PathBuf::from("/var/lib/riskdesk/session.db"))
        );
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            SessionConfig::from_lookup(lookup(&[("RISKDESK_API_URL", "localhost:8080")])),
            Err(ConfigError::Invalid { key: "RISKDESK_API_URL", .. })
        ));
        assert!(matches!(
            SessionConfig::from_lookup(lookup(&[("RISKDESK_REQUEST_TIMEOUT_SECS", "0")])),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            SessionConfig::from_lookup(lookup(&[("RISKDESK_REQUEST_TIMEOUT_SECS", "soon")])),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
