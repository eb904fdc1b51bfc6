use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_STORAGE_PATH: &str = "ideas-client.db";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Client settings, read from `IDEAS_*` environment variables.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub storage_path: PathBuf,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            storage_path: PathBuf::from(DEFAULT_STORAGE_PATH),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_url = lookup("IDEAS_API_URL").unwrap_or_else(|| DEFAULT_API_URL.into());
        let storage_path = lookup("IDEAS_STORAGE_PATH").unwrap_or_else(|| DEFAULT_STORAGE_PATH.into());
        let timeout_secs: u64 = match lookup("IDEAS_REQUEST_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("IDEAS_REQUEST_TIMEOUT_SECS must be a whole number of seconds, got '{raw}'"))?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            storage_path: PathBuf::from(storage_path),
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()
            .context("failed to build HTTP client")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = ClientConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.storage_path, PathBuf::from(DEFAULT_STORAGE_PATH));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn overrides_are_read_and_trailing_slash_dropped() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("IDEAS_API_URL", "https://ideas.example.com/"),
            ("IDEAS_STORAGE_PATH", "/tmp/ideas.db"),
            ("IDEAS_REQUEST_TIMEOUT_SECS", "3"),
        ]))
        .unwrap();
        assert_eq!(config.api_url, "https://ideas.example.com");
        assert_eq!(config.storage_path, PathBuf::from("/tmp/ideas.db"));
        assert_eq!(config.request_timeout, Duration::from_secs(3));
    }

    #[test]
    fn bad_timeout_is_rejected() {
        let err = ClientConfig::from_lookup(lookup_from(&[("IDEAS_REQUEST_TIMEOUT_SECS", "soon")]));
        assert!(err.is_err());
    }
}
