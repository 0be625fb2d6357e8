//! Configuration management

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Lower bound for relay request timeouts.
pub const MIN_REQUEST_TIMEOUT_MS: u64 = 5_000;
/// Upper bound for relay request timeouts.
pub const MAX_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Capped exponential backoff for key publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 250,
            max_delay_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

/// Client-side configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub relay_url: String,
    pub request_timeout_ms: u64,
    pub publish_retry: RetryPolicy,
    pub storage_service: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            relay_url: "http://127.0.0.1:8088".to_string(),
            request_timeout_ms: 8_000,
            publish_retry: RetryPolicy::default(),
            storage_service: "hush.device-identity".to_string(),
        }
    }
}

impl CoreConfig {
    /// Load configuration from environment variables and TOML file
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Same as [`load`](Self::load) with a custom variable lookup.
    pub fn load_with(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(url) = var("HUSH_RELAY_URL") {
            config.relay_url = url;
        }

        if let Some(ms) = var("HUSH_REQUEST_TIMEOUT_MS") {
            config.request_timeout_ms = ms
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("Invalid request_timeout_ms: {}", e)))?;
        }

        if let Some(n) = var("HUSH_PUBLISH_MAX_ATTEMPTS") {
            config.publish_retry.max_attempts = n
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("Invalid max_attempts: {}", e)))?;
        }

        if let Some(service) = var("HUSH_STORAGE_SERVICE") {
            config.storage_service = service;
        }

        if let Some(path) = var("HUSH_CONFIG") {
            config.load_from_toml(&path)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Overlay values present in a TOML file
    fn load_from_toml(&mut self, path: &str) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let file: toml::Value = toml::from_str(&content)?;

        if let Some(url) = file.get("relay_url").and_then(|v| v.as_str()) {
            self.relay_url = url.to_string();
        }

        if let Some(ms) = file.get("request_timeout_ms").and_then(|v| v.as_integer()) {
            self.request_timeout_ms = u64::try_from(ms)
                .map_err(|_| ConfigError::Invalid("request_timeout_ms must be positive".into()))?;
        }

        if let Some(service) = file.get("storage_service").and_then(|v| v.as_str()) {
            self.storage_service = service.to_string();
        }

        if let Some(retry) = file.get("publish_retry") {
            self.publish_retry = retry.clone().try_into()?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.relay_url.is_empty() {
            return Err(ConfigError::Invalid("relay_url must not be empty".to_string()));
        }

        if !(MIN_REQUEST_TIMEOUT_MS..=MAX_REQUEST_TIMEOUT_MS).contains(&self.request_timeout_ms) {
            return Err(ConfigError::Invalid(format!(
                "request_timeout_ms must be between {} and {}",
                MIN_REQUEST_TIMEOUT_MS, MAX_REQUEST_TIMEOUT_MS
            )));
        }

        if self.publish_retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("publish_retry.max_attempts must be > 0".to_string()));
        }

        if self.publish_retry.base_delay_ms > self.publish_retry.max_delay_ms {
            return Err(ConfigError::Invalid(
                "publish_retry.base_delay_ms must not exceed max_delay_ms".to_string(),
            ));
        }

        if self.storage_service.is_empty() {
            return Err(ConfigError::Invalid("storage_service must not be empty".to_string()));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = CoreConfig::load_with(lookup(&[])).unwrap();
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.request_timeout(), Duration::from_secs(8));
    }

    #[test]
    fn test_env_overrides() {
        let config = CoreConfig::load_with(lookup(&[
            ("HUSH_RELAY_URL", "https://relay.example"),
            ("HUSH_REQUEST_TIMEOUT_MS", "6000"),
            ("HUSH_PUBLISH_MAX_ATTEMPTS", "3"),
        ]))
        .unwrap();
        assert_eq!(config.relay_url, "https://relay.example");
        assert_eq!(config.request_timeout_ms, 6000);
        assert_eq!(config.publish_retry.max_attempts, 3);
    }

    #[test]
    fn test_timeout_out_of_range_rejected() {
        let err = CoreConfig::load_with(lookup(&[("HUSH_REQUEST_TIMEOUT_MS", "60000")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_toml_file_overrides_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "relay_url = \"https://file.example\"\nrequest_timeout_ms = 9000\n\n[publish_retry]\nmax_attempts = 2\nbase_delay_ms = 100\nmax_delay_ms = 400"
        )
        .unwrap();
        let path = file.path().to_string_lossy().to_string();
        let config = CoreConfig::load_with(lookup(&[
            ("HUSH_RELAY_URL", "https://env.example"),
            ("HUSH_CONFIG", path.as_str()),
        ]))
        .unwrap();
        assert_eq!(config.relay_url, "https://file.example");
        assert_eq!(config.request_timeout_ms, 9000);
        assert_eq!(
            config.publish_retry,
            RetryPolicy { max_attempts: 2, base_delay_ms: 100, max_delay_ms: 400 }
        );
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(250));
        assert_eq!(policy.delay_for(2), Duration::from_millis(500));
        assert_eq!(policy.delay_for(3), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(10), Duration::from_millis(8000));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(8000));
    }
}
