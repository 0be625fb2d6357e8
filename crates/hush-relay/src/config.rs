//! Configuration management

use std::net::SocketAddr;
use std::path::PathBuf;

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

/// Where key records and blobs live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Sqlite,
    Memory,
}

/// Relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub listen_addr: SocketAddr,
    pub database_path: PathBuf,
    pub storage_backend: String, // "sqlite" or "memory"
    pub max_blob_size: usize,
    pub max_key_request_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8088)),
            database_path: PathBuf::from("hush-relay.db"),
            storage_backend: "sqlite".to_string(),
            max_blob_size: 16 * 1024 * 1024, // 16 MiB
            max_key_request_size: 1024,
        }
    }
}

impl RelayConfig {
    /// Load configuration from environment variables and TOML file
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Same as [`load`](Self::load) with a custom variable lookup.
    pub fn load_with(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(addr) = var("HUSH_RELAY_LISTEN_ADDR") {
            config.listen_addr = addr
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("Invalid listen_addr: {}", e)))?;
        }

        if let Some(path) = var("HUSH_RELAY_DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Some(backend) = var("HUSH_RELAY_STORAGE_BACKEND") {
            config.storage_backend = backend;
        }

        if let Some(size) = var("HUSH_RELAY_MAX_BLOB_SIZE") {
            config.max_blob_size = size
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("Invalid max_blob_size: {}", e)))?;
        }

        if let Some(config_path) = var("HUSH_RELAY_CONFIG") {
            config.load_from_toml(&config_path)?;
        }

        config.validate()?;

        Ok(config)
    }

    /// Load from TOML config file
    fn load_from_toml(&mut self, path: &str) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let toml_config: toml::Value = toml::from_str(&content)?;

        if let Some(addr) = toml_config.get("listen_addr").and_then(|v| v.as_str()) {
            self.listen_addr = addr
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("Invalid listen_addr in TOML: {}", e)))?;
        }

        if let Some(path) = toml_config.get("database_path").and_then(|v| v.as_str()) {
            self.database_path = PathBuf::from(path);
        }

        if let Some(backend) = toml_config.get("storage_backend").and_then(|v| v.as_str()) {
            self.storage_backend = backend.to_string();
        }

        if let Some(size) = toml_config.get("max_blob_size").and_then(|v| v.as_integer()) {
            self.max_blob_size = usize::try_from(size)
                .map_err(|_| ConfigError::Invalid("max_blob_size must be positive".to_string()))?;
        }

        if let Some(size) = toml_config.get("max_key_request_size").and_then(|v| v.as_integer()) {
            self.max_key_request_size = usize::try_from(size)
                .map_err(|_| ConfigError::Invalid("max_key_request_size must be positive".to_string()))?;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.storage_backend.as_str(), "sqlite" | "memory") {
            return Err(ConfigError::Invalid(
                "storage_backend must be one of: sqlite, memory".to_string(),
            ));
        }

        if self.max_blob_size == 0 {
            return Err(ConfigError::Invalid("max_blob_size must be > 0".to_string()));
        }

        // a 32-byte key in protobuf framing needs 34 bytes
        if self.max_key_request_size < 34 {
            return Err(ConfigError::Invalid("max_key_request_size must be >= 34".to_string()));
        }

        Ok(())
    }

    pub fn storage_backend(&self) -> StorageBackend {
        match self.storage_backend.as_str() {
            "memory" => StorageBackend::Memory,
            _ => StorageBackend::Sqlite,
        }
    }
}
