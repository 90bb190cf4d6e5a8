//! Configuration management for Atelier
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::auth::token_store::{TokenStore, DEFAULT_SERVICE_NAME};
use crate::error::{AtelierError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for Atelier
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Backend API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Credential storage settings
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Backend API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Origin (and optional path prefix) every request path is appended to
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Path of the token refresh endpoint
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,

    /// Path of the login endpoint
    #[serde(default = "default_login_path")]
    pub login_path: String,
}

fn default_base_url() -> String {
    "http://localhost:5000/api".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_refresh_path() -> String {
    "/User/refresh-token".to_string()
}

fn default_login_path() -> String {
    "/User/login".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_timeout_seconds(),
            refresh_path: default_refresh_path(),
            login_path: default_login_path(),
        }
    }
}

impl ApiConfig {
    /// Per-request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Where credentials are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// OS keyring
    Keyring,
    /// Process memory; lost on exit
    Memory,
}

impl std::str::FromStr for StorageBackend {
    type Err = AtelierError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "keyring" => Ok(StorageBackend::Keyring),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(AtelierError::Config(format!(
                "Invalid storage backend: {other}. Must be one of: keyring, memory"
            ))),
        }
    }
}

/// Credential storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage backend
    #[serde(default = "default_storage_backend")]
    pub backend: StorageBackend,

    /// Keyring service name the tokens are stored under
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

fn default_storage_backend() -> StorageBackend {
    StorageBackend::Keyring
}

fn default_service_name() -> String {
    DEFAULT_SERVICE_NAME.to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            service_name: default_service_name(),
        }
    }
}

impl StorageConfig {
    /// Builds the token store this configuration describes.
    pub fn token_store(&self) -> TokenStore {
        match self.backend {
            StorageBackend::Keyring => TokenStore::keyring(self.service_name.clone()),
            StorageBackend::Memory => TokenStore::in_memory(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// A missing file is not an error; defaults are used and a warning is
    /// logged.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| AtelierError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| AtelierError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(base_url) = std::env::var("ATELIER_BASE_URL") {
            self.api.base_url = base_url;
        }

        if let Ok(timeout) = std::env::var("ATELIER_TIMEOUT_SECONDS") {
            match timeout.parse::<u64>() {
                Ok(value) => self.api.timeout_seconds = value,
                Err(_) => tracing::warn!(
                    "Ignoring invalid ATELIER_TIMEOUT_SECONDS value: {}",
                    timeout
                ),
            }
        }

        if let Ok(backend) = std::env::var("ATELIER_STORAGE_BACKEND") {
            match backend.parse::<StorageBackend>() {
                Ok(value) => self.storage.backend = value,
                Err(e) => tracing::warn!("Ignoring ATELIER_STORAGE_BACKEND: {}", e),
            }
        }

        if let Ok(service) = std::env::var("ATELIER_KEYRING_SERVICE") {
            self.storage.service_name = service;
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(base_url) = &cli.base_url {
            self.api.base_url = base_url.clone();
        }
        if cli.ephemeral {
            tracing::debug!("Using in-memory credential storage");
            self.storage.backend = StorageBackend::Memory;
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        let base = url::Url::parse(&self.api.base_url).map_err(|e| {
            AtelierError::Config(format!("Invalid base_url {}: {}", self.api.base_url, e))
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(AtelierError::Config(format!(
                "base_url must use http or https, got: {}",
                base.scheme()
            ))
            .into());
        }

        if self.api.timeout_seconds == 0 {
            return Err(
                AtelierError::Config("timeout_seconds must be greater than 0".to_string()).into(),
            );
        }

        for (name, value) in [
            ("refresh_path", &self.api.refresh_path),
            ("login_path", &self.api.login_path),
        ] {
            if !value.starts_with('/') {
                return Err(
                    AtelierError::Config(format!("{name} must start with '/': {value}")).into(),
                );
            }
        }

        if self.storage.service_name.trim().is_empty() {
            return Err(
                AtelierError::Config("storage.service_name cannot be empty".to_string()).into(),
            );
        }

        Ok(())
    }
}
