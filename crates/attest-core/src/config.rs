//! Client configuration
//!
//! Read from `~/.attest/config.json` (or the file named by `ATTEST_CONFIG`),
//! then overridden field by field from the environment.

use std::path::{Path, PathBuf};

use attest_crypto::{CryptoError, KeyStore, ServiceVerifyingKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_API_URL: &str = "https://api.attest.example/api/v1";

pub const ENV_CONFIG: &str = "ATTEST_CONFIG";
pub const ENV_SDK_ID: &str = "ATTEST_SDK_ID";
pub const ENV_API_URL: &str = "ATTEST_API_URL";
pub const ENV_PRIVATE_KEY: &str = "ATTEST_PRIVATE_KEY";
pub const ENV_SERVICE_PUBLIC_KEY: &str = "ATTEST_SERVICE_PUBLIC_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No home directory")]
    NoHome,

    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Missing configuration value: {0}")]
    Missing(&'static str),

    #[error("Key error: {0}")]
    Key(#[from] CryptoError),
}

/// Resolved configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub sdk_id: String,
    pub api_url: String,
    pub private_key_path: PathBuf,
    /// Ed25519 key, hex or base64url
    pub service_public_key: String,
}

/// On-disk form; every field optional so the environment can fill gaps
#[derive(Debug, Clone, Default, Deserialize)]
struct RawConfig {
    sdk_id: Option<String>,
    api_url: Option<String>,
    private_key_path: Option<PathBuf>,
    service_public_key: Option<String>,
}

impl ClientConfig {
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        if let Ok(path) = std::env::var(ENV_CONFIG) {
            return Ok(PathBuf::from(path));
        }
        Ok(dirs::home_dir()
            .ok_or(ConfigError::NoHome)?
            .join(".attest")
            .join("config.json"))
    }

    /// Load from the default location plus environment overrides.
    /// A missing file is fine if the environment supplies everything.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path()?;
        let raw = if path.exists() {
            read_raw(&path)?
        } else {
            RawConfig::default()
        };
        resolve(raw, |name| std::env::var(name).ok())
    }

    /// Load one file, still honouring environment overrides
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        resolve(read_raw(path)?, |name| std::env::var(name).ok())
    }

    pub fn key_store(&self) -> Result<KeyStore, ConfigError> {
        Ok(KeyStore::from_pem_file(&self.private_key_path)?)
    }

    pub fn service_key(&self) -> Result<ServiceVerifyingKey, ConfigError> {
        Ok(ServiceVerifyingKey::from_encoded(&self.service_public_key)?)
    }
}

fn read_raw(path: &Path) -> Result<RawConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&content)?)
}

fn resolve(
    raw: RawConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ClientConfig, ConfigError> {
    let pick = |name: &str, file: Option<String>| env(name).filter(|v| !v.is_empty()).or(file);

    Ok(ClientConfig {
        sdk_id: pick(ENV_SDK_ID, raw.sdk_id).ok_or(ConfigError::Missing("sdk_id"))?,
        api_url: pick(ENV_API_URL, raw.api_url).unwrap_or_else(|| DEFAULT_API_URL.to_string()),
        private_key_path: pick(
            ENV_PRIVATE_KEY,
            raw.private_key_path.map(|p| p.to_string_lossy().into_owned()),
        )
        .map(PathBuf::from)
        .ok_or(ConfigError::Missing("private_key_path"))?,
        service_public_key: pick(ENV_SERVICE_PUBLIC_KEY, raw.service_public_key)
            .ok_or(ConfigError::Missing("service_public_key"))?,
    })
}
