//! Save workflow configuration.
//!
//! Connection settings come from the environment; everything that shapes the
//! save itself lives in an optional TOML file deserialized into
//! [`SaveConfig`]. Missing keys fall back to defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What to do when a service group's vendor name is not in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VendorPolicy {
    /// Save the group with an empty vendor id and a warning note.
    #[default]
    Degrade,
    /// Fail reference resolution.
    Require,
}

/// Image compression applied before upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Images at or below this size are uploaded untouched.
    pub threshold_bytes: u64,
    pub max_width: u32,
    /// JPEG quality, 1-100.
    pub quality: u8,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        CompressionConfig {
            threshold_bytes: 1024 * 1024,
            max_width: 1920,
            quality: 80,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveConfig {
    /// Keep going when some attachments fail to upload.
    pub allow_partial_save: bool,
    pub vendor_policy: VendorPolicy,
    pub upload_timeout_secs: u64,
    /// Object storage bucket holding bills and warranty documents.
    pub bucket: String,
    /// Category given to task labels auto-created in the catalog.
    pub custom_category: String,
    pub compression: CompressionConfig,
}

impl Default for SaveConfig {
    fn default() -> Self {
        SaveConfig {
            allow_partial_save: false,
            vendor_policy: VendorPolicy::Degrade,
            upload_timeout_secs: 60,
            bucket: "maintenance-files".to_string(),
            custom_category: "Custom".to_string(),
            compression: CompressionConfig::default(),
        }
    }
}

impl SaveConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&source)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }
}

/// Connection settings for the hosted database and object storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub database_url: String,
    pub api_key: String,
}

impl ClientConfig {
    pub const DATABASE_URL_VAR: &'static str = "FLEET_DB_URL";
    pub const API_KEY_VAR: &'static str = "FLEET_API_KEY";

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &'static str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::MissingEnv(key))
        };
        Ok(ClientConfig {
            database_url: get(Self::DATABASE_URL_VAR)?,
            api_key: get(Self::API_KEY_VAR)?,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    MissingEnv(&'static str),

    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}
