//! Configuration
//!
//! JSON file first, then `SHOWERVIZ_*` environment overrides.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::transform::ResizeOptions;
use crate::validation::FailureMode;

pub const ENV_CDN_HOST: &str = "SHOWERVIZ_CDN_HOST";
pub const ENV_UPLOAD_MARKER: &str = "SHOWERVIZ_UPLOAD_MARKER";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CdnConfig {
    /// Host serving the product images
    #[serde(default = "default_host")]
    pub host: String,
    /// Path segment after which transform directives are inserted
    #[serde(default = "default_upload_marker")]
    pub upload_marker: String,
}

fn default_host() -> String {
    "res.cloudinary.com".to_string()
}

fn default_upload_marker() -> String {
    "/image/upload/".to_string()
}

impl Default for CdnConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            upload_marker: default_upload_marker(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub cdn: CdnConfig,
    /// Applied to every layer of a preview
    #[serde(default)]
    pub preview: ResizeOptions,
    #[serde(default)]
    pub failure_mode: FailureMode,
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                info!("Loaded config from {}", path.display());
                serde_json::from_str(&content)?
            }
            None => Config::default(),
        };

        config.apply_overrides(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup(ENV_CDN_HOST) {
            info!("{ENV_CDN_HOST} set, using CDN host {host}");
            self.cdn.host = host;
        }
        if let Some(marker) = lookup(ENV_UPLOAD_MARKER) {
            info!("{ENV_UPLOAD_MARKER} set, using upload marker {marker}");
            self.cdn.upload_marker = marker;
        }
    }

    /// Checks the CDN settings and pads the upload marker with slashes.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.cdn.host.trim().is_empty() {
            return Err(ConfigError::Invalid("CDN host must not be empty".into()));
        }

        let marker = self.cdn.upload_marker.trim().trim_matches('/');
        if marker.is_empty() {
            return Err(ConfigError::Invalid("upload marker must not be empty".into()));
        }
        let padded = format!("/{marker}/");
        if padded != self.cdn.upload_marker {
            warn!("Normalizing upload marker {:?} to {:?}", self.cdn.upload_marker, padded);
            self.cdn.upload_marker = padded;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.cdn.host, "res.cloudinary.com");
        assert_eq!(config.cdn.upload_marker, "/image/upload/");
        assert_eq!(config.failure_mode, FailureMode::Block);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(|key| match key {
            ENV_CDN_HOST => Some("cdn.example.com".to_string()),
            _ => None,
        });
        assert_eq!(config.cdn.host, "cdn.example.com");
        assert_eq!(config.cdn.upload_marker, "/image/upload/");
    }

    #[test]
    fn test_marker_normalized() {
        let mut config = Config::default();
        config.cdn.upload_marker = "image/upload".into();
        config.validate().unwrap();
        assert_eq!(config.cdn.upload_marker, "/image/upload/");

        config.cdn.upload_marker = "//".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"cdn": {"host": "images.test"}, "failureMode": "warn"}"#).unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.failure_mode, FailureMode::Warn);
        assert!(Config::load(Some(&dir.path().join("missing.json"))).is_err());
    }
}
