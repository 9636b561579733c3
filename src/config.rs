//! Configuration management for the catalog client
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (catalog.toml)
//! - Environment variables (DATACATALOG_*)
//!
//! ## Example config file (catalog.toml):
//! ```toml
//! [api]
//! host = "https://api.treeschema.com"
//! base_path = "catalog"
//! username = "grant@example.com"
//! secret_key = "..."
//! timeout_secs = 30
//!
//! [resolution]
//! batch_size = 100
//! pre_fetch = true
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::auth::Credentials;
use crate::error::Result;

/// Main configuration for the catalog client
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Remote service settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Entity resolution settings
    #[serde(default)]
    pub resolution: ResolutionConfig,
}

/// Remote service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Scheme and host of the catalog service
    #[serde(default = "default_host")]
    pub host: String,

    /// Path prefix every endpoint is resolved against
    #[serde(default = "default_base_path")]
    pub base_path: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub secret_key: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Entity resolution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionConfig {
    /// Maximum ids per kind in one batch-load request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Fetch a full child listing before the first name lookup
    #[serde(default = "default_true")]
    pub pre_fetch: bool,
}

// Default value functions
fn default_host() -> String {
    "https://api.treeschema.com".to_string()
}

fn default_base_path() -> String {
    "catalog".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_batch_size() -> usize {
    100
}

fn default_true() -> bool {
    true
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            base_path: default_base_path(),
            username: None,
            secret_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            pre_fetch: true,
        }
    }
}

impl CatalogConfig {
    /// Load configuration from default locations
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> std::result::Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["catalog.toml", ".catalog.toml", "config/catalog.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("com", "datacatalog", "catalog") {
            let xdg_config = config_dir.config_dir().join("catalog.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // DATACATALOG__API__SECRET_KEY style overrides
        builder = builder.add_source(
            Environment::with_prefix("DATACATALOG")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Root URL every endpoint path is joined onto
    pub fn base_url(&self) -> String {
        format!(
            "{}/{}/",
            self.api.host.trim_end_matches('/'),
            self.api.base_path.trim_matches('/')
        )
    }

    /// Credentials from the `[api]` section
    pub fn credentials(&self) -> Result<Credentials> {
        Credentials::new(
            self.api.username.as_deref().unwrap_or_default(),
            self.api.secret_key.as_deref().unwrap_or_default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CatalogError;

    #[test]
    fn test_default_config() {
        let config = CatalogConfig::default();
        assert_eq!(config.resolution.batch_size, 100);
        assert!(config.resolution.pre_fetch);
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.base_url(), "https://api.treeschema.com/catalog/");
    }

    #[test]
    fn test_serialize_config() {
        let config = CatalogConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[api]"));
        assert!(toml_str.contains("[resolution]"));
    }

    #[test]
    fn test_missing_credentials() {
        let config = CatalogConfig::default();
        assert!(matches!(
            config.credentials(),
            Err(CatalogError::CredentialsRequired)
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        let mut config = CatalogConfig::default();
        config.api.host = "http://localhost:8080/".to_string();
        config.api.username = Some("grant@example.com".to_string());
        config.api.secret_key = Some("s3cret".to_string());
        config.resolution.batch_size = 25;
        config.save(path.to_str().unwrap()).unwrap();

        let loaded = CatalogConfig::load_from(path.to_str()).unwrap();
        assert_eq!(loaded.resolution.batch_size, 25);
        assert_eq!(loaded.base_url(), "http://localhost:8080/catalog/");
        let credentials = loaded.credentials().unwrap();
        assert_eq!(credentials.username(), "grant@example.com");
    }
}
