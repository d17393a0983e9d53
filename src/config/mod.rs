//! Configuration management for modscout
//!
//! Uses XDG-compliant paths:
//! - Config: ~/.config/modscout/config.toml
//! - Data: ~/.local/share/modscout/ (catalogue cache)
//! - Cache: ~/.cache/modscout/ (logs)

mod paths;

pub use paths::Paths;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs;

const SERVICE_BASE: &str = "https://me3tweaks.com/modmanager/services";

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Nexus Mods API key. The Nexus update pass is skipped without one.
    pub nexus_api_key: Option<String>,

    /// Hours before the identification catalogues are downloaded again
    pub cache_ttl_hours: u32,

    /// Per-request timeout for every remote service
    pub http_timeout_secs: u64,

    /// Report unidentified content to the telemetry endpoint
    pub telemetry_enabled: bool,

    /// Remote service locations
    pub endpoints: EndpointConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            nexus_api_key: None,
            cache_ttl_hours: 24,
            http_timeout_secs: 30,
            telemetry_enabled: false,
            endpoints: EndpointConfig::default(),
        }
    }
}

/// Remote service endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Size/hash identification catalogue (JSON)
    pub size_hash_url: String,

    /// DLC folder identification catalogue (JSON)
    pub directory_url: String,

    /// Base URL replacement manifests are fetched from
    pub manifest_base_url: String,

    /// Base URL import transforms are fetched from
    pub transform_base_url: String,

    /// Version lookup by archive size and hash
    pub relay_url: String,

    pub telemetry_url: String,

    /// Batched update check for classic update codes
    pub classic_updates_url: String,

    /// Latest revision of every ModMaker mod
    pub modmaker_url: String,

    pub nexus_api_base: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            size_hash_url: format!("{}/thirdpartyidentificationservice", SERVICE_BASE),
            directory_url: format!("{}/thirdpartyimportingservice", SERVICE_BASE),
            manifest_base_url: format!("{}/moddescs/", SERVICE_BASE),
            transform_base_url: format!("{}/importtransforms/", SERVICE_BASE),
            relay_url: format!("{}/versionrelay", SERVICE_BASE),
            telemetry_url: format!("{}/telemetry", SERVICE_BASE),
            classic_updates_url: format!("{}/updatecheck", SERVICE_BASE),
            modmaker_url: format!("{}/modmakerrevisions", SERVICE_BASE),
            nexus_api_base: crate::nexus::rest::DEFAULT_API_BASE.to_string(),
        }
    }
}

impl Config {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.cache_ttl_hours))
    }

    /// API key with surrounding whitespace removed, `None` when blank
    pub fn nexus_api_key(&self) -> Option<&str> {
        self.nexus_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    /// Reject values that would make every request fail
    pub fn validate(&self) -> Result<()> {
        let e = &self.endpoints;
        for (name, value) in [
            ("size_hash_url", &e.size_hash_url),
            ("directory_url", &e.directory_url),
            ("manifest_base_url", &e.manifest_base_url),
            ("transform_base_url", &e.transform_base_url),
            ("relay_url", &e.relay_url),
            ("telemetry_url", &e.telemetry_url),
            ("classic_updates_url", &e.classic_updates_url),
            ("modmaker_url", &e.modmaker_url),
            ("nexus_api_base", &e.nexus_api_base),
        ] {
            if let Err(err) = url::Url::parse(value) {
                bail!("Invalid endpoint '{}' = '{}': {}", name, value, err);
            }
        }
        Ok(())
    }

    /// Load configuration from disk or create default
    pub async fn load(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();

        let config = if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .await
                .context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")?
        } else {
            tracing::info!("Writing default configuration to {}", config_path.display());
            let config = Config::default();
            config.save(paths).await?;
            config
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to disk
    pub async fn save(&self, paths: &Paths) -> Result<()> {
        let config_path = paths.config_file();

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&config_path, content)
            .await
            .context("Failed to write config file")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_load_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::under(dir.path());

        let config = Config::load(&paths).await.unwrap();
        assert_eq!(config, Config::default());
        assert!(paths.config_file().exists());

        let reloaded = Config::load(&paths).await.unwrap();
        assert_eq!(reloaded, config);
    }

    #[tokio::test]
    async fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::under(dir.path());
        std::fs::create_dir_all(paths.config_dir()).unwrap();
        std::fs::write(
            paths.config_file(),
            "cache_ttl_hours = 6\n\n[endpoints]\nrelay_url = \"http://localhost:8080/relay\"\n",
        )
        .unwrap();

        let config = Config::load(&paths).await.unwrap();
        assert_eq!(config.cache_ttl_hours, 6);
        assert_eq!(config.endpoints.relay_url, "http://localhost:8080/relay");
        assert_eq!(config.http_timeout_secs, 30);
        assert_eq!(config.endpoints.modmaker_url, EndpointConfig::default().modmaker_url);
    }

    #[tokio::test]
    async fn test_invalid_endpoint_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::under(dir.path());
        std::fs::create_dir_all(paths.config_dir()).unwrap();
        std::fs::write(paths.config_file(), "[endpoints]\nrelay_url = \"not a url\"\n").unwrap();

        let err = Config::load(&paths).await.unwrap_err();
        assert!(err.to_string().contains("relay_url"));
    }

    #[test]
    fn test_blank_api_key_is_absent() {
        let config = Config {
            nexus_api_key: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(config.nexus_api_key(), None);
    }
}
