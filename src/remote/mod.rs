//! Remote collaborators used during import

mod http;

pub use http::HttpClient;

use crate::archive::ArchiveFingerprint;
use crate::mods::TransformDefinition;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

/// Blob store holding custom manifests and transform documents
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Raw `moddesc.ini` text published for an archive that lacks one
    async fn fetch_custom_manifest(&self, name: &str) -> Result<String>;

    async fn fetch_transform(&self, name: &str) -> Result<TransformDefinition>;
}

/// Service that knows versions of content by fingerprint
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RelayService: Send + Sync {
    /// `None` when the relay does not track this archive
    async fn query_version(&self, fingerprint: &ArchiveFingerprint) -> Result<Option<String>>;
}

/// Anonymous usage reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// Content was identified but no source knows its version.
    /// The archive hash is absent when the container could not be fingerprinted.
    UnversionedContent {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        md5: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        size: Option<u64>,
    },
    /// A DLC folder that no catalogue recognizes
    UnknownDlcFolder { folder: String, game: String },
}

/// Sink for telemetry; calls never block and never fail
#[cfg_attr(test, mockall::automock)]
pub trait TelemetrySink: Send + Sync {
    fn track(&self, event: TelemetryEvent);
}

/// Records telemetry in the log only
pub struct LogTelemetry;

impl TelemetrySink for LogTelemetry {
    fn track(&self, event: TelemetryEvent) {
        tracing::info!(target: "modscout::telemetry", "{:?}", event);
    }
}

/// Posts telemetry in the background
pub struct HttpTelemetry {
    http: HttpClient,
    url: String,
}

impl HttpTelemetry {
    pub fn new(http: HttpClient, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

impl TelemetrySink for HttpTelemetry {
    fn track(&self, event: TelemetryEvent) {
        tracing::debug!(target: "modscout::telemetry", "{:?}", event);

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let http = self.http.clone();
        let url = self.url.clone();
        runtime.spawn(async move {
            if let Err(e) = http.send(|c| c.post(&url).json(&event)).await {
                tracing::debug!("Telemetry upload failed: {:#}", e);
            }
        });
    }
}

/// Content store served from two HTTP directories
pub struct HttpContentStore {
    http: HttpClient,
    manifest_base: Url,
    transform_base: Url,
}

impl HttpContentStore {
    pub fn new(http: HttpClient, manifest_base: &str, transform_base: &str) -> Result<Self> {
        Ok(Self {
            http,
            manifest_base: directory_url(manifest_base)?,
            transform_base: directory_url(transform_base)?,
        })
    }
}

#[async_trait]
impl ContentStore for HttpContentStore {
    async fn fetch_custom_manifest(&self, name: &str) -> Result<String> {
        let url = self
            .manifest_base
            .join(name)
            .with_context(|| format!("Invalid manifest name '{}'", name))?;
        tracing::debug!("Fetching custom manifest {}", url);
        self.http.get_text(url.as_str()).await
    }

    async fn fetch_transform(&self, name: &str) -> Result<TransformDefinition> {
        let file = if name.to_ascii_lowercase().ends_with(".xml") {
            name.to_string()
        } else {
            format!("{}.xml", name)
        };
        let url = self
            .transform_base
            .join(&file)
            .with_context(|| format!("Invalid transform name '{}'", name))?;
        tracing::debug!("Fetching transform {}", url);
        let xml = self.http.get_text(url.as_str()).await?;
        TransformDefinition::parse(&xml)
    }
}

#[derive(Debug, Deserialize)]
struct RelayAnswer {
    #[serde(default)]
    version: Option<String>,
}

/// Relay queried over HTTP with `size` and `md5` parameters
pub struct HttpRelay {
    http: HttpClient,
    url: Url,
}

impl HttpRelay {
    pub fn new(http: HttpClient, url: &str) -> Result<Self> {
        Ok(Self {
            http,
            url: Url::parse(url).with_context(|| format!("Invalid relay URL '{}'", url))?,
        })
    }

    fn query_url(&self, fingerprint: &ArchiveFingerprint) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut()
            .append_pair("size", &fingerprint.size.to_string())
            .append_pair("md5", &fingerprint.md5);
        url
    }
}

#[async_trait]
impl RelayService for HttpRelay {
    async fn query_version(&self, fingerprint: &ArchiveFingerprint) -> Result<Option<String>> {
        let answer: RelayAnswer = self.http.get_json(self.query_url(fingerprint).as_str()).await?;
        Ok(answer
            .version
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty()))
    }
}

/// Parse a base URL, making sure relative joins land inside it
fn directory_url(raw: &str) -> Result<Url> {
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{}/", raw)
    };
    Url::parse(&with_slash).with_context(|| format!("Invalid URL '{}'", raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn http() -> HttpClient {
        HttpClient::new(Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_directory_url_joins_inside_base() {
        let base = directory_url("https://example.org/content/manifests").unwrap();
        assert_eq!(
            base.join("mod.ini").unwrap().as_str(),
            "https://example.org/content/manifests/mod.ini"
        );
        assert!(directory_url("not a url").is_err());
    }

    #[test]
    fn test_relay_query_url() {
        let relay = HttpRelay::new(http(), "https://example.org/relay/version").unwrap();
        let url = relay.query_url(&ArchiveFingerprint {
            md5: "abc123".to_string(),
            size: 42,
        });
        assert_eq!(url.as_str(), "https://example.org/relay/version?size=42&md5=abc123");
    }

    #[test]
    fn test_telemetry_outside_runtime_is_dropped() {
        let sink = HttpTelemetry::new(http(), "http://127.0.0.1:9/telemetry");
        sink.track(TelemetryEvent::UnknownDlcFolder {
            folder: "DLC_MOD_X".to_string(),
            game: "ME3".to_string(),
        });
    }

    #[test]
    fn test_unfingerprinted_event_omits_hash() {
        let event = TelemetryEvent::UnversionedContent {
            name: "Bar".to_string(),
            md5: None,
            size: None,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            serde_json::json!({"event": "unversioned_content", "name": "Bar"})
        );
    }
}
