//! Classic relay update service: batch queries keyed by update code

use crate::remote::HttpClient;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassicUpdateQuery {
    #[serde(rename = "updatecode")]
    pub update_code: u32,
    pub version: String,
}

/// Server answer for one update code
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClassicUpdateInfo {
    #[serde(rename = "updatecode")]
    pub update_code: u32,
    #[serde(rename = "serverversion", default)]
    pub server_version: String,
    /// Files that differ from the installed release
    #[serde(rename = "applicableupdates", default)]
    pub applicable_patches: Vec<String>,
    /// Files the newer release removes
    #[serde(rename = "filestodelete", default)]
    pub deletions: Vec<String>,
    #[serde(default)]
    pub changelog: Option<String>,
}

impl ClassicUpdateInfo {
    pub fn has_changes(&self) -> bool {
        !self.applicable_patches.is_empty() || !self.deletions.is_empty()
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClassicUpdateService: Send + Sync {
    async fn check(&self, queries: &[ClassicUpdateQuery]) -> Result<Vec<ClassicUpdateInfo>>;
}

#[derive(Serialize)]
struct ClassicRequest<'a> {
    mods: &'a [ClassicUpdateQuery],
}

pub struct HttpClassicUpdates {
    http: HttpClient,
    url: String,
}

impl HttpClassicUpdates {
    pub fn new(http: HttpClient, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ClassicUpdateService for HttpClassicUpdates {
    async fn check(&self, queries: &[ClassicUpdateQuery]) -> Result<Vec<ClassicUpdateInfo>> {
        tracing::debug!("Querying classic relay for {} update codes", queries.len());
        self.http
            .post_json(&self.url, &ClassicRequest { mods: queries })
            .await
    }
}
