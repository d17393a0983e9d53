//! ModMaker catalogue of the latest published revision of each mod

use crate::remote::HttpClient;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModMakerEntry {
    pub id: u32,
    pub revision: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub changelog: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModMakerService: Send + Sync {
    /// Latest revision of every published mod
    async fn latest_revisions(&self) -> Result<Vec<ModMakerEntry>>;
}

pub struct HttpModMaker {
    http: HttpClient,
    url: String,
}

impl HttpModMaker {
    pub fn new(http: HttpClient, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ModMakerService for HttpModMaker {
    async fn latest_revisions(&self) -> Result<Vec<ModMakerEntry>> {
        self.http.get_json(&self.url).await
    }
}
