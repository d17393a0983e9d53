//! Nexus Mods REST v1 client

use super::ratelimit::RateLimiter;
use super::{NexusApi, NexusModInfo};
use crate::remote::HttpClient;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.nexusmods.com/v1";

/// Authenticated REST client
#[derive(Clone)]
pub struct NexusRestClient {
    http: HttpClient,
    base_url: String,
    limiter: Arc<RateLimiter>,
}

impl NexusRestClient {
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: HttpClient::with_api_key(api_key, timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            limiter: Arc::new(RateLimiter::new()),
        })
    }

    fn mod_url(&self, domain: &str, mod_id: i64, suffix: &str) -> String {
        format!("{}/games/{}/mods/{}{}", self.base_url, domain, mod_id, suffix)
    }

    /// Single attempt; a throttled call fails instead of waiting out the quota
    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .http
            .send_once(|c| c.get(url).header("accept", "application/json"))
            .await?;
        check_response(&self.limiter, response.status(), response.headers())?;

        let body = response.text().await.context("Failed to read response body")?;
        serde_json::from_str(&body).with_context(|| format!("Failed to parse response from {}", url))
    }
}

/// Feed the limiter from any response and fail on non-success statuses
fn check_response(limiter: &RateLimiter, status: StatusCode, headers: &HeaderMap) -> Result<()> {
    limiter.update_from_headers(headers);
    if status == StatusCode::TOO_MANY_REQUESTS {
        limiter.record_throttled(Utc::now());
        bail!("Nexus Mods rate limit reached");
    }
    if !status.is_success() {
        bail!("Nexus Mods request failed with status {}", status);
    }
    Ok(())
}

#[async_trait]
impl NexusApi for NexusRestClient {
    fn is_rate_limited(&self) -> bool {
        self.limiter.is_blocked()
    }

    async fn get_mod(&self, domain: &str, mod_id: i64) -> Result<NexusModInfo> {
        self.get(&self.mod_url(domain, mod_id, ".json")).await
    }

    async fn get_changelogs(&self, domain: &str, mod_id: i64) -> Result<BTreeMap<String, Vec<String>>> {
        self.get(&self.mod_url(domain, mod_id, "/changelogs.json")).await
    }
}
