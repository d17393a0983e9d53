//! Nexus Mods API integration

mod ratelimit;
pub mod rest;

pub use ratelimit::{RateLimitSnapshot, RateLimiter};
pub use rest::NexusRestClient;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mod details from `mods/{id}.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NexusModInfo {
    pub mod_id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub domain_name: Option<String>,
}

/// Operations the update checker needs from Nexus Mods
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NexusApi: Send + Sync {
    /// Quota exhausted for the current window
    fn is_rate_limited(&self) -> bool;

    async fn get_mod(&self, domain: &str, mod_id: i64) -> Result<NexusModInfo>;

    /// Version -> changelog lines
    async fn get_changelogs(&self, domain: &str, mod_id: i64) -> Result<BTreeMap<String, Vec<String>>>;
}
