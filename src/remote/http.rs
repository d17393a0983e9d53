//! Shared HTTP client with bounded retry for transient failures

use anyhow::{bail, Context, Result};
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

const MAX_RETRIES: u32 = 3;
const BASE_RETRY_DELAY_MS: u64 = 1000;
const MAX_RETRY_DELAY_MS: u64 = 30000;

pub(crate) const USER_AGENT: &str = concat!("ModScout/", env!("CARGO_PKG_VERSION"));

/// HTTP client shared by every remote service
#[derive(Clone)]
pub struct HttpClient {
    client: Arc<reqwest::Client>,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_headers(HeaderMap::new(), timeout)
    }

    /// Client that sends `apikey` on every request
    pub fn with_api_key(api_key: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(api_key.trim()).context("Invalid API key")?,
        );
        Self::with_headers(headers, timeout)
    }

    fn with_headers(headers: HeaderMap, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client: Arc::new(client),
        })
    }

    /// Send a request once. The response is returned whatever its status.
    pub async fn send_once<F>(&self, build: F) -> Result<Response>
    where
        F: FnOnce(&reqwest::Client) -> RequestBuilder,
    {
        build(&self.client).send().await.context("Failed to send request")
    }

    /// Send a request, retrying rate-limit and server errors with backoff.
    /// Client errors are returned immediately.
    pub async fn send<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let response = build(&self.client)
                .send()
                .await
                .context("Failed to send request")?;
            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                if attempt >= MAX_RETRIES {
                    bail!("Request failed after {} attempts: {}", MAX_RETRIES, status);
                }

                let delay = retry_after_delay(response.headers()).unwrap_or_else(|| backoff_delay(attempt));

                tracing::warn!(
                    "Request returned {} (attempt {}/{}), retrying in {}ms",
                    status,
                    attempt,
                    MAX_RETRIES,
                    delay
                );
                sleep(Duration::from_millis(delay)).await;
                continue;
            }

            if !status.is_success() {
                let error_text = response.text().await.unwrap_or_default();
                bail!("Request failed with status {}: {}", status, error_text);
            }

            return Ok(response);
        }
    }

    pub async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.send(|c| c.get(url)).await?;
        response.text().await.context("Failed to read response body")
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let body = self.get_text(url).await?;
        serde_json::from_str(&body).with_context(|| format!("Failed to parse response from {}", url))
    }

    pub async fn post_json<B, T>(&self, url: &str, body: &B) -> Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let response = self.send(|c| c.post(url).json(body)).await?;
        let text = response.text().await.context("Failed to read response body")?;
        serde_json::from_str(&text).with_context(|| format!("Failed to parse response from {}", url))
    }
}

/// Exponential backoff with 85-115% jitter
fn backoff_delay(attempt: u32) -> u64 {
    let base_delay = BASE_RETRY_DELAY_MS * (1 << (attempt - 1).min(10));
    let jitter: u64 = rand::thread_rng().gen_range(85..=115);
    (base_delay * jitter / 100).min(MAX_RETRY_DELAY_MS)
}

/// Server-requested delay in milliseconds, capped like the backoff
fn retry_after_delay(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("retry-after")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(|secs| secs.saturating_mul(1000).min(MAX_RETRY_DELAY_MS))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retry_after(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_retry_after_is_capped() {
        assert_eq!(retry_after_delay(&retry_after("2")), Some(2000));
        assert_eq!(retry_after_delay(&retry_after("3600")), Some(MAX_RETRY_DELAY_MS));
        assert_eq!(
            retry_after_delay(&retry_after("18446744073709551615")),
            Some(MAX_RETRY_DELAY_MS)
        );
        assert_eq!(retry_after_delay(&retry_after("Wed, 21 Oct 2015 07:28:00 GMT")), None);
        assert_eq!(retry_after_delay(&HeaderMap::new()), None);
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let first = backoff_delay(1);
        assert!((850..=1150).contains(&first));
        let third = backoff_delay(3);
        assert!((3400..=4600).contains(&third));
        assert_eq!(backoff_delay(20), MAX_RETRY_DELAY_MS);
    }
}
