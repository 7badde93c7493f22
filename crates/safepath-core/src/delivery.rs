use crate::error::{Error, Result};
use crate::finding::Finding;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Ingestion endpoint, relative to the backend base URL.
pub const FINDINGS_PATH: &str = "/api/findings";

/// Liveness endpoint of the findings store.
pub const HEALTH_PATH: &str = "/api/health";

/// Anything that accepts findings one at a time.
#[async_trait]
pub trait FindingSink: Send + Sync {
    /// Deliver one finding, returning the number of attempts it took.
    async fn deliver(&self, finding: &Finding) -> Result<u32>;
}

/// Bounded retry with linear backoff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Wait after failed attempt number `attempt` (1-based), saturating at `Duration::MAX`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Total time spent waiting when every attempt fails.
    pub fn total_backoff(&self) -> Duration {
        (1..self.max_attempts)
            .map(|i| self.delay_after(i))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

/// HTTP client for the findings store.
///
/// There is no idempotency key on the request: if the store accepts a
/// finding but the response is lost, the retry creates a second record.
pub struct DeliveryClient {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl DeliveryClient {
    pub fn new(base_url: &str, retry: RetryPolicy, request_timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("safepath/", env!("CARGO_PKG_VERSION"))),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    pub fn findings_url(&self) -> String {
        format!("{}{}", self.base_url, FINDINGS_PATH)
    }

    pub fn health_url(&self) -> String {
        format!("{}{}", self.base_url, HEALTH_PATH)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// One POST; only 200 and 201 count as accepted.
    async fn post_once(&self, finding: &Finding) -> Result<()> {
        let response = self
            .client
            .post(self.findings_url())
            .json(finding)
            .send()
            .await
            .map_err(|e| Error::Delivery(format!("transport error: {}", e)))?;

        let status = response.status();
        if status == StatusCode::OK || status == StatusCode::CREATED {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(Error::Delivery(format!("HTTP {}: {}", status.as_u16(), body.trim())))
    }

    /// Ask the store whether it is up. Transport failures are errors; a
    /// reachable but unhappy store is `Ok(false)`.
    pub async fn health(&self) -> Result<bool> {
        let response = self.client.get(self.health_url()).send().await?;
        debug!(status = response.status().as_u16(), "health check answered");
        Ok(response.status().is_success())
    }
}

#[async_trait]
impl FindingSink for DeliveryClient {
    async fn deliver(&self, finding: &Finding) -> Result<u32> {
        let max_attempts = self.retry.max_attempts;
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=max_attempts {
            match self.post_once(finding).await {
                Ok(()) => {
                    info!(host = %finding.host, port = %finding.port, attempt, "finding posted");
                    return Ok(attempt);
                }
                Err(e) => {
                    warn!(
                        host = %finding.host,
                        port = %finding.port,
                        attempt,
                        max_attempts,
                        error = %e,
                        "delivery attempt failed"
                    );
                    last_error = e.to_string();
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.retry.delay_after(attempt)).await;
            }
        }

        Err(Error::DeliveryExhausted {
            attempts: max_attempts,
            last_error,
        })
    }
}
