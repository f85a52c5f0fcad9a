//! Resource loading
//!
//! Turns a [`Locator`] into a decoded JSON document. File locators are read
//! whole and parsed; URL locators go through a retrying GET. Every load
//! first checks the target against the crawl's entry mode so a local dataset
//! can never leak requests onto the network (or the reverse).

use std::sync::OnceLock;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::time::Instant;

use crate::locator::Locator;
use crate::{CrawlError, Result};

/// Retry policy for URL loads.
///
/// Only failures while streaming a response body are retried: those are the
/// connection resets that show up mid-transfer on flaky networks. Everything
/// else -- DNS, TLS, a non-200 status -- surfaces immediately.
#[derive(Debug, Clone)]
pub(crate) struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    max_attempts: u32,
    /// Base delay between attempts (exponential backoff).
    base_delay: Duration,
    /// Overall deadline bounding the whole retry chain.
    deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            deadline: Duration::from_secs(30 * 60),
        }
    }
}

impl RetryPolicy {
    /// Backoff for a given attempt: `base * 2^attempt` plus sub-second
    /// jitter.
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let backoff = self.base_delay * 2u32.saturating_pow(attempt);
        backoff + Duration::from_secs_f64(rand::random::<f64>())
    }

    fn is_retryable(error: &CrawlError) -> bool {
        matches!(error, CrawlError::Http { source, .. } if source.is_body())
    }
}

pub(crate) struct Loader {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl Loader {
    pub fn new(client: Option<reqwest::Client>) -> Self {
        Self {
            client: client.unwrap_or_else(default_client),
            retry: RetryPolicy::default(),
        }
    }

    /// Loads and decodes the document at `target`.
    ///
    /// The target's mode must agree with the crawl's entry mode; a cross-mode
    /// reference fails before any IO happens.
    pub async fn load<T: DeserializeOwned>(&self, entry: &Locator, target: &Locator) -> Result<T> {
        if target.is_file() {
            if !entry.is_file() {
                return Err(CrawlError::FileModeViolation {
                    location: target.to_string(),
                });
            }
            return self.load_file(target).await;
        }

        if entry.is_file() {
            return Err(CrawlError::UrlModeViolation {
                location: target.to_string(),
            });
        }
        self.load_url(target).await
    }

    async fn load_file<T: DeserializeOwned>(&self, target: &Locator) -> Result<T> {
        let Some(path) = target.as_path() else {
            return Err(CrawlError::FileModeViolation {
                location: target.to_string(),
            });
        };
        let bytes = tokio::fs::read(path).await.map_err(|source| CrawlError::Read {
            location: target.to_string(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| CrawlError::Decode {
            location: target.to_string(),
            source,
        })
    }

    async fn load_url<T: DeserializeOwned>(&self, target: &Locator) -> Result<T> {
        let deadline = Instant::now() + self.retry.deadline;
        let mut attempt = 0;
        loop {
            let error = match self.try_load_url(target).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            attempt += 1;
            if attempt >= self.retry.max_attempts || !RetryPolicy::is_retryable(&error) {
                return Err(error);
            }

            let delay = self.retry.delay_for_attempt(attempt);
            if Instant::now() + delay >= deadline {
                return Err(error);
            }
            tracing::debug!(location = %target, attempt, ?delay, "retrying after body error");
            tokio::time::sleep(delay).await;
        }
    }

    async fn try_load_url<T: DeserializeOwned>(&self, target: &Locator) -> Result<T> {
        let Some(url) = target.as_url() else {
            return Err(CrawlError::UrlModeViolation {
                location: target.to_string(),
            });
        };

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| CrawlError::Http {
                location: target.to_string(),
                source,
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(CrawlError::UnexpectedStatus {
                location: target.to_string(),
                status: status.as_u16(),
            });
        }

        // Consume the body fully before decoding so the connection is always
        // returned to the pool, even on a decode failure.
        let body = response
            .bytes()
            .await
            .map_err(|source| CrawlError::Http {
                location: target.to_string(),
                source,
            })?;
        serde_json::from_slice(&body).map_err(|source| CrawlError::Decode {
            location: target.to_string(),
            source,
        })
    }
}

/// Shared client used by crawlers that don't bring their own.
fn default_client() -> reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT
        .get_or_init(|| {
            reqwest::Client::builder()
                .user_agent(concat!("stac-crawler/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new())
        })
        .clone()
}
