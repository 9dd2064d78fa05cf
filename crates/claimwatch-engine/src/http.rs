//! HTTP [`Transport`] over `reqwest`.
//!
//! Every request carries the configured timeout and user agent. Failed
//! attempts are retried after a fixed delay; once the attempts are spent the
//! last error is returned wrapped in [`FetchError::Exhausted`].

use std::time::Duration;

use claimwatch_core::config::SourceConfig;
use claimwatch_core::transport::{FetchError, Transport};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::EngineError;

/// Fetches JSON documents over HTTP with retry.
pub struct HttpTransport {
    client: reqwest::Client,
    max_attempts: u32,
    retry_delay: Duration,
}

impl HttpTransport {
    /// Build a transport from the source settings.
    pub fn new(config: &SourceConfig) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| EngineError::Http {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            max_attempts: config.max_attempts.max(1),
            retry_delay: config.retry_delay(),
        })
    }

    /// Attempts made per fetch.
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    async fn fetch_once(&self, url: &str) -> Result<Value, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Request {
                url: url.to_owned(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_owned(),
                status: status.as_u16(),
            });
        }

        response.json().await.map_err(|e| FetchError::Decode {
            url: url.to_owned(),
            message: e.to_string(),
        })
    }
}

impl Transport for HttpTransport {
    async fn fetch(&self, url: &str) -> Result<Value, FetchError> {
        let mut attempt: u32 = 1;
        loop {
            match self.fetch_once(url).await {
                Ok(document) => {
                    debug!(url, attempt, "Fetched document");
                    return Ok(document);
                }
                Err(e) if attempt >= self.max_attempts => {
                    return Err(FetchError::Exhausted {
                        url: url.to_owned(),
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    warn!(
                        url,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Fetch failed, retrying"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config(max_attempts: u32) -> SourceConfig {
        SourceConfig {
            max_attempts,
            retry_delay_secs: 0,
            timeout_secs: 2,
            ..SourceConfig::default()
        }
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let t = HttpTransport::new(&config(0)).unwrap();
        assert_eq!(t.max_attempts(), 1);
    }

    #[tokio::test]
    async fn unreachable_host_exhausts_attempts() {
        let t = HttpTransport::new(&config(2)).unwrap();
        let err = t.fetch("http://127.0.0.1:1/up/world").await.unwrap_err();
        match err {
            FetchError::Exhausted { attempts, last, .. } => {
                assert_eq!(attempts, 2);
                assert!(matches!(*last, FetchError::Request { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
