//! The shared HTTP transport every worker issues calls through.

use std::time::Duration;

use anyhow::Context;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;

use crate::config::Config;

/// User agent reported to the service under test.
const USER_AGENT: &str = concat!("kvstress/", env!("CARGO_PKG_VERSION"));

/// Failures below the HTTP layer: the call never produced a final status.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The call exceeded the per-request timeout. Timed-out calls are
    /// abandoned, never re-sent.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    /// Every attempt failed with a retryable connection error.
    #[error("retry budget exhausted after {attempts} attempts: {source}")]
    BudgetExhausted {
        /// Attempts performed, including the first.
        attempts: u32,
        /// The error of the final attempt.
        source: reqwest::Error,
    },
    /// A non-retryable request error.
    #[error(transparent)]
    Request(#[from] reqwest::Error),
}

/// The transport's retry behavior, separated out so it can be exercised
/// without a live socket.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts for one logical call, including the first.
    pub max_attempts: u32,
    /// Backoff before the first retry; doubles on every further one.
    pub base_backoff: Duration,
}

impl RetryPolicy {
    /// Backoff before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        self.base_backoff * 2u32.saturating_pow(retry.saturating_sub(1))
    }

    /// Statuses worth another attempt: transient gateway-side failures.
    /// Anything else is a real answer and goes into the breakdown as-is.
    pub fn is_retryable_status(&self, status: StatusCode) -> bool {
        matches!(status.as_u16(), 502 | 503 | 504)
    }

    /// Errors worth another attempt: connection-level failures. Timeouts are
    /// terminal.
    pub fn is_retryable_error(&self, error: &reqwest::Error) -> bool {
        !error.is_timeout() && error.is_connect()
    }
}

/// The final status and raw body of a completed call, handed back
/// uninterpreted. Classifying the status is the executor's job.
#[derive(Debug, Clone)]
pub struct Exchange {
    /// HTTP status the server answered with.
    pub status: StatusCode,
    /// Raw response body.
    pub body: String,
}

/// A single pooled client shared by every worker.
///
/// Cloning is cheap and shares the underlying connection pool, so all
/// workers reuse the same sockets instead of paying per-request connection
/// setup.
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
    timeout: Duration,
}

impl Transport {
    /// Builds the shared client from a configuration.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .pool_max_idle_per_host(config.effective_pool_size())
            .tcp_nodelay(true)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            retry: config.retry_policy(),
            timeout: config.timeout,
        })
    }

    /// Sends one request, applying the retry policy, and returns the final
    /// exchange.
    ///
    /// A retryable status that survives the whole budget is still returned
    /// as an exchange (a 503 on the last attempt is an answer, not a
    /// transport failure); a connection error that survives the budget
    /// becomes [`TransportError::BudgetExhausted`].
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Exchange, TransportError> {
        let mut attempt = 1;
        loop {
            match self.send_once(method.clone(), path, body).await {
                Ok(exchange) => {
                    if attempt < self.retry.max_attempts
                        && self.retry.is_retryable_status(exchange.status)
                    {
                        tracing::debug!(path, status = %exchange.status, attempt, "retrying");
                        tokio::time::sleep(self.retry.backoff(attempt)).await;
                        attempt += 1;
                        continue;
                    }
                    return Ok(exchange);
                }
                Err(error) if error.is_timeout() => {
                    return Err(TransportError::Timeout(self.timeout));
                }
                Err(error) if self.retry.is_retryable_error(&error) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(TransportError::BudgetExhausted {
                            attempts: attempt,
                            source: error,
                        });
                    }
                    tracing::debug!(path, %error, attempt, "retrying");
                    tokio::time::sleep(self.retry.backoff(attempt)).await;
                    attempt += 1;
                }
                Err(error) => return Err(TransportError::Request(error)),
            }
        }
    }

    async fn send_once(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Exchange, reqwest::Error> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        Ok(Exchange { status, body })
    }
}
