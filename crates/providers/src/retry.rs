//! Bounded retry around a single provider.
//!
//! Every attempt runs under its own timeout. Transient failures (network,
//! timeout, rate limit, 5xx) are retried with linear backoff up to
//! `max_attempts`; anything else is returned at once.

use async_trait::async_trait;
use rand::Rng;
use statecraft_core::error::ProviderError;
use statecraft_core::provider::{Provider, ProviderRequest, ProviderResponse};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Longest wait honored from a rate-limit response.
const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(30);

pub struct RetryProvider {
    inner: Arc<dyn Provider>,
    max_attempts: u32,
    attempt_timeout: Duration,
    backoff: Duration,
}

impl RetryProvider {
    pub fn new(inner: Arc<dyn Provider>) -> Self {
        Self {
            inner,
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(120),
            backoff: Duration::from_millis(500),
        }
    }

    /// Total attempts, including the first. Clamped to at least one.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Base delay; the n-th retry waits `n * backoff` plus a little jitter.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    fn delay(&self, attempt: u32, error: &ProviderError) -> Duration {
        let linear = self.backoff * attempt;
        let jitter_ms = (self.backoff.as_millis() / 4) as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
        };
        let wait = linear + jitter;
        match error {
            ProviderError::RateLimited { retry_after_secs } => {
                wait.max(Duration::from_secs(*retry_after_secs).min(MAX_RATE_LIMIT_WAIT))
            }
            _ => wait,
        }
    }
}

#[async_trait]
impl Provider for RetryProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut attempt = 1;
        loop {
            let result =
                match tokio::time::timeout(self.attempt_timeout, self.inner.complete(request.clone()))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout(format!(
                        "Provider '{}' timed out after {}s",
                        self.inner.name(),
                        self.attempt_timeout.as_secs()
                    ))),
                };

            let error = match result {
                Ok(response) => {
                    if attempt > 1 {
                        info!(provider = self.inner.name(), attempt, "Retry: provider recovered");
                    }
                    return Ok(response);
                }
                Err(e) => e,
            };

            if !error.is_transient() || attempt >= self.max_attempts {
                return Err(error);
            }

            let delay = self.delay(attempt, &error);
            warn!(
                provider = self.inner.name(),
                attempt,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retry: transient provider error"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        self.inner.health_check().await
    }
}
