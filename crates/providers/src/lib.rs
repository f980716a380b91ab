//! Model provider implementations for Statecraft.
//!
//! All providers implement the `statecraft_core::Provider` trait.
//! [`build_from_config`] assembles the configured provider stack.

pub mod openai_compat;
pub mod retry;

pub use openai_compat::OpenAiCompatProvider;
pub use retry::RetryProvider;

use statecraft_config::AppConfig;
use statecraft_core::Provider;
use statecraft_core::error::ProviderError;
use std::sync::Arc;
use std::time::Duration;

/// Build the provider described by `config`: an OpenAI-compatible client
/// wrapped in bounded retry.
///
/// A missing API key is allowed (local OpenAI-compatible servers often need
/// none); the endpoint rejects the request if it does need one.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let llm = &config.llm;
    if llm.api_key.is_none() {
        tracing::warn!(base_url = %llm.base_url, "No API key configured");
    }
    let client = OpenAiCompatProvider::new(
        "openai",
        &llm.base_url,
        llm.api_key.clone().unwrap_or_default(),
    )?;
    let provider = RetryProvider::new(Arc::new(client))
        .with_max_attempts(llm.max_attempts)
        .with_attempt_timeout(Duration::from_secs(llm.request_timeout_secs))
        .with_backoff(Duration::from_millis(llm.retry_backoff_ms));
    Ok(Arc::new(provider))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_from_default_config() {
        let provider = build_from_config(&AppConfig::default()).unwrap();
        assert_eq!(provider.name(), "openai");
    }
}
