pub mod client;
pub mod error;
pub mod types;

use serde::{Deserialize, Serialize};

pub use client::OpenRouterClient;
pub use error::ProviderError;
pub use types::{Inference, InferenceRequest};

/// Capability used by stage strategies that need a language model.
///
/// Calls are synchronous from the caller's point of view; workflow stages run
/// on blocking workers.
pub trait ReasoningProvider: Send + Sync {
    fn infer(&self, request: &InferenceRequest) -> Result<Inference, ProviderError>;
}

/// Retry behaviour for transient provider failures inside a stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total calls allowed, first one included.
    pub max_calls: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_calls: 3,
            base_delay_ms: 1000,
        }
    }
}

/// Upper bound on any single backoff sleep.
pub const MAX_DELAY_MS: u64 = 60_000;

impl RetryConfig {
    /// delay = base_delay_ms * 2^(attempt - 1), capped at [`MAX_DELAY_MS`].
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        2u64.checked_pow(attempt.saturating_sub(1))
            .map_or(u64::MAX, |factor| self.base_delay_ms.saturating_mul(factor))
            .min(MAX_DELAY_MS)
    }

    /// Delay before retrying after `err`; a server-provided hint wins.
    pub fn delay_after(&self, attempt: u32, err: &ProviderError) -> u64 {
        match err {
            ProviderError::RateLimited { retry_after_ms } => (*retry_after_ms).min(MAX_DELAY_MS),
            _ => self.delay_for_attempt(attempt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_config_exponential_backoff() {
        let config = RetryConfig {
            max_calls: 5,
            base_delay_ms: 1000,
        };
        assert_eq!(config.delay_for_attempt(1), 1000);
        assert_eq!(config.delay_for_attempt(2), 2000);
        assert_eq!(config.delay_for_attempt(3), 4000);
    }

    #[test]
    fn rate_limit_hint_overrides_backoff() {
        let config = RetryConfig::default();
        let err = ProviderError::RateLimited {
            retry_after_ms: 250,
        };
        assert_eq!(config.delay_after(3, &err), 250);
    }

    #[test]
    fn backoff_is_capped_for_large_attempts() {
        let config = RetryConfig {
            max_calls: 100,
            base_delay_ms: 1000,
        };
        assert_eq!(config.delay_for_attempt(65), MAX_DELAY_MS);
        assert_eq!(config.delay_for_attempt(u32::MAX), MAX_DELAY_MS);
        let err = ProviderError::RateLimited {
            retry_after_ms: u64::MAX,
        };
        assert_eq!(config.delay_after(1, &err), MAX_DELAY_MS);
    }
}
