use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::config::GenerationConfig;
use crate::errors::InferenceError;
use crate::providers::{InferenceClient, InferenceRequest, InferenceResponse};

/// Per-call timeout plus bounded retries for one enrichment call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub call_timeout: Duration,
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            call_timeout: config.enrichment_timeout,
            max_retries: config.enrichment_max_retries,
            base_delay: config.retry_base_delay,
            max_delay: config.retry_max_delay,
        }
    }

    /// Delay before retry number `retry` (1-based).
    ///
    /// `Retry-After` is honoured up to `max_delay` with ±10% jitter; otherwise
    /// exponential backoff with full jitter.
    pub fn backoff(&self, retry: u32, err: &InferenceError) -> Duration {
        if self.max_delay.is_zero() {
            return Duration::ZERO;
        }
        match err {
            InferenceError::RateLimited {
                retry_after: Some(retry_after),
            } => {
                let base_ms = (*retry_after).min(self.max_delay).as_millis() as u64;
                let jitter_factor: f64 = rand::thread_rng().gen_range(0.9_f64..=1.1_f64);
                let jittered_ms = ((base_ms as f64) * jitter_factor).round() as u64;
                Duration::from_millis(jittered_ms)
            }
            _ => {
                let factor = 1u32 << retry.saturating_sub(1).min(16);
                let base = self.base_delay.saturating_mul(factor).min(self.max_delay);
                let jittered_ms = rand::thread_rng().gen_range(0..=base.as_millis() as u64);
                Duration::from_millis(jittered_ms)
            }
        }
    }
}

/// Call `client` until it answers, a non-retryable error occurs, or retries
/// run out. Each attempt is bounded by `policy.call_timeout`.
pub async fn complete_with_retry(
    client: &dyn InferenceClient,
    request: &InferenceRequest,
    policy: &RetryPolicy,
) -> Result<InferenceResponse, InferenceError> {
    let mut retries = 0;

    loop {
        let result = match tokio::time::timeout(policy.call_timeout, client.complete(request)).await
        {
            Ok(result) => result,
            Err(_) => Err(InferenceError::Timeout(policy.call_timeout)),
        };

        match result {
            Ok(response) => return Ok(response),
            Err(e) if e.is_retryable() && retries < policy.max_retries => {
                retries += 1;
                let backoff = policy.backoff(retries, &e);

                warn!(
                    rule_identifier = %request.rule_identifier,
                    error = %e,
                    retry = retries,
                    max_retries = policy.max_retries,
                    backoff_ms = backoff.as_millis(),
                    "retrying enrichment call"
                );

                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}
