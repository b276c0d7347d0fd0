// src/retry.rs
//! Opt-in retry around `CryptoClient::fetch`. Only transient failures
//! (network, timeout, 429, 5xx) are retried, with doubling backoff.

use std::time::Duration;

use crate::client::CryptoClient;
use crate::error::FetchError;
use crate::orchestrator::{FetchOptions, Fetched};
use crate::projection::DomainObject;
use crate::request::Params;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u8,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`.
    pub fn backoff(&self, attempt: u8) -> Duration {
        let shift = u32::from(attempt.saturating_sub(1)).min(16);
        self.base_delay.saturating_mul(1u32 << shift)
    }
}

pub async fn fetch_with_retry(
    client: &CryptoClient,
    operation: &str,
    params: &Params,
    options: FetchOptions,
    policy: RetryPolicy,
) -> Result<Fetched<DomainObject>, FetchError> {
    let mut attempt: u8 = 0;
    loop {
        attempt += 1;
        match client.fetch(operation, params, options.clone()).await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.backoff(attempt);
                tracing::debug!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying transient failure"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_base() {
        let p = RetryPolicy::default();
        assert_eq!(p.backoff(1), Duration::from_millis(500));
        assert_eq!(p.backoff(2), Duration::from_millis(1000));
        assert_eq!(p.backoff(3), Duration::from_millis(2000));
    }
}
