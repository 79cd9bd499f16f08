// src/llm/retry.rs
// One reusable retry wrapper for external calls. Applied per call site,
// never nested.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::ApiResult;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub factor: u32,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Node-boundary policy for transient external errors: 3 attempts,
    /// 1 s base, doubling, capped at 10 s.
    pub fn external() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            factor: 2,
            max_delay: Duration::from_secs(10),
        }
    }

    /// Zero-delay variant so test suites do not sleep.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            factor: 1,
            max_delay: Duration::ZERO,
        }
    }
}

/// Run `op` until it succeeds, fails non-transiently, or exhausts the
/// policy. Only errors whose `is_transient()` holds are re-attempted.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, op_name: &str, mut op: F) -> ApiResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ApiResult<T>>,
{
    let mut delay = policy.base_delay;
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                warn!(
                    operation = op_name,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %e,
                    "transient failure, backing off"
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * policy.factor, policy.max_delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
