// src/utils/timeout.rs
// Timeout utilities

use futures::Future;
use std::time::Duration;

use crate::error::{ApiError, ApiResult};

/// Execute an operation with a wall-clock budget. A blown budget surfaces as
/// a transient external error so the retry wrapper can re-attempt it.
pub async fn with_timeout<F, T>(duration: Duration, operation: F, operation_name: &str) -> ApiResult<T>
where
    F: Future<Output = ApiResult<T>>,
{
    match tokio::time::timeout(duration, operation).await {
        Ok(result) => result,
        Err(_) => Err(ApiError::external(format!(
            "{} timed out after {:?}",
            operation_name, duration
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passes_through_fast_ops() {
        let out = with_timeout(Duration::from_secs(1), async { Ok(42) }, "fast").await;
        assert_eq!(out.unwrap(), 42);
    }

    #[tokio::test]
    async fn times_out_slow_ops() {
        let out: ApiResult<()> = with_timeout(
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
            "slow",
        )
        .await;
        let err = out.unwrap_err();
        assert!(err.is_transient());
    }
}
