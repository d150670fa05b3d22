//! Bounded retry with exponential backoff. Only errors the taxonomy marks
//! retryable are attempted again; deterministic failures return on the
//! first attempt.

use tokio::time::{sleep, Duration};

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl RetryConfig {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
        }
    }
}

pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempt += 1;
                if !e.is_retryable() || attempt >= config.max_attempts {
                    return Err(e);
                }
                sleep(config.initial_delay * 2u32.pow(attempt - 1)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_failures() {
        let attempts = AtomicU32::new(0);
        let config = RetryConfig::new(3, Duration::from_millis(1));
        let result = with_retry(&config, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(EngineError::StorageUnavailable("flaky".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.expect("eventual success"), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn deterministic_errors_fail_fast() {
        let attempts = AtomicU32::new(0);
        let config = RetryConfig::new(5, Duration::from_millis(1));
        let result: Result<()> = with_retry(&config, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(EngineError::AccessDenied) }
        })
        .await;
        assert!(matches!(result, Err(EngineError::AccessDenied)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let attempts = AtomicU32::new(0);
        let config = RetryConfig::new(3, Duration::from_millis(1));
        let result: Result<()> = with_retry(&config, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(EngineError::StorageUnavailable("down".into())) }
        })
        .await;
        assert!(matches!(result, Err(EngineError::StorageUnavailable(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
