use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::{Config, PERSIST_BACKOFF_MS, PERSIST_MAX_ATTEMPTS};
use crate::error::{AppError, Result};

/// Bounded retry with a backoff table, injected into every fetch-capable
/// component instead of looping on failure inline.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before attempt n+1 is `backoff_ms[n-1]`; the last entry repeats.
    pub backoff_ms: Vec<u64>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_ms: Vec<u64>) -> Self {
        Self { max_attempts: max_attempts.max(1), backoff_ms }
    }

    pub fn scraping(cfg: &Config) -> Self {
        Self::new(cfg.retry_max_attempts, cfg.retry_backoff_ms.clone())
    }

    /// One retry for transient connection issues.
    pub fn persistence() -> Self {
        Self::new(PERSIST_MAX_ATTEMPTS, PERSIST_BACKOFF_MS.to_vec())
    }

    fn delay(&self, attempt: u32) -> Duration {
        let idx = (attempt.saturating_sub(1) as usize).min(self.backoff_ms.len().saturating_sub(1));
        Duration::from_millis(self.backoff_ms.get(idx).copied().unwrap_or(0))
    }

    /// Retry `op` while it fails with a retryable scraping error.
    pub async fn run<T, F, Fut>(&self, what: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_if(what, AppError::is_retryable, op).await
    }

    pub async fn run_if<T, F, Fut, P>(&self, what: &str, retryable: P, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&AppError) -> bool,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if attempt < self.max_attempts && retryable(&e) => {
                    let delay = self.delay(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        "{what} failed: {e}; retrying in {}ms",
                        delay.as_millis(),
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, vec![1, 2]);
        let res: Result<()> = policy
            .run("listing", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::Fetch("connection reset".to_string()))
            })
            .await;
        assert!(matches!(res, Err(AppError::Fetch(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, vec![1]);
        let res = policy
            .run("page", || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(AppError::Parse("table missing".to_string()))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(res.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_retryable_error_returns_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, vec![10]);
        let res: Result<()> = policy
            .run("write", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::Config("bad".to_string()))
            })
            .await;
        assert!(res.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn persistence_policy_retries_database_errors_once() {
        let policy = RetryPolicy::persistence();

        let calls = AtomicU32::new(0);
        let res: Result<()> = policy
            .run_if("order book insert", AppError::is_persistence, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::Persistence(sqlx::Error::PoolTimedOut))
            })
            .await;
        assert!(matches!(res, Err(AppError::Persistence(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let calls = AtomicU32::new(0);
        let res: Result<()> = policy
            .run_if("order book insert", AppError::is_persistence, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::Fetch("connection reset".to_string()))
            })
            .await;
        assert!(res.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn last_backoff_entry_repeats() {
        let policy = RetryPolicy::new(5, vec![100, 200]);
        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(200));
        assert_eq!(policy.delay(4), Duration::from_millis(200));
    }
}
