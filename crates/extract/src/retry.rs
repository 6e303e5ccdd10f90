use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// A failed attempt, classified by whether repeating it can help.
#[derive(Debug)]
pub enum Attempt<E> {
    /// Connection loss, timeouts, overloaded or erroring server.
    Transient(E),
    /// Bad request, unparseable reply. Returned without retrying.
    Permanent(E),
}

impl<E> Attempt<E> {
    pub fn into_inner(self) -> E {
        match self {
            Attempt::Transient(e) | Attempt::Permanent(e) => e,
        }
    }
}

/// Exponential backoff for transient failures of a generative backend.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: usize,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, 500, 5000)
    }
}

impl RetryPolicy {
    pub fn new(max_retries: usize, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::from_millis(initial_backoff_ms),
            max_backoff: Duration::from_millis(max_backoff_ms),
        }
    }

    pub fn none() -> Self {
        Self::new(0, 0, 0)
    }

    /// Delay before retry number `retry` (1-based), doubling up to the cap.
    pub fn backoff_for(&self, retry: usize) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1).min(31) as u32);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Runs `f` until it succeeds, fails permanently, or the retry budget for
    /// `operation` is spent.
    pub async fn execute<F, Fut, T, E>(&self, operation: &str, mut f: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Attempt<E>>>,
        E: Display,
    {
        let mut retries = 0;
        loop {
            let error = match f().await {
                Ok(value) => {
                    if retries > 0 {
                        debug!(operation, retries, "Recovered after retrying");
                    }
                    return Ok(value);
                }
                Err(Attempt::Permanent(e)) => {
                    warn!(operation, error = %e, "Not retrying permanent failure");
                    return Err(e);
                }
                Err(Attempt::Transient(e)) => e,
            };

            if retries >= self.max_retries {
                warn!(operation, attempts = retries + 1, error = %error, "Retries exhausted");
                return Err(error);
            }
            retries += 1;
            let backoff = self.backoff_for(retries);
            warn!(
                operation,
                retry = retries,
                backoff_ms = backoff.as_millis() as u64,
                error = %error,
                "Transient failure, backing off"
            );
            sleep(backoff).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let policy = RetryPolicy::new(3, 1, 2);
        let attempts = AtomicUsize::new(0);

        let result: Result<&str, String> = policy
            .execute("flaky", || async {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Attempt::Transient("connection reset".to_string()))
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let policy = RetryPolicy::new(3, 1, 2);
        let attempts = AtomicUsize::new(0);

        let result: Result<(), String> = policy
            .execute("parse", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(Attempt::Permanent("unexpected reply".to_string()))
            })
            .await;

        assert_eq!(result, Err("unexpected reply".to_string()));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let policy = RetryPolicy::new(1, 1, 1);
        let attempts = AtomicUsize::new(0);

        let result: Result<(), String> = policy
            .execute("down", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(Attempt::Transient("503".to_string()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let policy = RetryPolicy::new(5, 100, 350);
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(350));
        assert_eq!(RetryPolicy::none().backoff_for(1), Duration::ZERO);
    }
}
