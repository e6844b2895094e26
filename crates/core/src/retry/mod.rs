//! Bounded or unbounded retry with server-driven backoff.
//!
//! An operation reports each failure as [`Failure::Transient`] (worth another
//! attempt) or [`Failure::Permanent`] (returned to the caller immediately).
//! Plain errors converted with `?` are transient.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::metrics::RETRY_ATTEMPTS;

/// Default number of attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay between attempts.
pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);

/// A failed attempt.
#[derive(Debug)]
pub enum Failure<E> {
    /// May succeed if tried again.
    Transient(E),
    /// Retrying cannot help.
    Permanent(E),
}

impl<E> Failure<E> {
    /// Unwrap the underlying error.
    pub fn into_inner(self) -> E {
        match self {
            Failure::Transient(e) | Failure::Permanent(e) => e,
        }
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, Failure::Permanent(_))
    }
}

impl<E> From<E> for Failure<E> {
    fn from(e: E) -> Self {
        Failure::Transient(e)
    }
}

/// Errors that may carry a server-suggested delay (e.g. HTTP `Retry-After`).
pub trait RetryAfter {
    fn retry_after(&self) -> Option<Duration>;
}

type DelayFn<E> = Arc<dyn Fn(u32, &E) -> Duration + Send + Sync>;

/// How many times to try and how long to wait in between.
pub struct RetryPolicy<E> {
    max_attempts: u32,
    delay: DelayFn<E>,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            delay: Arc::clone(&self.delay),
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl<E> Default for RetryPolicy<E> {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: Arc::new(|_, _| DEFAULT_DELAY),
        }
    }
}

impl<E> RetryPolicy<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximum attempts; 0 means unlimited.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Wait a fixed duration between attempts. A zero duration stops after the first failure.
    pub fn with_fixed_delay(mut self, delay: Duration) -> Self {
        self.delay = Arc::new(move |_, _| delay);
        self
    }

    /// Compute the wait from the attempt index (0-based) and the error.
    pub fn with_delay_fn<F>(mut self, delay: F) -> Self
    where
        F: Fn(u32, &E) -> Duration + Send + Sync + 'static,
    {
        self.delay = Arc::new(delay);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn delay_for(&self, attempt: u32, error: &E) -> Duration {
        (self.delay)(attempt, error)
    }
}

impl<E: RetryAfter + 'static> RetryPolicy<E> {
    /// Honour the server-suggested delay when the error carries one.
    pub fn with_retry_after(self, fallback: Duration) -> Self {
        self.with_delay_fn(retry_after_delay(fallback))
    }
}

/// Delay function using the error's retry-after value verbatim, or `fallback`.
pub fn retry_after_delay<E: RetryAfter>(fallback: Duration) -> impl Fn(u32, &E) -> Duration {
    move |_, error| error.retry_after().unwrap_or(fallback)
}

/// Parse a `Retry-After` header given in seconds.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Run `operation` until it succeeds, fails permanently, runs out of attempts,
/// or the delay function returns zero.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy<E>, mut operation: F) -> Result<T, E>
where
    E: fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Failure<E>>>,
{
    let mut attempt: u32 = 0;
    loop {
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(Failure::Permanent(e)) => return Err(e),
            Err(Failure::Transient(e)) => e,
        };

        attempt += 1;
        if policy.max_attempts != 0 && attempt >= policy.max_attempts {
            return Err(error);
        }

        let wait = policy.delay_for(attempt - 1, &error);
        if wait.is_zero() {
            return Err(error);
        }

        debug!(
            attempt = attempt,
            wait_ms = wait.as_millis() as u64,
            error = %error,
            "Retrying after transient failure"
        );
        RETRY_ATTEMPTS.inc();
        tokio::time::sleep(wait).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    struct TestError {
        message: &'static str,
        retry_after: Option<Duration>,
    }

    impl TestError {
        fn new(message: &'static str) -> Self {
            Self {
                message,
                retry_after: None,
            }
        }
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.message)
        }
    }

    impl RetryAfter for TestError {
        fn retry_after(&self) -> Option<Duration> {
            self.retry_after
        }
    }

    fn short_policy() -> RetryPolicy<TestError> {
        RetryPolicy::new().with_fixed_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, TestError> = retry(&short_policy(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(7)
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_uses_whole_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<(), TestError> = retry(&short_policy(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Failure::Transient(TestError::new("boom")))
        })
        .await;

        assert_eq!(result.unwrap_err().message, "boom");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), TestError> = retry(&short_policy(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Failure::Permanent(TestError::new("bad request")))
        })
        .await;

        assert_eq!(result.unwrap_err().message, "bad request");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<&str, TestError> = retry(&short_policy(), || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(Failure::Transient(TestError::new("flaky")))
            } else {
                Ok("done")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_delay_stops_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new()
            .with_max_attempts(10)
            .with_fixed_delay(Duration::ZERO);
        let result: Result<(), TestError> = retry(&policy, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Failure::Transient(TestError::new("stop")))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unlimited_attempts_until_success() {
        let calls = AtomicU32::new(0);
        let policy = short_policy().with_max_attempts(0);
        let result: Result<u32, TestError> = retry(&policy, || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 9 {
                Err(Failure::Transient(TestError::new("again")))
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 9);
        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_is_used_verbatim() {
        let policy = RetryPolicy::new().with_retry_after(Duration::from_secs(1));
        let start = tokio::time::Instant::now();
        let calls = AtomicU32::new(0);

        let result: Result<(), TestError> = retry(&policy, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Failure::Transient(TestError {
                message: "slow down",
                retry_after: Some(Duration::from_secs(30)),
            }))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= Duration::from_secs(60));
    }

    #[test]
    fn test_retry_after_delay_falls_back() {
        let delay = retry_after_delay::<TestError>(Duration::from_secs(1));
        assert_eq!(delay(0, &TestError::new("x")), Duration::from_secs(1));
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
        assert_eq!(parse_retry_after(" 5 "), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn test_failure_into_inner() {
        let f: Failure<&str> = Failure::Permanent("x");
        assert!(f.is_permanent());
        assert_eq!(f.into_inner(), "x");
    }
}
