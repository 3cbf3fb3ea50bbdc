// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry logic with exponential backoff.
//!
//! Node fetches and root advises both ride on an unreliable transport, so
//! each gets a preset:
//!
//! ```
//! use ndn_sync::RetryConfig;
//!
//! // Node fetch: a few quick attempts, then abandon the branch
//! let fetch = RetryConfig::node_fetch();
//! assert_eq!(fetch.max_retries, Some(3));
//!
//! // Root advise: the poll loop is the retry, one attempt per round
//! let advise = RetryConfig::root_advise();
//! assert_eq!(advise.max_retries, Some(1));
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for operation retry behavior.
///
/// `max_retries` counts total attempts; `None` retries forever.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    pub max_retries: Option<usize>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::node_fetch()
    }
}

impl RetryConfig {
    /// Bounded retry for a single node fetch.
    #[must_use]
    pub fn node_fetch() -> Self {
        Self {
            max_retries: Some(3),
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
        }
    }

    /// Root advise is re-issued by the poll loop, so one attempt per round.
    #[must_use]
    pub fn root_advise() -> Self {
        Self {
            max_retries: Some(1),
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            factor: 2.0,
        }
    }

    /// Fast retry for tests (minimal delays)
    #[must_use]
    pub fn test() -> Self {
        Self {
            max_retries: Some(3),
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            factor: 2.0,
        }
    }
}

/// Retry `operation` until it succeeds or attempts run out. Errors that
/// `should_retry` rejects are returned at once.
pub async fn retry_when<F, Fut, T, E, P>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut delay = config.initial_delay;
    let mut attempts = 0;

    loop {
        match operation().await {
            Ok(val) => {
                if attempts > 0 {
                    debug!(operation = operation_name, attempts, "Succeeded after retries");
                }
                return Ok(val);
            }
            Err(err) => {
                attempts += 1;

                if !should_retry(&err) {
                    return Err(err);
                }

                match config.max_retries {
                    Some(max) if attempts >= max => return Err(err),
                    Some(max) => warn!(
                        "Operation '{}' failed (attempt {}/{}): {}. Retrying in {:?}...",
                        operation_name, attempts, max, err, delay
                    ),
                    None => warn!(
                        "Operation '{}' failed (attempt {}, will retry forever): {}. Next retry in {:?}...",
                        operation_name, attempts, err, delay
                    ),
                }

                sleep(delay).await;
                delay = (delay.mul_f64(config.factor)).min(config.max_delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct TestError {
        msg: String,
        fatal: bool,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.msg)
        }
    }

    fn transient(msg: &str) -> TestError {
        TestError { msg: msg.to_string(), fatal: false }
    }

    #[tokio::test]
    async fn test_retry_succeeds_first_try() {
        let result: Result<i32, TestError> = retry_when(
            "test_op",
            &RetryConfig::test(),
            || async { Ok(42) },
            |e: &TestError| !e.fatal,
        )
        .await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<i32, TestError> = retry_when(
            "test_op",
            &RetryConfig::test(),
            || {
                let a = attempts_clone.clone();
                async move {
                    let count = a.fetch_add(1, Ordering::SeqCst) + 1;
                    if count < 3 {
                        Err(transient(&format!("fail {}", count)))
                    } else {
                        Ok(42)
                    }
                }
            },
            |e: &TestError| !e.fatal,
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausts_retries() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<i32, TestError> = retry_when(
            "test_op",
            &RetryConfig::test(),
            || {
                let a = attempts_clone.clone();
                async move {
                    a.fetch_add(1, Ordering::SeqCst);
                    Err(transient("always fail"))
                }
            },
            |e: &TestError| !e.fatal,
        )
        .await;

        assert!(result.unwrap_err().msg.contains("always fail"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_stops_on_fatal() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<i32, TestError> = retry_when(
            "test_op",
            &RetryConfig::test(),
            || {
                let a = attempts_clone.clone();
                async move {
                    a.fetch_add(1, Ordering::SeqCst);
                    Err(TestError { msg: "bad version".into(), fatal: true })
                }
            },
            |e: &TestError| !e.fatal,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_retry_config_presets() {
        assert_eq!(RetryConfig::node_fetch().max_retries, Some(3));
        assert_eq!(RetryConfig::root_advise().max_retries, Some(1));
        assert_eq!(RetryConfig::default(), RetryConfig::node_fetch());
    }

    #[test]
    fn test_delay_caps_at_max() {
        let config = RetryConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            factor: 10.0,
            max_retries: Some(5),
        };

        let delay = (config.initial_delay.mul_f64(config.factor)).min(config.max_delay);
        assert_eq!(delay, Duration::from_secs(5));
    }
}
