//! Retry logic with exponential backoff for transient catalog errors.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, CatalogResult};

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with custom settings.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff_factor,
            ..Self::default()
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    ///
    /// Never negative: a factor below zero yields no delay rather than a
    /// panic in [`Duration::from_secs_f64`].
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = delay.min(self.max_delay.as_secs_f64()).max(0.0);
        Duration::from_secs_f64(capped)
    }

    /// Attempts actually made; zero is treated as one.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Create a config that never retries.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

/// Callback trait for retry progress notifications.
pub trait RetryCallback {
    /// Called before sleeping ahead of the next attempt.
    ///
    /// `attempt` is 1-indexed and names the attempt that just failed.
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &CatalogError, delay: Duration);
}

/// No-op callback that does nothing.
pub struct NoCallback;

impl RetryCallback for NoCallback {
    fn on_retry(
        &self,
        _attempt: u32,
        _max_attempts: u32,
        _error: &CatalogError,
        _delay: Duration,
    ) {
    }
}

/// Callback that reports each retry through the `log` facade.
pub struct LogCallback<'a> {
    /// What is being retried, e.g. `create table:svc.db.public.users`.
    pub operation: &'a str,
}

impl RetryCallback for LogCallback<'_> {
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &CatalogError, delay: Duration) {
        log::warn!(
            "{}: attempt {attempt}/{max_attempts} failed: {error}. Retrying in {:.1}s...",
            self.operation,
            delay.as_secs_f64()
        );
    }
}

/// Execute a catalog operation with retry logic.
///
/// Only errors whose category is retryable are retried; anything else is
/// returned on the spot. When every attempt fails, the last error is
/// returned.
pub fn with_retry<T, F>(
    config: &RetryConfig,
    callback: Option<&dyn RetryCallback>,
    mut operation: F,
) -> CatalogResult<T>
where
    F: FnMut() -> CatalogResult<T>,
{
    let max_attempts = config.attempts();
    let mut attempt = 0;

    loop {
        match operation() {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() || attempt + 1 >= max_attempts => return Err(e),
            Err(e) => {
                let delay = config.delay_for_attempt(attempt);
                if let Some(cb) = callback {
                    cb.on_retry(attempt + 1, max_attempts, &e, delay);
                }
                thread::sleep(delay);
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn fast(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(1),
            backoff_factor: 1.0,
            max_delay: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_delay_for_attempt() {
        let config = RetryConfig::new(5, Duration::from_secs(1), 2.0);
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let config = RetryConfig {
            max_delay: Duration::from_secs(5),
            ..RetryConfig::new(10, Duration::from_secs(1), 2.0)
        };
        assert_eq!(config.delay_for_attempt(8), Duration::from_secs(5));
    }

    #[test]
    fn test_negative_factor_never_yields_negative_delay() {
        let config = RetryConfig::new(3, Duration::from_secs(1), -2.0);
        assert_eq!(config.delay_for_attempt(1), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));

        let nan = RetryConfig::new(3, Duration::from_millis(1), f64::NAN);
        assert!(nan.delay_for_attempt(1) <= nan.max_delay);
    }

    #[test]
    fn test_with_retry_negative_factor_exhausts_attempts() {
        let config = RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            backoff_factor: -2.0,
            max_delay: Duration::from_millis(10),
        };
        let attempts = Rc::new(Cell::new(0));
        let counter = attempts.clone();

        let result: CatalogResult<()> = with_retry(&config, None, || {
            counter.set(counter.get() + 1);
            Err(CatalogError::unavailable("connection refused"))
        });

        assert!(result.unwrap_err().is_retryable());
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn test_zero_attempts_means_one() {
        let config = RetryConfig {
            max_attempts: 0,
            ..fast(0)
        };
        assert_eq!(config.attempts(), 1);
    }

    #[test]
    fn test_with_retry_success_first_try() {
        let result = with_retry(&RetryConfig::no_retry(), None, || Ok::<_, CatalogError>(42));
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn test_with_retry_permanent_error_not_retried() {
        let attempts = Rc::new(Cell::new(0));
        let counter = attempts.clone();

        let result: CatalogResult<()> = with_retry(&fast(3), None, || {
            counter.set(counter.get() + 1);
            Err(CatalogError::rejected("svc.db", "invalid name"))
        });

        assert!(result.is_err());
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn test_with_retry_eventual_success() {
        let attempts = Rc::new(Cell::new(0));
        let counter = attempts.clone();

        let result = with_retry(&fast(3), None, || {
            let current = counter.get();
            counter.set(current + 1);
            if current < 2 {
                Err(CatalogError::http("HTTP 503", Some(503)))
            } else {
                Ok("done")
            }
        });

        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn test_with_retry_all_attempts_fail() {
        let attempts = Rc::new(Cell::new(0));
        let counter = attempts.clone();

        let result: CatalogResult<()> = with_retry(&fast(3), None, || {
            counter.set(counter.get() + 1);
            Err(CatalogError::unavailable("connection refused"))
        });

        assert!(result.unwrap_err().is_retryable());
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn test_zero_attempts_still_runs_once() {
        let attempts = Rc::new(Cell::new(0));
        let counter = attempts.clone();

        let _: CatalogResult<()> = with_retry(&fast(0), None, || {
            counter.set(counter.get() + 1);
            Err(CatalogError::unavailable("down"))
        });

        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn test_callback_invoked_between_attempts() {
        struct CountingCallback(Rc<Cell<u32>>);
        impl RetryCallback for CountingCallback {
            fn on_retry(&self, _: u32, _: u32, _: &CatalogError, _: Duration) {
                self.0.set(self.0.get() + 1);
            }
        }

        let count = Rc::new(Cell::new(0));
        let callback = CountingCallback(count.clone());

        let _: CatalogResult<()> = with_retry(&fast(3), Some(&callback), || {
            Err(CatalogError::unavailable("timeout"))
        });

        assert_eq!(count.get(), 2);
    }
}
