//! Retry policy for API requests.
//!
//! Fixed delay between attempts, no exponential growth and no jitter.

use std::time::Duration;

use crate::config::FetchSettings;

use super::error::ApiError;

/// Fixed-delay retry policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per request, first one included.
    pub max_attempts: u32,
    /// Pause between two attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Create a new RetryPolicy from configuration settings.
    pub fn new(settings: &FetchSettings) -> Self {
        Self {
            max_attempts: settings.max_retries.max(1),
            delay: settings.retry_delay,
        }
    }

    /// Whether another attempt is allowed after `attempt` attempts have failed.
    pub fn has_attempts_left(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Check if an error should be retried given the number of attempts made.
    ///
    /// Used for single-item requests: only transient errors are retried.
    pub fn should_retry(&self, error: &ApiError, attempt: u32) -> bool {
        error.is_transient() && self.has_attempts_left(attempt)
    }

    /// Block the calling thread for the configured delay.
    pub fn wait(&self) {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(&FetchSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16) -> ApiError {
        ApiError::Status {
            url: "https://api/x".to_string(),
            status,
            message: String::new(),
        }
    }

    #[test]
    fn test_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay, Duration::from_secs(5));
    }

    #[test]
    fn test_new_from_settings() {
        let policy = RetryPolicy::new(&FetchSettings {
            max_retries: 7,
            retry_delay: Duration::from_millis(10),
        });
        assert_eq!(policy.max_attempts, 7);
        assert_eq!(policy.delay, Duration::from_millis(10));
    }

    #[test]
    fn test_zero_retries_still_allows_one_attempt() {
        let policy = RetryPolicy::new(&FetchSettings {
            max_retries: 0,
            retry_delay: Duration::ZERO,
        });
        assert_eq!(policy.max_attempts, 1);
        assert!(!policy.has_attempts_left(1));
    }

    #[test]
    fn test_attempt_budget() {
        let policy = RetryPolicy::default();
        assert!(policy.has_attempts_left(1));
        assert!(policy.has_attempts_left(2));
        assert!(!policy.has_attempts_left(3));
    }

    #[test]
    fn test_should_retry_server_errors_only() {
        let policy = RetryPolicy::default();

        assert!(policy.should_retry(&status(500), 1));
        assert!(policy.should_retry(&status(503), 2));
        assert!(policy.should_retry(&ApiError::Transport("timed out".into()), 1));

        // Client errors never retried, regardless of attempt count
        assert!(!policy.should_retry(&status(400), 1));
        assert!(!policy.should_retry(&status(404), 1));
        assert!(!policy.should_retry(&ApiError::Auth("bad secret".into()), 1));

        // Budget exhausted
        assert!(!policy.should_retry(&status(503), 3));
    }
}
