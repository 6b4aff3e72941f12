//! Retry policy implementation

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential backoff policy for failed tasks
///
/// The retry count is incremented at claim time, so a task that has failed
/// once carries `retry_count = 1` and its first retry waits the base delay,
/// the second twice that, and so on.
///
/// # Example
///
/// ```
/// use caseflow_engine::reliability::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(Duration::from_secs(30));
///
/// assert_eq!(policy.delay_for_retry(1), Duration::from_secs(30));
/// assert_eq!(policy.delay_for_retry(2), Duration::from_secs(60));
/// assert_eq!(policy.delay_for_retry(3), Duration::from_secs(120));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry
    #[serde(with = "duration_millis")]
    pub base_delay: Duration,

    /// Backoff multiplier (2.0 doubles the delay each retry)
    pub backoff_coefficient: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(30),
            backoff_coefficient: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Create a doubling backoff policy with the given base delay
    pub fn new(base_delay: Duration) -> Self {
        Self {
            base_delay,
            backoff_coefficient: 2.0,
        }
    }

    /// Set the base delay
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the backoff coefficient
    pub fn with_backoff_coefficient(mut self, coefficient: f64) -> Self {
        self.backoff_coefficient = coefficient.max(1.0);
        self
    }

    /// Delay before the `retry_count`-th retry (1-based)
    ///
    /// Equals `base_delay * coefficient^(retry_count - 1)`.
    pub fn delay_for_retry(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1);
        let factor = self.backoff_coefficient.powi(exponent as i32);
        Duration::from_secs_f64(self.base_delay.as_secs_f64() * factor)
    }
}

/// Serde support for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
