//! Engine configuration

use std::time::Duration;

use rand::Rng;

use crate::engine::queues;

/// Configuration for a worker process
///
/// Built from the environment (`CASEFLOW_*` variables) or assembled with
/// the builder methods.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Unique worker identity stamped onto locks and journal entries
    pub worker_id: String,

    /// Queues this worker claims from
    pub queues: Vec<String>,

    /// Concurrency budget: maximum tasks in flight at once
    pub max_concurrent_tasks: usize,

    /// Sleep between polls when the queue is empty
    pub poll_interval: Duration,

    /// How long a claim is exclusively owned before other workers may
    /// reclaim it
    pub lease_duration: Duration,

    /// Base delay for exponential retry backoff
    pub base_retry_delay: Duration,

    /// Retry budget for nodes that do not configure one
    pub default_max_retries: i32,

    /// Whether this worker executes language-model tasks
    pub llm_enabled: bool,

    /// How long shutdown waits for in-flight tasks to drain
    pub shutdown_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_id: default_worker_id(),
            queues: vec![queues::DEFAULT.to_string(), queues::LLM.to_string()],
            max_concurrent_tasks: 5,
            poll_interval: Duration::from_secs(2),
            lease_duration: Duration::from_secs(15 * 60),
            base_retry_delay: Duration::from_secs(30),
            default_max_retries: 3,
            llm_enabled: true,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from `CASEFLOW_*` environment variables,
    /// falling back to defaults for anything unset
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(worker_id) = std::env::var("CASEFLOW_WORKER_ID") {
            config.worker_id = worker_id;
        }
        if let Ok(queues) = std::env::var("CASEFLOW_QUEUES") {
            let parsed: Vec<String> = queues
                .split(',')
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty())
                .collect();
            if !parsed.is_empty() {
                config.queues = parsed;
            }
        }
        if let Some(value) = env_parse("CASEFLOW_MAX_CONCURRENT_TASKS") {
            config.max_concurrent_tasks = value;
        }
        if let Some(secs) = env_parse("CASEFLOW_POLL_INTERVAL_SECS") {
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse("CASEFLOW_LEASE_DURATION_SECS") {
            config.lease_duration = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse("CASEFLOW_BASE_RETRY_DELAY_SECS") {
            config.base_retry_delay = Duration::from_secs(secs);
        }
        if let Some(value) = env_parse("CASEFLOW_DEFAULT_MAX_RETRIES") {
            config.default_max_retries = value;
        }
        if let Ok(value) = std::env::var("CASEFLOW_LLM_ENABLED") {
            config.llm_enabled = matches!(value.as_str(), "1" | "true" | "yes");
        }
        if let Some(secs) = env_parse("CASEFLOW_SHUTDOWN_TIMEOUT_SECS") {
            config.shutdown_timeout = Duration::from_secs(secs);
        }

        config
    }

    /// Set the worker identity
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    /// Set the claimed queues
    pub fn with_queues(mut self, queues: Vec<String>) -> Self {
        self.queues = queues;
        self
    }

    /// Set the concurrency budget
    pub fn with_max_concurrent_tasks(mut self, max: usize) -> Self {
        self.max_concurrent_tasks = max.max(1);
        self
    }

    /// Set the idle poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the claim lease duration
    pub fn with_lease_duration(mut self, lease: Duration) -> Self {
        self.lease_duration = lease;
        self
    }

    /// Set the base retry delay
    pub fn with_base_retry_delay(mut self, delay: Duration) -> Self {
        self.base_retry_delay = delay;
        self
    }

    /// Set the default retry budget
    pub fn with_default_max_retries(mut self, max_retries: i32) -> Self {
        self.default_max_retries = max_retries.max(1);
        self
    }

    /// Enable or disable language-model tasks
    pub fn with_llm_enabled(mut self, enabled: bool) -> Self {
        self.llm_enabled = enabled;
        self
    }

    /// Set the shutdown drain timeout
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Default worker identity: host name plus a random suffix, so several
/// workers on one machine stay distinguishable
fn default_worker_id() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "worker".to_string());
    let suffix: u32 = rand::thread_rng().gen_range(0x1000..0xffff);
    format!("{host}-{suffix:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(!config.worker_id.is_empty());
        assert_eq!(config.queues, vec!["default", "llm"]);
        assert_eq!(config.max_concurrent_tasks, 5);
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.lease_duration, Duration::from_secs(900));
        assert_eq!(config.base_retry_delay, Duration::from_secs(30));
        assert_eq!(config.default_max_retries, 3);
        assert!(config.llm_enabled);
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::new()
            .with_worker_id("worker-a")
            .with_queues(vec!["default".to_string()])
            .with_max_concurrent_tasks(12)
            .with_lease_duration(Duration::from_secs(60))
            .with_llm_enabled(false);

        assert_eq!(config.worker_id, "worker-a");
        assert_eq!(config.queues, vec!["default"]);
        assert_eq!(config.max_concurrent_tasks, 12);
        assert_eq!(config.lease_duration, Duration::from_secs(60));
        assert!(!config.llm_enabled);
    }

    #[test]
    fn test_concurrency_floor() {
        let config = EngineConfig::new().with_max_concurrent_tasks(0);
        assert_eq!(config.max_concurrent_tasks, 1);
    }

    #[test]
    fn test_worker_ids_are_distinct() {
        let a = default_worker_id();
        let b = default_worker_id();
        assert_ne!(a, b);
    }
}
