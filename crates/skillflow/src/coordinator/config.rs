//! Configuration for a coordinator run.

use crate::protocol::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What happens to the rest of a run when one task fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop at the first failure. Every task not yet run is reported as skipped.
    FailFast,
    /// Keep going with tasks that do not depend on the failed one, directly
    /// or transitively. Dependents are skipped, never executed.
    #[default]
    #[serde(rename = "continue", alias = "continue_independent")]
    ContinueIndependent,
}

/// Execution settings for [`ExecutionCoordinator`](super::ExecutionCoordinator).
///
/// # Examples
///
/// ```ignore
/// use skillflow::coordinator::{CoordinatorConfig, FailurePolicy};
/// use skillflow::protocol::RetryPolicy;
/// use std::time::Duration;
///
/// let config = CoordinatorConfig::new()
///     .with_failure_policy(FailurePolicy::FailFast)
///     .with_task_timeout(Duration::from_secs(300))
///     .with_retry_policy(RetryPolicy::new(2, Duration::from_millis(500)));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub failure_policy: FailurePolicy,

    /// Deadline for one task, covering all of its retries.
    ///
    /// If `None`, no timeout is applied.
    pub task_timeout: Option<Duration>,

    /// Retry settings applied to retryable skill errors.
    ///
    /// **Default:** no retries.
    pub retry: RetryPolicy,

    /// Delay after each executed task, before the next one starts.
    ///
    /// `Duration::ZERO` means no delay. Useful when skills call rate-limited
    /// services.
    pub min_task_interval: Duration,
}

impl CoordinatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = Some(timeout);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_min_task_interval(mut self, interval: Duration) -> Self {
        self.min_task_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.failure_policy, FailurePolicy::ContinueIndependent);
        assert!(config.task_timeout.is_none());
        assert_eq!(config.retry.max_retries, 0);
        assert_eq!(config.min_task_interval, Duration::ZERO);
    }

    #[test]
    fn test_builder() {
        let config = CoordinatorConfig::new()
            .with_failure_policy(FailurePolicy::FailFast)
            .with_task_timeout(Duration::from_secs(5))
            .with_retry_policy(RetryPolicy::new(2, Duration::from_millis(10)))
            .with_min_task_interval(Duration::from_millis(50));

        assert_eq!(config.failure_policy, FailurePolicy::FailFast);
        assert_eq!(config.task_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.min_task_interval, Duration::from_millis(50));
    }

    #[test]
    fn test_failure_policy_names() {
        let policy: FailurePolicy = serde_json::from_str("\"fail_fast\"").unwrap();
        assert_eq!(policy, FailurePolicy::FailFast);

        let policy: FailurePolicy = serde_json::from_str("\"continue\"").unwrap();
        assert_eq!(policy, FailurePolicy::ContinueIndependent);

        assert_eq!(
            serde_json::to_string(&FailurePolicy::ContinueIndependent).unwrap(),
            "\"continue\""
        );
    }
}
