//! Policy-driven retry around a skill invocation.

use crate::error::TaskError;
use crate::protocol::RetryPolicy;
use crate::task::SkillInput;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// `policy.max_retries` retries are used up.
///
/// `on_retry(attempt, error, delay)` is called before each sleep, with the
/// 1-based number of the retry about to happen.
///
/// Returns the final result and the number of attempts made.
pub async fn retry_execution<F, Fut, T, R>(
    policy: &RetryPolicy,
    input: &SkillInput,
    mut on_retry: R,
    operation: F,
) -> (Result<T, TaskError>, u32)
where
    F: Fn(SkillInput) -> Fut,
    Fut: Future<Output = Result<T, TaskError>>,
    R: FnMut(u32, &TaskError, Duration),
{
    let mut attempts = 0;

    loop {
        attempts += 1;

        match operation(input.clone()).await {
            Ok(output) => {
                if attempts > 1 {
                    info!(attempts, "Operation succeeded after retry");
                }
                return (Ok(output), attempts);
            }
            Err(e) if e.is_retryable() && attempts <= policy.max_retries => {
                let delay = policy.delay_for(attempts);
                warn!(
                    attempt = attempts,
                    max_attempts = policy.max_retries + 1,
                    error = %e,
                    delay_ms = crate::protocol::duration_ms(delay),
                    "Operation failed, retrying"
                );
                on_retry(attempts, &e, delay);
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if e.is_retryable() && policy.max_retries > 0 {
                    warn!(attempts, error = %e, "Retries exhausted");
                }
                return (Err(e), attempts);
            }
        }
    }
}
