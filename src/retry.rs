//! Exponential backoff with jitter for startup calls
//!
//! The controller has to reach the API server before it can do anything
//! (installing the CRD, discovering the cluster). Those calls are retried
//! here instead of crash-looping the pod. Reconciliation failures are not
//! retried in-process; they go back to the controller's work queue.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

/// How often and how patiently to retry an operation
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, 0 retries forever
    pub max_attempts: u32,
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Upper bound for the delay between attempts
    pub max_delay: Duration,
    /// Growth factor applied to the delay after each failure
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Policy giving up after `attempts` tries
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }

    /// Un-jittered delay following `delay`, capped at `max_delay`
    fn grow(&self, delay: Duration) -> Duration {
        Duration::from_secs_f64(
            (delay.as_secs_f64() * self.multiplier).min(self.max_delay.as_secs_f64()),
        )
    }

    fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt >= self.max_attempts
    }
}

/// Spread `delay` over [0.5x, 1.5x) so restarted replicas do not retry in lockstep
fn jitter(delay: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.5..1.5);
    Duration::from_secs_f64(delay.as_secs_f64() * factor)
}

/// Run `operation` until it succeeds or the policy gives up
///
/// Returns the last error once `max_attempts` is reached.
pub async fn retry_with_backoff<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;
    let mut delay = policy.initial_delay;

    loop {
        attempt += 1;

        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if policy.exhausted(attempt) {
            error!(
                operation = %operation_name,
                attempt,
                error = %err,
                "giving up"
            );
            return Err(err);
        }

        let wait = jitter(delay);
        warn!(
            operation = %operation_name,
            attempt,
            error = %err,
            delay_ms = wait.as_millis() as u64,
            "operation failed, retrying"
        );
        tokio::time::sleep(wait).await;
        delay = policy.grow(delay);
    }
}
