use std::future::Future;
use std::time::Duration;

use super::cancel::CancelToken;
use super::error::{FailureCause, StageFailure};
use super::job::Stage;
use crate::config::PipelineConfig;
use crate::Classify;

/// Attempt budget and backoff for one stage
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn for_stage(config: &PipelineConfig, stage: Stage) -> Self {
        let max_attempts = if config.non_retryable_stages.contains(&stage) {
            1
        } else {
            config.max_retries.max(1)
        };

        Self {
            max_attempts,
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            backoff_max: Duration::from_millis(config.backoff_max_ms),
            timeout: config.stage_timeout(),
        }
    }

    /// Delay after the `attempt`-th failure: base * 2^(attempt-1), capped
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.backoff_max)
            .min(self.backoff_max)
    }
}

/// Run one collaborator call under the stage's timeout, retry and cancellation rules
pub async fn run_stage<T, E, F, Fut>(
    stage: Stage,
    policy: &RetryPolicy,
    cancel: &CancelToken,
    mut call: F,
) -> Result<T, StageFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<FailureCause>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        if cancel.is_cancelled() {
            return Err(StageFailure::cancelled(stage, attempt - 1));
        }

        let cause = tokio::select! {
            biased;
            _ = cancel.cancelled() => FailureCause::Cancelled,
            outcome = tokio::time::timeout(policy.timeout, call()) => match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(err)) => err.into(),
                Err(_) => FailureCause::Timeout(policy.timeout),
            },
        };

        if cause == FailureCause::Cancelled || !cause.is_transient() {
            return Err(StageFailure::new(stage, cause, attempt));
        }

        if attempt >= policy.max_attempts {
            tracing::warn!("{} giving up after {} attempt(s): {}", stage, attempt, cause);
            return Err(StageFailure::exhausted(stage, cause, attempt));
        }

        let delay = policy.delay_after(attempt);
        tracing::warn!(
            "{} attempt {}/{} failed: {}; retrying in {:?}",
            stage,
            attempt,
            policy.max_attempts,
            cause,
            delay
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StageFailure::cancelled(stage, attempt)),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
