use castor_schema::StorageLocation;
use reqwest::StatusCode;
use std::time::Duration;

use super::{BackoffFamily, RetryPolicyConfig};
use crate::error::{AttemptFailure, CastorError, IsRetryable};
use crate::location::Candidates;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    Stop,
    RetryPrimary,
    RetrySecondary,
}

impl RetryAction {
    fn toward(location: StorageLocation) -> Self {
        match location {
            StorageLocation::Primary => RetryAction::RetryPrimary,
            StorageLocation::Secondary => RetryAction::RetrySecondary,
        }
    }

    /// Endpoint of the next attempt, `None` for `Stop`.
    pub fn target(self) -> Option<StorageLocation> {
        match self {
            RetryAction::Stop => None,
            RetryAction::RetryPrimary => Some(StorageLocation::Primary),
            RetryAction::RetrySecondary => Some(StorageLocation::Secondary),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    /// Retries exhausted or the failure is terminal.
    Terminal,
    /// Transport failure or a status in the retryable set.
    Transient,
    /// 404 from a possibly lagging secondary, retried on the primary.
    StaleSecondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub action: RetryAction,
    pub wait: Duration,
    pub reason: RetryReason,
}

impl RetryDecision {
    fn stop() -> Self {
        Self {
            action: RetryAction::Stop,
            wait: Duration::ZERO,
            reason: RetryReason::Terminal,
        }
    }
}

/// The attempt the policy is asked about.
#[derive(Debug, Clone, Copy)]
pub struct FailedAttempt<'a> {
    /// 1-based.
    pub number: u32,
    pub location: StorageLocation,
    pub failure: &'a AttemptFailure,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    config: RetryPolicyConfig,
}

impl RetryPolicy {
    /// Fails with a configuration error when `config` does not pass
    /// [`RetryPolicyConfig::validate`].
    pub fn new(config: RetryPolicyConfig) -> Result<Self, CastorError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RetryPolicyConfig {
        &self.config
    }

    pub fn is_retryable(&self, failure: &AttemptFailure) -> bool {
        match failure {
            AttemptFailure::Transport(err) => err.is_retryable(),
            AttemptFailure::Service { status, .. } => self
                .config
                .retryable_status_codes
                .contains(&status.as_u16()),
        }
    }

    /// Decides what follows a failed attempt.
    ///
    /// Idempotent calls with two unpinned candidates alternate replicas on every retry. Writes
    /// and pinned calls retry the endpoint that just failed.
    pub fn decide(
        &self,
        attempt: &FailedAttempt<'_>,
        idempotent: bool,
        candidates: &Candidates,
    ) -> RetryDecision {
        if attempt.number > self.config.max_retries {
            return RetryDecision::stop();
        }

        let stale_secondary = self.config.secondary_not_found_fallback
            && idempotent
            && attempt.location == StorageLocation::Secondary
            && attempt.failure.status() == Some(StatusCode::NOT_FOUND)
            && candidates.has_alternate()
            && candidates.contains(StorageLocation::Primary);

        let (next, reason) = if stale_secondary {
            (StorageLocation::Primary, RetryReason::StaleSecondary)
        } else if !self.is_retryable(attempt.failure) {
            return RetryDecision::stop();
        } else if idempotent && candidates.has_alternate() {
            (attempt.location.opposite(), RetryReason::Transient)
        } else {
            (attempt.location, RetryReason::Transient)
        };

        RetryDecision {
            action: RetryAction::toward(next),
            wait: self.backoff(attempt.number),
            reason,
        }
    }

    /// Wait before the retry that follows failed attempt `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let base = self.config.base_interval;

        let delay = match self.config.backoff {
            BackoffFamily::Linear => base.saturating_mul(attempt),
            BackoffFamily::Exponential => {
                let exponent = (attempt - 1).min(31);
                let delay = base.saturating_mul(1u32 << exponent);
                if self.config.jitter > 0.0 {
                    delay.saturating_add(delay.mul_f64(rand::random::<f64>() * self.config.jitter))
                } else {
                    delay
                }
            }
        };

        match self.config.max_interval {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}
