mod policy;

pub use policy::{FailedAttempt, RetryAction, RetryDecision, RetryPolicy, RetryReason};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

use crate::error::CastorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffFamily {
    /// `base * attempt`
    Linear,
    /// `base * 2^(attempt - 1)`, optionally jittered and capped.
    #[default]
    Exponential,
}

/// Retry parameters, fixed when a pipeline is built and shared read-only by every call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicyConfig {
    pub max_retries: u32,
    pub backoff: BackoffFamily,
    pub base_interval: Duration,
    pub max_interval: Option<Duration>,
    pub jitter: f64,
    pub retryable_status_codes: BTreeSet<u16>,
    pub secondary_not_found_fallback: bool,
}

pub const DEFAULT_RETRYABLE_STATUS_CODES: [u16; 5] = [408, 500, 502, 503, 504];

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self::exponential(3, Duration::from_secs(1))
    }
}

impl RetryPolicyConfig {
    pub fn linear(max_retries: u32, base_interval: Duration) -> Self {
        Self {
            max_retries,
            backoff: BackoffFamily::Linear,
            base_interval,
            max_interval: None,
            jitter: 0.0,
            retryable_status_codes: DEFAULT_RETRYABLE_STATUS_CODES.into_iter().collect(),
            secondary_not_found_fallback: false,
        }
    }

    pub fn exponential(max_retries: u32, base_interval: Duration) -> Self {
        Self {
            backoff: BackoffFamily::Exponential,
            ..Self::linear(max_retries, base_interval)
        }
    }

    /// Single attempt, never retried.
    pub fn no_retry() -> Self {
        Self::linear(0, Duration::ZERO)
    }

    pub fn with_max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = Some(max_interval);
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_retryable_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_status_codes = codes.into_iter().collect();
        self
    }

    pub fn with_secondary_not_found_fallback(mut self, enabled: bool) -> Self {
        self.secondary_not_found_fallback = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), CastorError> {
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(CastorError::configuration(format!(
                "retry jitter must be within [0, 1], got {}",
                self.jitter
            )));
        }
        if let Some(code) = self
            .retryable_status_codes
            .iter()
            .find(|code| !(100..=599).contains(*code))
        {
            return Err(CastorError::configuration(format!(
                "retryable status code {code} is not a valid HTTP status"
            )));
        }
        if let Some(max) = self.max_interval {
            if max < self.base_interval {
                return Err(CastorError::configuration(format!(
                    "retry max interval {max:?} is below the base interval {:?}",
                    self.base_interval
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_bad_parameters() {
        assert!(RetryPolicyConfig::default().validate().is_ok());
        assert!(RetryPolicyConfig::no_retry().validate().is_ok());

        assert!(
            RetryPolicyConfig::default()
                .with_jitter(1.5)
                .validate()
                .is_err()
        );
        assert!(
            RetryPolicyConfig::default()
                .with_retryable_status_codes([500, 42])
                .validate()
                .is_err()
        );
        assert!(
            RetryPolicyConfig::exponential(3, Duration::from_secs(2))
                .with_max_interval(Duration::from_secs(1))
                .validate()
                .is_err()
        );
    }
}
