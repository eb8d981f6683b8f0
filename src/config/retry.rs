use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::retry::{BackoffFamily, RetryPolicyConfig};

/// Retry configuration managed by Figment.
///
/// Durations are plain milliseconds here; [`RetryConfig::resolve`] turns them into the
/// typed [`RetryPolicyConfig`] the pipeline consumes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Retries after the first attempt; a permanently failing call makes `max_retries + 1` attempts.
    /// TOML: `retry.max_retries`. Default: `3`.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff family: `linear` or `exponential`.
    /// TOML: `retry.backoff`. Default: `exponential`.
    #[serde(default)]
    pub backoff: BackoffFamily,

    /// Base interval the backoff family scales.
    /// TOML: `retry.base_interval_ms`. Default: `1000`.
    #[serde(default = "default_base_interval_ms")]
    pub base_interval_ms: u64,

    /// Upper bound on a single wait.
    /// TOML: `retry.max_interval_ms`. Default: unset (uncapped).
    #[serde(default)]
    pub max_interval_ms: Option<u64>,

    /// Random extra wait as a fraction of the computed delay, in `[0, 1]`. Exponential only.
    /// TOML: `retry.jitter`. Default: `0`.
    #[serde(default)]
    pub jitter: f64,

    /// HTTP statuses treated as transient.
    /// TOML: `retry.retryable_status_codes`. Default: `[408, 500, 502, 503, 504]`.
    #[serde(default = "default_retryable_status_codes")]
    pub retryable_status_codes: Vec<u16>,

    /// Retry a read that got 404 from the secondary once against the primary.
    /// TOML: `retry.secondary_not_found_fallback`. Default: `false`.
    #[serde(default)]
    pub secondary_not_found_fallback: bool,
}

impl RetryConfig {
    pub fn resolve(&self) -> RetryPolicyConfig {
        RetryPolicyConfig {
            max_retries: self.max_retries,
            backoff: self.backoff,
            base_interval: Duration::from_millis(self.base_interval_ms),
            max_interval: self.max_interval_ms.map(Duration::from_millis),
            jitter: self.jitter,
            retryable_status_codes: self.retryable_status_codes.iter().copied().collect(),
            secondary_not_found_fallback: self.secondary_not_found_fallback,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff: BackoffFamily::default(),
            base_interval_ms: default_base_interval_ms(),
            max_interval_ms: None,
            jitter: 0.0,
            retryable_status_codes: default_retryable_status_codes(),
            secondary_not_found_fallback: false,
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_interval_ms() -> u64 {
    1000
}

fn default_retryable_status_codes() -> Vec<u16> {
    vec![408, 500, 502, 503, 504]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_converts_milliseconds_and_status_set() {
        let cfg = RetryConfig {
            max_retries: 5,
            backoff: BackoffFamily::Linear,
            base_interval_ms: 200,
            max_interval_ms: Some(2_000),
            jitter: 0.25,
            retryable_status_codes: vec![503, 500, 503],
            secondary_not_found_fallback: true,
        };

        let resolved = cfg.resolve();

        assert_eq!(resolved.max_retries, 5);
        assert_eq!(resolved.backoff, BackoffFamily::Linear);
        assert_eq!(resolved.base_interval, Duration::from_millis(200));
        assert_eq!(resolved.max_interval, Some(Duration::from_secs(2)));
        assert_eq!(
            resolved.retryable_status_codes.iter().copied().collect::<Vec<_>>(),
            vec![500, 503]
        );
        assert!(resolved.secondary_not_found_fallback);
    }

    #[test]
    fn default_matches_policy_default() {
        assert_eq!(RetryConfig::default().resolve(), RetryPolicyConfig::default());
    }
}
