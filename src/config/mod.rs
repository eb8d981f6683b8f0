mod account;
mod basic;
mod retry;
mod transport;

pub use account::AccountConfig;
pub use basic::BasicConfig;
pub use retry::RetryConfig;
pub use transport::TransportConfig;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Client configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Process-level settings (see `basic` table in castor.toml).
    #[serde(default)]
    pub basic: BasicConfig,

    /// Storage account endpoints and default location mode (see `account` table).
    #[serde(default)]
    pub account: AccountConfig,

    /// Retry policy parameters (see `retry` table).
    #[serde(default)]
    pub retry: RetryConfig,

    /// HTTP transport and timeout settings (see `transport` table).
    #[serde(default)]
    pub transport: TransportConfig,
}

pub const DEFAULT_CONFIG_FILE: &str = "castor.toml";

/// Environment overrides use this prefix and `__` between table and key,
/// e.g. `CASTOR_RETRY__MAX_RETRIES=5`.
const ENV_PREFIX: &str = "CASTOR_";

impl Config {
    /// Builds a Figment that merges defaults, the TOML file at `path` (if present), and
    /// `CASTOR_*` environment variables, in that order.
    pub fn figment_from(path: impl AsRef<Path>) -> Figment {
        let path = path.as_ref();
        let figment = Figment::new().merge(Serialized::defaults(Config::default()));
        let figment = if path.is_file() {
            figment.merge(Toml::file(path))
        } else {
            figment
        };
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn figment() -> Figment {
        Self::figment_from(DEFAULT_CONFIG_FILE)
    }

    /// Loads configuration from `castor.toml` in the working directory (if any) plus environment.
    ///
    /// Cross-field validation (e.g. a secondary-preferring mode without a secondary endpoint)
    /// happens when a [`crate::Pipeline`] is built from the result.
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, figment::Error> {
        Self::figment_from(path).extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::BackoffFamily;
    use castor_schema::LocationMode;

    #[test]
    fn defaults_apply_without_file_or_env() {
        figment::Jail::expect_with(|_jail| {
            let cfg = Config::load()?;

            assert_eq!(cfg.basic.loglevel, "info");
            assert_eq!(cfg.account.location_mode, LocationMode::PrimaryOnly);
            assert!(cfg.account.secondary_endpoint.is_none());
            assert_eq!(cfg.retry.max_retries, 3);
            assert_eq!(cfg.retry.backoff, BackoffFamily::Exponential);
            assert_eq!(cfg.retry.retryable_status_codes, vec![408, 500, 502, 503, 504]);
            assert!(!cfg.transport.enable_multiplexing);
            Ok(())
        });
    }

    #[test]
    fn toml_file_then_env_override() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                r#"
                [account]
                primary_endpoint = "https://acct.table.core.windows.net/"
                secondary_endpoint = "https://acct-secondary.table.core.windows.net/"
                location_mode = "primary_then_secondary"

                [retry]
                max_retries = 2
                backoff = "linear"
                base_interval_ms = 250
                retryable_status_codes = [500, 503]
                "#,
            )?;
            jail.set_env("CASTOR_RETRY__MAX_RETRIES", "6");
            jail.set_env("CASTOR_TRANSPORT__ATTEMPT_TIMEOUT_MS", "1500");

            let cfg = Config::load()?;

            assert_eq!(
                cfg.account.primary_endpoint.as_str(),
                "https://acct.table.core.windows.net/"
            );
            assert_eq!(
                cfg.account.location_mode,
                LocationMode::PrimaryThenSecondary
            );
            assert_eq!(cfg.retry.max_retries, 6);
            assert_eq!(cfg.retry.backoff, BackoffFamily::Linear);
            assert_eq!(cfg.retry.base_interval_ms, 250);
            assert_eq!(cfg.retry.retryable_status_codes, vec![500, 503]);
            assert_eq!(cfg.transport.attempt_timeout_ms, 1500);
            Ok(())
        });
    }

    #[test]
    fn unknown_keys_are_rejected() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("custom.toml", "[retry]\nmax_retry = 2\n")?;
            assert!(Config::load_from("custom.toml").is_err());
            Ok(())
        });
    }
}
