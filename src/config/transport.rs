use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::error::CastorError;

/// HTTP transport configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    /// Timeout for a single round trip, including reading the body. Must be non-zero.
    /// TOML: `transport.attempt_timeout_ms`. Default: `30000`.
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,

    /// TCP/TLS connect timeout. Must be non-zero.
    /// TOML: `transport.connect_timeout_ms`. Default: `10000`.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Deadline for a whole logical operation, retries and backoff included.
    /// Expiry surfaces as a cancelled operation.
    /// TOML: `transport.operation_timeout_ms`. Default: unset (no deadline).
    #[serde(default)]
    pub operation_timeout_ms: Option<u64>,

    /// Optional upstream HTTP proxy. If set, used for the reqwest client.
    /// TOML: `transport.proxy`. Example: `http://127.0.0.1:1080`.
    #[serde(default)]
    pub proxy: Option<Url>,

    /// Allow HTTP/2 multiplexing; disabled forces HTTP/1 without connection reuse.
    /// TOML: `transport.enable_multiplexing`. Default: `false`.
    #[serde(default)]
    pub enable_multiplexing: bool,

    /// User-Agent sent on every attempt.
    /// TOML: `transport.user_agent`. Default: `castor/<version>`.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl TransportConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_ms.map(Duration::from_millis)
    }

    /// Every configured timeout must be non-zero; leave `operation_timeout_ms` unset for no
    /// deadline.
    pub fn validate(&self) -> Result<(), CastorError> {
        for (key, value) in [
            ("transport.attempt_timeout_ms", Some(self.attempt_timeout_ms)),
            ("transport.connect_timeout_ms", Some(self.connect_timeout_ms)),
            ("transport.operation_timeout_ms", self.operation_timeout_ms),
        ] {
            if value == Some(0) {
                return Err(CastorError::configuration(format!("{key} must be non-zero")));
            }
        }
        Ok(())
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_ms: default_attempt_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            operation_timeout_ms: None,
            proxy: None,
            enable_multiplexing: false,
            user_agent: default_user_agent(),
        }
    }
}

fn default_attempt_timeout_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_user_agent() -> String {
    format!("castor/{}", env!("CARGO_PKG_VERSION"))
}
