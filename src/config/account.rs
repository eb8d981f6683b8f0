use castor_schema::LocationMode;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::CastorError;
use crate::location::EndpointSet;

/// Storage account endpoints.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AccountConfig {
    /// Write-capable base URI of the account.
    /// TOML: `account.primary_endpoint`. Default: the local emulator account.
    #[serde(default = "default_primary_endpoint")]
    pub primary_endpoint: Url,

    /// Read-only replica base URI. Required by every mode except `primary_only`.
    /// TOML: `account.secondary_endpoint`. Default: unset.
    #[serde(default)]
    pub secondary_endpoint: Option<Url>,

    /// Default location mode for calls that do not override it.
    /// TOML: `account.location_mode`. Default: `primary_only`.
    #[serde(default)]
    pub location_mode: LocationMode,
}

impl AccountConfig {
    pub fn endpoints(&self) -> Result<EndpointSet, CastorError> {
        EndpointSet::new(
            self.primary_endpoint.clone(),
            self.secondary_endpoint.clone(),
        )
    }
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            primary_endpoint: default_primary_endpoint(),
            secondary_endpoint: None,
            location_mode: LocationMode::default(),
        }
    }
}

fn default_primary_endpoint() -> Url {
    Url::parse("http://127.0.0.1:10002/devstoreaccount1").expect("valid emulator endpoint")
}
