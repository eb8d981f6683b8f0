use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error as ThisError;

/// One replica of a storage account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageLocation {
    /// Write-capable endpoint.
    Primary,
    /// Read-only replica.
    Secondary,
}

impl StorageLocation {
    pub fn opposite(self) -> Self {
        match self {
            StorageLocation::Primary => StorageLocation::Secondary,
            StorageLocation::Secondary => StorageLocation::Primary,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StorageLocation::Primary => "primary",
            StorageLocation::Secondary => "secondary",
        }
    }

    pub(crate) fn parse_wire(raw: &str) -> Option<Option<Self>> {
        match raw {
            "" => Some(None),
            "primary" => Some(Some(StorageLocation::Primary)),
            "secondary" => Some(Some(StorageLocation::Secondary)),
            _ => None,
        }
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-selected policy for which endpoint(s) a call may target.
///
/// The order of [`LocationMode::order`] is the initial candidate order for a fresh call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationMode {
    #[default]
    PrimaryOnly,
    SecondaryOnly,
    PrimaryThenSecondary,
    SecondaryThenPrimary,
}

impl LocationMode {
    pub fn order(self) -> &'static [StorageLocation] {
        const PRIMARY: StorageLocation = StorageLocation::Primary;
        const SECONDARY: StorageLocation = StorageLocation::Secondary;
        match self {
            LocationMode::PrimaryOnly => &[PRIMARY],
            LocationMode::SecondaryOnly => &[SECONDARY],
            LocationMode::PrimaryThenSecondary => &[PRIMARY, SECONDARY],
            LocationMode::SecondaryThenPrimary => &[SECONDARY, PRIMARY],
        }
    }

    /// Every mode except `PrimaryOnly` needs a configured secondary endpoint.
    pub fn requires_secondary(self) -> bool {
        self != LocationMode::PrimaryOnly
    }

    /// Modes that would send the first attempt of a call to the secondary.
    pub fn prefers_secondary(self) -> bool {
        matches!(
            self,
            LocationMode::SecondaryOnly | LocationMode::SecondaryThenPrimary
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LocationMode::PrimaryOnly => "primary_only",
            LocationMode::SecondaryOnly => "secondary_only",
            LocationMode::PrimaryThenSecondary => "primary_then_secondary",
            LocationMode::SecondaryThenPrimary => "secondary_then_primary",
        }
    }
}

impl fmt::Display for LocationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("unknown location mode {0:?}")]
pub struct ParseLocationModeError(pub String);

impl FromStr for LocationMode {
    type Err = ParseLocationModeError;

    /// Accepts both `primary_then_secondary` and `primary-then-secondary`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "primary_only" => Ok(LocationMode::PrimaryOnly),
            "secondary_only" => Ok(LocationMode::SecondaryOnly),
            "primary_then_secondary" => Ok(LocationMode::PrimaryThenSecondary),
            "secondary_then_primary" => Ok(LocationMode::SecondaryThenPrimary),
            _ => Err(ParseLocationModeError(s.to_string())),
        }
    }
}
