use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{collections::BTreeMap, fmt, str::FromStr};
use thiserror::Error as ThisError;

use crate::location::StorageLocation;

const TOKEN_VERSION: u8 = 1;

#[derive(Debug, ThisError)]
pub enum DecodeError {
    #[error("continuation token is empty")]
    Empty,

    #[error("continuation token is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("continuation token payload is malformed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported continuation token version {0}")]
    UnsupportedVersion(u8),

    #[error("invalid continuation token location {0:?}")]
    InvalidLocation(String),

    #[error("continuation token carries no resume markers")]
    NoMarkers,
}

/// Opaque pagination cursor.
///
/// Holds the resource-specific resume markers of a listing (e.g. `NextPartitionKey`,
/// `NextMarker`) together with the replica that served the page. A token with a location pins
/// the next page request to that replica.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationToken {
    markers: BTreeMap<String, String>,
    location: Option<StorageLocation>,
}

/// Payload behind the base64 string. Short keys keep tokens compact in URLs.
#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireToken {
    #[serde(rename = "v")]
    version: u8,
    #[serde(rename = "m")]
    markers: BTreeMap<String, String>,
    #[serde(rename = "l", default)]
    location: String,
}

impl ContinuationToken {
    /// Returns `None` when there is nothing to resume, i.e. the listing is complete.
    pub fn from_markers(
        markers: BTreeMap<String, String>,
        location: Option<StorageLocation>,
    ) -> Option<Self> {
        let markers: BTreeMap<String, String> = markers
            .into_iter()
            .filter(|(key, value)| !key.is_empty() && !value.is_empty())
            .collect();

        (!markers.is_empty()).then_some(Self { markers, location })
    }

    pub fn markers(&self) -> &BTreeMap<String, String> {
        &self.markers
    }

    pub fn marker(&self, key: &str) -> Option<&str> {
        self.markers.get(key).map(String::as_str)
    }

    pub fn location(&self) -> Option<StorageLocation> {
        self.location
    }

    pub fn with_location(mut self, location: Option<StorageLocation>) -> Self {
        self.location = location;
        self
    }

    pub fn encode(&self) -> String {
        let wire = WireToken {
            version: TOKEN_VERSION,
            markers: self.markers.clone(),
            location: self.location.map(StorageLocation::as_str).unwrap_or("").to_string(),
        };
        // A map of strings plus a string cannot fail to serialize.
        let json = serde_json::to_vec(&wire).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(raw: &str) -> Result<Self, DecodeError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(DecodeError::Empty);
        }

        let bytes = URL_SAFE_NO_PAD.decode(raw)?;
        let wire: WireToken = serde_json::from_slice(&bytes)?;

        if wire.version != TOKEN_VERSION {
            return Err(DecodeError::UnsupportedVersion(wire.version));
        }

        let location = StorageLocation::parse_wire(&wire.location)
            .ok_or_else(|| DecodeError::InvalidLocation(wire.location.clone()))?;

        if wire.markers.is_empty() || wire.markers.iter().any(|(k, v)| k.is_empty() || v.is_empty())
        {
            return Err(DecodeError::NoMarkers);
        }

        Ok(Self {
            markers: wire.markers,
            location,
        })
    }

    /// Empty input means "start from the beginning"; anything else must decode.
    pub fn decode_optional(raw: &str) -> Result<Option<Self>, DecodeError> {
        if raw.trim().is_empty() {
            return Ok(None);
        }
        Self::decode(raw).map(Some)
    }
}

impl fmt::Display for ContinuationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for ContinuationToken {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl Serialize for ContinuationToken {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for ContinuationToken {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::decode(&raw).map_err(serde::de::Error::custom)
    }
}
