mod endpoints;

pub use castor_schema::{LocationMode, StorageLocation};
pub use endpoints::EndpointSet;

use crate::error::CastorError;

/// Ordered endpoints one logical call may use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidates {
    order: Vec<StorageLocation>,
    pinned: bool,
}

impl Candidates {
    fn pinned(location: StorageLocation) -> Self {
        Self {
            order: vec![location],
            pinned: true,
        }
    }

    fn ordered(order: &[StorageLocation]) -> Self {
        Self {
            order: order.to_vec(),
            pinned: false,
        }
    }

    pub fn first(&self) -> StorageLocation {
        self.order[0]
    }

    pub fn as_slice(&self) -> &[StorageLocation] {
        &self.order
    }

    pub fn contains(&self, location: StorageLocation) -> bool {
        self.order.contains(&location)
    }

    /// Set by a continuation-token override; such calls never fail over.
    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    /// True when a retry may move to the other replica.
    pub fn has_alternate(&self) -> bool {
        !self.pinned && self.order.len() > 1
    }

    /// Drops every candidate but `location`, keeping it only if it was already present.
    pub(crate) fn narrow_to(&mut self, location: StorageLocation) {
        if self.contains(location) {
            self.order = vec![location];
        }
    }
}

/// Computes the candidate endpoints for one logical call.
///
/// An `override_location` (from a continuation token) wins over `mode` and yields exactly one
/// candidate. Non-idempotent requests only ever target the primary: secondary-preferring modes
/// and secondary overrides are rejected, and `PrimaryThenSecondary` collapses to the primary.
pub fn resolve(
    mode: LocationMode,
    endpoints: &EndpointSet,
    override_location: Option<StorageLocation>,
    idempotent: bool,
) -> Result<Candidates, CastorError> {
    if let Some(location) = override_location {
        if location == StorageLocation::Secondary && !endpoints.has_secondary() {
            return Err(CastorError::configuration(
                "continuation token is pinned to the secondary but no secondary endpoint is configured",
            ));
        }
        if !idempotent && location != StorageLocation::Primary {
            return Err(CastorError::configuration(
                "a write request cannot resume from a token pinned to the secondary",
            ));
        }
        return Ok(Candidates::pinned(location));
    }

    if mode.requires_secondary() && !endpoints.has_secondary() {
        return Err(CastorError::configuration(format!(
            "location mode {mode} requires a secondary endpoint"
        )));
    }

    if !idempotent {
        if mode.prefers_secondary() {
            return Err(CastorError::configuration(format!(
                "write requests must target the primary; location mode {mode} is not allowed"
            )));
        }
        return Ok(Candidates::ordered(&[StorageLocation::Primary]));
    }

    Ok(Candidates::ordered(mode.order()))
}
