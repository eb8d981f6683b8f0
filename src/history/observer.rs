use castor_schema::StorageLocation;
use reqwest::header::HeaderValue;
use uuid::Uuid;

use super::AttemptRecord;
use crate::transport::TransportRequest;

pub const CLIENT_REQUEST_ID_HEADER: &str = "x-ms-client-request-id";

/// Identifies the attempt an observer is called for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptContext {
    pub operation_id: Uuid,
    /// 1-based.
    pub attempt: u32,
    pub location: StorageLocation,
}

/// Fixed extension point around every round trip, run in registration order.
///
/// Observers see every attempt, including the failed ones the caller never does. They cannot
/// alter retry decisions.
pub trait AttemptObserver: Send + Sync {
    /// Runs after the request is fully resolved and before it is handed to the transport.
    fn before_send(&self, _ctx: &AttemptContext, _request: &mut TransportRequest) {}

    /// Runs once per attempt with its immutable record.
    fn after_receive(&self, _record: &AttemptRecord) {}
}

/// Stamps every attempt of one logical operation with the same client request id, so the
/// server can correlate retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientRequestIdStamp;

impl AttemptObserver for ClientRequestIdStamp {
    fn before_send(&self, ctx: &AttemptContext, request: &mut TransportRequest) {
        if let Ok(value) = HeaderValue::from_str(&ctx.operation_id.to_string()) {
            request.headers.insert(CLIENT_REQUEST_ID_HEADER, value);
        }
    }
}
