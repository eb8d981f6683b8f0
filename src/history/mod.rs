mod observer;

pub use observer::{AttemptContext, AttemptObserver, CLIENT_REQUEST_ID_HEADER, ClientRequestIdStamp};

use castor_schema::StorageLocation;
use chrono::{DateTime, Utc};
use reqwest::{Method, StatusCode, header::HeaderMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use url::Url;
use uuid::Uuid;

use crate::error::AttemptFailure;
use crate::transport::{TransportRequest, TransportResponse};

/// What was sent, minus the body.
#[derive(Debug, Clone)]
pub struct RequestSnapshot {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
}

impl From<&TransportRequest> for RequestSnapshot {
    fn from(request: &TransportRequest) -> Self {
        Self {
            method: request.method.clone(),
            url: request.url.clone(),
            headers: request.headers.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    Success {
        status: StatusCode,
        headers: HeaderMap,
    },
    Failure(AttemptFailure),
}

impl AttemptOutcome {
    pub(crate) fn success(response: &TransportResponse) -> Self {
        AttemptOutcome::Success {
            status: response.status,
            headers: response.headers.clone(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success { .. })
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            AttemptOutcome::Success { status, .. } => Some(*status),
            AttemptOutcome::Failure(failure) => failure.status(),
        }
    }

    pub fn failure(&self) -> Option<&AttemptFailure> {
        match self {
            AttemptOutcome::Failure(failure) => Some(failure),
            AttemptOutcome::Success { .. } => None,
        }
    }
}

/// One network attempt. Built by the pipeline right after the round trip; never mutated.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    operation_id: Uuid,
    sequence: u32,
    location: StorageLocation,
    request: RequestSnapshot,
    outcome: AttemptOutcome,
    started_at: DateTime<Utc>,
    elapsed: Duration,
}

impl AttemptRecord {
    pub(crate) fn new(
        ctx: AttemptContext,
        request: RequestSnapshot,
        outcome: AttemptOutcome,
        started_at: DateTime<Utc>,
        elapsed: Duration,
    ) -> Self {
        Self {
            operation_id: ctx.operation_id,
            sequence: ctx.attempt,
            location: ctx.location,
            request,
            outcome,
            started_at,
            elapsed,
        }
    }

    pub fn operation_id(&self) -> Uuid {
        self.operation_id
    }

    /// 1-based position within its logical operation.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn location(&self) -> StorageLocation {
        self.location
    }

    pub fn request(&self) -> &RequestSnapshot {
        &self.request
    }

    pub fn outcome(&self) -> &AttemptOutcome {
        &self.outcome
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// Append-only log of attempt records.
///
/// Clones share the same log, so one recorder can be attached to a pipeline and inspected from
/// elsewhere. Concurrent operations serialize on an internal lock; records from different
/// operations may interleave and can be told apart by [`AttemptRecord::operation_id`].
#[derive(Debug, Clone, Default)]
pub struct HistoryRecorder {
    records: Arc<Mutex<Vec<AttemptRecord>>>,
}

impl HistoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, attempt: AttemptRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(attempt);
    }

    /// Snapshot of every record so far, in arrival order.
    pub fn history(&self) -> Vec<AttemptRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn for_operation(&self, operation_id: Uuid) -> Vec<AttemptRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|record| record.operation_id == operation_id)
            .cloned()
            .collect()
    }

    /// Endpoint of every recorded attempt, in order.
    pub fn locations(&self) -> Vec<StorageLocation> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(AttemptRecord::location)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl AttemptObserver for HistoryRecorder {
    fn after_receive(&self, record: &AttemptRecord) {
        self.record(record.clone());
    }
}
