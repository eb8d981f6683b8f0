//! Client-side request pipeline for a replicated storage account.
//!
//! Reads may be served by a read-only secondary; transient failures are retried under a
//! [`RetryPolicyConfig`], alternating replicas for idempotent calls, and paginated listings
//! return a [`ContinuationToken`] that pins the next page to the replica that produced this one.

pub mod config;
pub mod error;
pub mod history;
pub mod location;
pub mod paging;
pub mod pipeline;
pub mod retry;
pub mod transport;

mod utils;

pub use castor_schema::{ContinuationToken, LocationMode, StorageLocation};
pub use error::{AttemptFailure, CastorError, DecodeError, IsRetryable, TransportError};
pub use history::{AttemptObserver, AttemptRecord, HistoryRecorder};
pub use location::EndpointSet;
pub use pipeline::{LogicalRequest, Pipeline, PipelineBuilder, PipelineResponse};
pub use retry::{BackoffFamily, RetryPolicy, RetryPolicyConfig};
pub use transport::{HttpTransport, Transport, TransportRequest, TransportResponse};
pub use utils::logging::BODY_PREVIEW_CHARS;
