mod executor;

use bytes::Bytes;
use castor_schema::{ContinuationToken, LocationMode, StorageLocation};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::error::CastorError;
use crate::history::{AttemptObserver, ClientRequestIdStamp};
use crate::location::EndpointSet;
use crate::paging::PagingScheme;
use crate::retry::{RetryPolicy, RetryPolicyConfig};
use crate::transport::{HttpTransport, Transport};
use crate::utils::logging::with_pretty_json_debug;

/// One logical operation as handed over by the operation layer.
#[derive(Debug, Clone)]
pub struct LogicalRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
    idempotent: bool,
    paging: Option<Arc<dyn PagingScheme>>,
}

impl LogicalRequest {
    pub fn new(method: Method, path: impl Into<String>, idempotent: bool) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            idempotent,
            paging: None,
        }
    }

    /// Idempotent `GET`.
    pub fn read(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path, true)
    }

    /// Idempotent paginated `GET`; successful responses may mint a continuation token.
    pub fn list(path: impl Into<String>, paging: impl PagingScheme + 'static) -> Self {
        Self::read(path).with_paging(paging)
    }

    /// Non-idempotent request: primary only, never failed over.
    pub fn write(method: Method, path: impl Into<String>) -> Self {
        Self::new(method, path, false)
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_paging(mut self, paging: impl PagingScheme + 'static) -> Self {
        self.paging = Some(Arc::new(paging));
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_idempotent(&self) -> bool {
        self.idempotent
    }
}

/// Successful outcome of a logical operation.
#[derive(Debug, Clone)]
pub struct PipelineResponse {
    pub operation_id: Uuid,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Endpoint that served this response.
    pub location: StorageLocation,
    /// Attempts made, the successful one included.
    pub attempts: u32,
    /// Cursor for the next page, stamped with `location`. `None` when the listing is complete
    /// or the request is not paginated.
    pub continuation: Option<ContinuationToken>,
}

/// Executes logical operations against a replicated account with retries and failover.
///
/// Everything here is fixed at build time and shared read-only between concurrent calls.
#[derive(Clone)]
pub struct Pipeline {
    transport: Arc<dyn Transport>,
    endpoints: EndpointSet,
    policy: RetryPolicy,
    location_mode: LocationMode,
    observers: Vec<Arc<dyn AttemptObserver>>,
    attempt_timeout: Option<Duration>,
    operation_timeout: Option<Duration>,
}

impl Pipeline {
    pub fn builder(endpoints: EndpointSet, transport: impl Transport + 'static) -> PipelineBuilder {
        PipelineBuilder::new(endpoints, Arc::new(transport))
    }

    /// Wires a reqwest transport and every setting from `cfg`.
    pub fn from_config(cfg: &Config) -> Result<Self, CastorError> {
        PipelineBuilder::from_config(cfg)?.build()
    }

    pub fn endpoints(&self) -> &EndpointSet {
        &self.endpoints
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn location_mode(&self) -> LocationMode {
        self.location_mode
    }
}

pub struct PipelineBuilder {
    transport: Arc<dyn Transport>,
    endpoints: EndpointSet,
    retry: RetryPolicyConfig,
    location_mode: LocationMode,
    observers: Vec<Arc<dyn AttemptObserver>>,
    attempt_timeout: Option<Duration>,
    operation_timeout: Option<Duration>,
}

impl PipelineBuilder {
    pub fn new(endpoints: EndpointSet, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            endpoints,
            retry: RetryPolicyConfig::default(),
            location_mode: LocationMode::default(),
            observers: Vec::new(),
            attempt_timeout: None,
            operation_timeout: None,
        }
    }

    /// Builder preloaded from `cfg` with a reqwest transport. The client request id stamp is
    /// installed as the first observer.
    pub fn from_config(cfg: &Config) -> Result<Self, CastorError> {
        cfg.transport.validate()?;
        let endpoints = cfg.account.endpoints()?;
        let transport = HttpTransport::new(&cfg.transport)?;

        info!(
            primary = %endpoints.primary(),
            secondary = %endpoints.secondary().map(|u| u.as_str()).unwrap_or("<none>"),
            location_mode = %cfg.account.location_mode,
            retry_max_retries = cfg.retry.max_retries,
            retry_backoff = ?cfg.retry.backoff,
            retry_base_interval_ms = cfg.retry.base_interval_ms,
            attempt_timeout_ms = cfg.transport.attempt_timeout_ms,
            proxy = %cfg.transport.proxy.as_ref().map(|u| u.as_str()).unwrap_or("<none>"),
            enable_multiplexing = cfg.transport.enable_multiplexing,
            "Pipeline config (effective)"
        );
        with_pretty_json_debug(cfg, |pretty| {
            tracing::debug!(config = %pretty, "Pipeline config (full)");
        });

        let mut builder = Self::new(endpoints, Arc::new(transport))
            .retry_policy(cfg.retry.resolve())
            .location_mode(cfg.account.location_mode)
            .observer(ClientRequestIdStamp);
        builder.attempt_timeout = Some(cfg.transport.attempt_timeout());
        builder.operation_timeout = cfg.transport.operation_timeout();
        Ok(builder)
    }

    pub fn retry_policy(mut self, retry: RetryPolicyConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Default mode for calls that do not pass their own.
    pub fn location_mode(mut self, mode: LocationMode) -> Self {
        self.location_mode = mode;
        self
    }

    /// Appends an observer; observers run in registration order.
    pub fn observer(mut self, observer: impl AttemptObserver + 'static) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<Pipeline, CastorError> {
        let policy = RetryPolicy::new(self.retry)?;
        if self.location_mode.requires_secondary() && !self.endpoints.has_secondary() {
            return Err(CastorError::configuration(format!(
                "location mode {} requires a secondary endpoint",
                self.location_mode
            )));
        }
        if self.attempt_timeout.is_some_and(|t| t.is_zero())
            || self.operation_timeout.is_some_and(|t| t.is_zero())
        {
            return Err(CastorError::configuration("timeouts must be non-zero"));
        }

        Ok(Pipeline {
            transport: self.transport,
            endpoints: self.endpoints,
            policy,
            location_mode: self.location_mode,
            observers: self.observers,
            attempt_timeout: self.attempt_timeout,
            operation_timeout: self.operation_timeout,
        })
    }
}
