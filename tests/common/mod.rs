#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use castor::{
    EndpointSet, StorageLocation, Transport, TransportError, TransportRequest, TransportResponse,
};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;
use url::Url;

pub const PRIMARY: &str = "https://acct.table.core.windows.net/";
pub const SECONDARY: &str = "https://acct-secondary.table.core.windows.net/";

pub fn endpoints() -> EndpointSet {
    EndpointSet::new(
        Url::parse(PRIMARY).unwrap(),
        Some(Url::parse(SECONDARY).unwrap()),
    )
    .unwrap()
}

pub fn primary_only_endpoints() -> EndpointSet {
    EndpointSet::new(Url::parse(PRIMARY).unwrap(), None).unwrap()
}

#[derive(Debug, Clone)]
pub enum Step {
    Respond {
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
    },
    Fail(TransportError),
    /// Never completes; only a timeout or cancellation ends the attempt.
    Hang,
}

impl Step {
    pub fn status(code: u16) -> Self {
        Step::Respond {
            status: StatusCode::from_u16(code).unwrap(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn ok_with_header(name: &'static str, value: &'static str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
        Step::Respond {
            status: StatusCode::OK,
            headers,
            body: Bytes::new(),
        }
    }

    pub fn connect_error() -> Self {
        Step::Fail(TransportError::connect("connection refused"))
    }
}

#[derive(Debug, Clone)]
pub struct Sent {
    pub url: Url,
    pub headers: HeaderMap,
    pub at: Instant,
}

impl Sent {
    pub fn location(&self) -> StorageLocation {
        if self.url.as_str().starts_with(SECONDARY) {
            StorageLocation::Secondary
        } else {
            StorageLocation::Primary
        }
    }

    pub fn query(&self, key: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }
}

#[derive(Default)]
struct ScriptState {
    steps: VecDeque<Step>,
    sent: Vec<Sent>,
}

/// Plays back one step per request, regardless of which endpoint it targets.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedTransport {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptState {
                steps: steps.into_iter().collect(),
                sent: Vec::new(),
            })),
        }
    }

    pub fn push(&self, step: Step) {
        self.state.lock().unwrap().steps.push_back(step);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn locations(&self) -> Vec<StorageLocation> {
        self.sent().iter().map(Sent::location).collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let step = {
            let mut state = self.state.lock().unwrap();
            state.sent.push(Sent {
                url: request.url.clone(),
                headers: request.headers.clone(),
                at: Instant::now(),
            });
            state
                .steps
                .pop_front()
                .unwrap_or_else(|| panic!("script exhausted at {}", request.url))
        };

        match step {
            Step::Respond {
                status,
                headers,
                body,
            } => Ok(TransportResponse {
                status,
                headers,
                body,
            }),
            Step::Fail(err) => Err(err),
            Step::Hang => std::future::pending().await,
        }
    }
}
