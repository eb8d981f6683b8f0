use axum::{
    Router,
    extract::{RawQuery, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
};
use castor::config::{Config, TransportConfig};
use castor::error::TransportErrorKind;
use castor::history::CLIENT_REQUEST_ID_HEADER;
use castor::paging::HeaderPaging;
use castor::{
    AttemptFailure, CastorError, EndpointSet, HistoryRecorder, HttpTransport, LocationMode,
    LogicalRequest, Pipeline, PipelineBuilder, RetryPolicyConfig, StorageLocation,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use url::Url;

#[derive(Debug, Clone)]
struct Captured {
    query: Option<String>,
    headers: HeaderMap,
}

#[derive(Clone, Default)]
struct CaptureState {
    requests: Arc<Mutex<Vec<Captured>>>,
}

impl CaptureState {
    fn push(&self, query: Option<String>, headers: HeaderMap) {
        self.requests
            .lock()
            .unwrap()
            .push(Captured { query, headers });
    }

    fn requests(&self) -> Vec<Captured> {
        self.requests.lock().unwrap().clone()
    }
}

async fn spawn_test_server(app: Router) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    let base = Url::parse(&format!("http://{}/", addr)).expect("valid base url");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server run");
    });

    base
}

async fn unavailable(
    State(state): State<CaptureState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> impl IntoResponse {
    state.push(query, headers);
    (StatusCode::SERVICE_UNAVAILABLE, "server busy")
}

async fn tables_page(
    State(state): State<CaptureState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> impl IntoResponse {
    let resumed = query
        .as_deref()
        .is_some_and(|q| q.contains("NextTableName=people2"));
    state.push(query, headers);

    let mut response = HeaderMap::new();
    if !resumed {
        response.insert("x-ms-continuation-nexttablename", "people2".parse().unwrap());
    }
    (StatusCode::OK, response, if resumed { "page 2" } else { "page 1" })
}

fn fast_retry() -> RetryPolicyConfig {
    RetryPolicyConfig::linear(2, Duration::from_millis(10))
}

#[tokio::test]
async fn failover_listing_resumes_on_secondary() {
    let primary_state = CaptureState::default();
    let secondary_state = CaptureState::default();
    let primary = spawn_test_server(
        Router::new()
            .route("/Tables", get(unavailable))
            .with_state(primary_state.clone()),
    )
    .await;
    let secondary = spawn_test_server(
        Router::new()
            .route("/Tables", get(tables_page))
            .with_state(secondary_state.clone()),
    )
    .await;

    let transport = HttpTransport::new(&TransportConfig::default()).expect("transport");
    let pipeline = Pipeline::builder(
        EndpointSet::new(primary, Some(secondary)).expect("endpoints"),
        transport,
    )
    .retry_policy(fast_retry())
    .location_mode(LocationMode::PrimaryOnly)
    .build()
    .expect("pipeline");
    let listing = LogicalRequest::list("/Tables", HeaderPaging::tables());

    let first = pipeline
        .execute(&listing, Some(LocationMode::PrimaryThenSecondary), None)
        .await
        .expect("first page");
    assert_eq!(first.location, StorageLocation::Secondary);
    assert_eq!(first.attempts, 2);
    assert_eq!(&first.body[..], b"page 1");

    let token = first.continuation.expect("more pages");
    let second = pipeline
        .resume(&listing, None, &token.encode())
        .await
        .expect("second page");
    assert_eq!(second.location, StorageLocation::Secondary);
    assert_eq!(&second.body[..], b"page 2");
    assert!(second.continuation.is_none());

    assert_eq!(primary_state.requests().len(), 1);
    let secondary_requests = secondary_state.requests();
    assert_eq!(secondary_requests.len(), 2);
    assert_eq!(secondary_requests[0].query, None);
    assert_eq!(
        secondary_requests[1].query.as_deref(),
        Some("NextTableName=people2")
    );
}

#[tokio::test]
async fn configured_pipeline_retries_with_one_request_id() {
    let primary_state = CaptureState::default();
    let primary = spawn_test_server(
        Router::new()
            .route("/Tables", get(unavailable))
            .with_state(primary_state.clone()),
    )
    .await;

    let mut cfg = Config::default();
    cfg.account.primary_endpoint = primary;
    cfg.retry.max_retries = 2;
    cfg.retry.base_interval_ms = 10;

    let history = HistoryRecorder::new();
    let pipeline = PipelineBuilder::from_config(&cfg)
        .expect("builder")
        .observer(history.clone())
        .build()
        .expect("pipeline");

    let err = pipeline
        .execute(&LogicalRequest::read("/Tables"), None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, CastorError::Terminal { attempts: 3, .. }), "{err:?}");
    assert_eq!(err.status(), Some(reqwest::StatusCode::SERVICE_UNAVAILABLE));

    let records = history.history();
    assert_eq!(records.len(), 3);
    match records[0].outcome().failure() {
        Some(AttemptFailure::Service { body_preview, .. }) => assert_eq!(body_preview, "server busy"),
        other => panic!("expected a service failure, got {other:?}"),
    }

    let ids: Vec<_> = primary_state
        .requests()
        .iter()
        .map(|r| {
            r.headers
                .get(CLIENT_REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .expect("client request id header")
        })
        .collect();
    assert_eq!(ids.len(), 3);
    assert!(ids.iter().all(|id| *id == ids[0]));
    assert_eq!(ids[0], records[0].operation_id().to_string());
}

#[tokio::test]
async fn refused_connection_fails_over_to_secondary() {
    let closed = {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind listener");
        let addr = listener.local_addr().expect("local addr");
        Url::parse(&format!("http://{}/", addr)).expect("valid base url")
    };

    let secondary_state = CaptureState::default();
    let secondary = spawn_test_server(
        Router::new()
            .route("/Tables", get(tables_page))
            .with_state(secondary_state.clone()),
    )
    .await;

    let history = HistoryRecorder::new();
    let transport = HttpTransport::new(&TransportConfig::default()).expect("transport");
    let pipeline = Pipeline::builder(
        EndpointSet::new(closed, Some(secondary)).expect("endpoints"),
        transport,
    )
    .retry_policy(fast_retry())
    .location_mode(LocationMode::PrimaryThenSecondary)
    .observer(history.clone())
    .build()
    .expect("pipeline");

    let response = pipeline
        .execute(&LogicalRequest::read("/Tables"), None, None)
        .await
        .expect("served by secondary");

    assert_eq!(response.location, StorageLocation::Secondary);
    match history.history()[0].outcome().failure() {
        Some(AttemptFailure::Transport(err)) => {
            assert_eq!(err.kind(), TransportErrorKind::Connect, "{err}");
        }
        other => panic!("expected a transport failure, got {other:?}"),
    }
    assert_eq!(secondary_state.requests().len(), 1);
}
