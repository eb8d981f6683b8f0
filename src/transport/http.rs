use async_trait::async_trait;
use reqwest::header::{CONNECTION, HeaderMap, HeaderValue};

use super::{Transport, TransportRequest, TransportResponse};
use crate::config::TransportConfig;
use crate::error::{CastorError, TransportError};

/// [`Transport`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(cfg: &TransportConfig) -> Result<Self, CastorError> {
        cfg.validate()?;
        let mut headers = HeaderMap::new();

        let mut builder = reqwest::Client::builder()
            .user_agent(cfg.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(cfg.connect_timeout());

        if let Some(proxy_url) = cfg.proxy.as_ref() {
            let proxy = reqwest::Proxy::all(proxy_url.as_str()).map_err(|e| {
                CastorError::configuration(format!("invalid proxy url {proxy_url}: {e}"))
            })?;
            builder = builder.proxy(proxy);
        }

        if cfg.enable_multiplexing {
            builder = builder.http2_adaptive_window(true);
        } else {
            headers.insert(CONNECTION, HeaderValue::from_static("close"));

            builder = builder
                .http1_only()
                .pool_max_idle_per_host(0)
                .pool_idle_timeout(std::time::Duration::from_secs(0));
        }

        let client = builder
            .default_headers(headers)
            .build()
            .map_err(|e| CastorError::configuration(format!("failed to build http client: {e}")))?;

        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers)
            .body(request.body);
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let resp = builder.send().await?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.bytes().await?;

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}
