//! A connection-pooling [`HttpClient`] built on `hyper_util`'s legacy client.
//! Plain HTTP only: backends are addressed by `http://` URL and TLS
//! termination to them is out of scope, so the connector is a bare
//! [`HttpConnector`] with no TLS layer.

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use hyper::{Request, Response, StatusCode};
use hyper_util::{client::legacy::Client, client::legacy::connect::HttpConnector, rt::TokioExecutor};

use crate::ports::http_client::{HttpClient, HttpClientError, HttpClientResult};

/// 64 idle connections kept per host, recycled after 90 seconds.
const POOL_MAX_IDLE_PER_HOST: usize = 64;
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

pub struct HttpClientAdapter {
    client: Client<HttpConnector, AxumBody>,
}

impl HttpClientAdapter {
    pub fn new() -> Self {
        let connector = HttpConnector::new();
        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .build(connector);
        Self { client }
    }
}

impl Default for HttpClientAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for HttpClientAdapter {
    async fn send_request(&self, req: Request<AxumBody>) -> HttpClientResult<Response<AxumBody>> {
        let uri = req.uri().clone();
        let response = self
            .client
            .request(req)
            .await
            .map_err(|e| HttpClientError::ConnectionError(format!("{uri}: {e}")))?;
        Ok(response.map(AxumBody::new))
    }

    async fn health_check(&self, url: &str, timeout_secs: u64) -> HttpClientResult<bool> {
        let request = Request::builder()
            .method(hyper::Method::GET)
            .uri(url)
            .body(AxumBody::empty())
            .map_err(|e| HttpClientError::InvalidRequest(e.to_string()))?;

        let outcome = tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            self.client.request(request),
        )
        .await;

        match outcome {
            Err(_) => Err(HttpClientError::Timeout(timeout_secs)),
            Ok(Err(e)) => Err(HttpClientError::ConnectionError(format!("{url}: {e}"))),
            Ok(Ok(response)) => Ok(response.status().is_success()),
        }
    }
}
