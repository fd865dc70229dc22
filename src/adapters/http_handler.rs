//! The request dispatcher: look up a route, pick a backend, forward the
//! request, and stamp a `Set-Cookie` header if the balancer minted one.
//! Route miss and no-service both answer 404, a balancer failure answers
//! 500, and a forwarding failure answers 502.

use std::{net::SocketAddr, sync::Arc, time::Instant};

use axum::body::Body;
use http::{HeaderValue, Request, Response, StatusCode, header::SET_COOKIE};

use crate::{
    core::{balancer::InjectCookie, router::Router},
    ports::http_client::HttpClient,
    tracing_setup::create_request_span,
};

pub struct HttpHandler {
    router: Router,
    http_client: Arc<dyn HttpClient>,
}

impl HttpHandler {
    pub fn new(router: Router, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            router,
            http_client,
        }
    }

    pub async fn handle(&self, mut request: Request<Body>, client_addr: SocketAddr) -> Response<Body> {
        request.extensions_mut().insert(client_addr);

        let method = request.method().to_string();
        let path = request.uri().path().to_string();
        let request_id = uuid::Uuid::new_v4().to_string();
        let span = create_request_span(&method, &path, &request_id);
        let _guard = span.enter();
        let started = Instant::now();

        let response = self.route_request(request).await;

        tracing::info!(
            status = response.status().as_u16(),
            duration_ms = started.elapsed().as_millis() as u64,
            "request handled"
        );

        response
    }

    async fn route_request(&self, mut request: Request<Body>) -> Response<Body> {
        let path = request.uri().path().to_string();

        let Some(route) = self.router.route(&path) else {
            return plain_text_response(StatusCode::NOT_FOUND, "route not found");
        };
        let service = route.service.clone();

        let backend = match service.balancer.pick(&mut request) {
            Ok(backend) => backend,
            Err(error) => {
                tracing::error!(service = %service.config.name, %error, "failed to pick a backend");
                return plain_text_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &format!("E-1 Internal Server Error {error}"),
                );
            }
        };

        let injected_cookie = request.extensions().get::<InjectCookie>().cloned();

        let outbound = match build_outbound_request(request, &backend) {
            Ok(req) => req,
            Err(error) => {
                tracing::error!(%backend, %error, "failed to build outbound request");
                return plain_text_response(StatusCode::BAD_GATEWAY, "failed to build request");
            }
        };

        let mut response = match self.http_client.send_request(outbound).await {
            Ok(response) => response,
            Err(error) => {
                tracing::error!(%backend, %error, "backend unreachable");
                return plain_text_response(StatusCode::BAD_GATEWAY, "backend unreachable");
            }
        };

        if let Some(InjectCookie(value)) = injected_cookie {
            set_session_cookie(&mut response, &service.config.path_prefix, &value);
        }

        response
    }
}

/// Rewrites the request's URI to the picked backend while leaving the
/// method, headers, and body untouched — no hop-by-hop header stripping is
/// performed (see module docs).
fn build_outbound_request(request: Request<Body>, backend: &str) -> eyre::Result<Request<Body>> {
    let (mut parts, body) = request.into_parts();

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let uri = format!("{}{path_and_query}", backend.trim_end_matches('/'));
    parts.uri = uri.parse()?;

    Ok(Request::from_parts(parts, body))
}

fn set_session_cookie(response: &mut Response<Body>, path: &str, value: &str) {
    let cookie = format!(
        "stormgate-id={value}; Path={path}; HttpOnly; Max-Age=31536000"
    );
    if let Ok(header_value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().append(SET_COOKIE, header_value);
    }
}

fn plain_text_response(status: StatusCode, message: &str) -> Response<Body> {
    Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from(message.to_string()))
        .expect("static response is always well-formed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::models::{ServiceConfig, Strategy},
        core::service::Service,
        ports::http_client::{HttpClientError, HttpClientResult},
    };
    use async_trait::async_trait;

    struct EchoClient;

    #[async_trait]
    impl HttpClient for EchoClient {
        async fn send_request(&self, req: Request<Body>) -> HttpClientResult<Response<Body>> {
            Ok(Response::builder()
                .status(StatusCode::OK)
                .body(Body::from(req.uri().to_string()))
                .unwrap())
        }

        async fn health_check(&self, _url: &str, _timeout_secs: u64) -> HttpClientResult<bool> {
            Ok(true)
        }
    }

    struct AlwaysFailsClient;

    #[async_trait]
    impl HttpClient for AlwaysFailsClient {
        async fn send_request(&self, _req: Request<Body>) -> HttpClientResult<Response<Body>> {
            Err(HttpClientError::ConnectionError("refused".to_string()))
        }

        async fn health_check(&self, _url: &str, _timeout_secs: u64) -> HttpClientResult<bool> {
            Ok(false)
        }
    }

    fn service(prefix: &str, backend: &str) -> Arc<Service> {
        let config = ServiceConfig {
            name: prefix.trim_matches('/').to_string(),
            path_prefix: prefix.to_string(),
            strategy: Strategy::RoundRobin,
            strategy_config: Default::default(),
            backends: vec![backend.to_string()],
            health: None,
        };
        Arc::new(Service::build(config).unwrap())
    }

    fn request(path: &str) -> Request<Body> {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn unmatched_path_is_404() {
        let router = Router::build(&[service("/api", "http://127.0.0.1:9000")]);
        let handler = HttpHandler::new(router, Arc::new(EchoClient));

        let response = handler
            .handle(request("/elsewhere"), "127.0.0.1:1".parse().unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn matched_path_is_forwarded_to_backend() {
        let router = Router::build(&[service("/api", "http://backend.internal")]);
        let handler = HttpHandler::new(router, Arc::new(EchoClient));

        let response = handler
            .handle(request("/api/widgets"), "127.0.0.1:1".parse().unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn backend_failure_is_502() {
        let router = Router::build(&[service("/api", "http://backend.internal")]);
        let handler = HttpHandler::new(router, Arc::new(AlwaysFailsClient));

        let response = handler
            .handle(request("/api/widgets"), "127.0.0.1:1".parse().unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
