//! End-to-end coverage of the router -> balancer -> proxy pipeline against a
//! real backend listener, exercising the scenarios the unit tests can't:
//! full request forwarding and cookie injection round-tripping.

use std::sync::Arc;

use axum::{Router as AxumRouter, body::Body, extract::Request, response::IntoResponse};
use http::StatusCode;
use stormgate::{
    adapters::{HttpClientAdapter, HttpHandler},
    config::models::{ServiceConfig, Strategy},
    core::{Router, Service},
    ports::http_client::HttpClient,
};
use tokio::net::TcpListener;

async fn spawn_echo_backend() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = AxumRouter::new().fallback(move |req: Request| async move {
        let path = req.uri().path().to_string();
        (StatusCode::OK, format!("{addr}{path}")).into_response()
    });
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn service(name: &str, prefix: &str, strategy: Strategy, backends: Vec<String>) -> Arc<Service> {
    let config = ServiceConfig {
        name: name.to_string(),
        path_prefix: prefix.to_string(),
        strategy,
        strategy_config: Default::default(),
        backends,
        health: None,
    };
    Arc::new(Service::build(config).expect("service builds"))
}

#[tokio::test(flavor = "multi_thread")]
async fn forwards_request_and_streams_backend_response() {
    let backend = spawn_echo_backend().await;
    let services = vec![service(
        "widgets",
        "/api/widgets",
        Strategy::RoundRobin,
        vec![backend],
    )];
    let router = Router::build(&services);
    let http_client: Arc<dyn HttpClient> = Arc::new(HttpClientAdapter::new());
    let handler = HttpHandler::new(router, http_client);

    let request = http::Request::builder()
        .uri("/api/widgets/42")
        .body(Body::empty())
        .unwrap();
    let response = handler
        .handle(request, "127.0.0.1:1".parse().unwrap())
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = String::from_utf8(body.to_vec()).unwrap();
    assert!(body.ends_with("/api/widgets/42"));
}

#[tokio::test(flavor = "multi_thread")]
async fn unmatched_prefix_never_reaches_a_backend() {
    let backend = spawn_echo_backend().await;
    let services = vec![service(
        "widgets",
        "/api/widgets",
        Strategy::RoundRobin,
        vec![backend],
    )];
    let router = Router::build(&services);
    let http_client: Arc<dyn HttpClient> = Arc::new(HttpClientAdapter::new());
    let handler = HttpHandler::new(router, http_client);

    let request = http::Request::builder()
        .uri("/not-configured")
        .body(Body::empty())
        .unwrap();
    let response = handler
        .handle(request, "127.0.0.1:1".parse().unwrap())
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread")]
async fn consistent_hash_cookie_injection_round_trips_to_same_backend() {
    let backend_a = spawn_echo_backend().await;
    let backend_b = spawn_echo_backend().await;

    let config = ServiceConfig {
        name: "sessions".to_string(),
        path_prefix: "/sessions".to_string(),
        strategy: Strategy::ConsistentHash,
        strategy_config: [
            (
                "source".to_string(),
                serde_json::Value::String("cookie".to_string()),
            ),
            (
                "inject_if_missing".to_string(),
                serde_json::Value::Bool(true),
            ),
        ]
        .into_iter()
        .collect(),
        backends: vec![backend_a, backend_b],
        health: None,
    };
    let services = vec![Arc::new(Service::build(config).unwrap())];
    let router = Router::build(&services);
    let http_client: Arc<dyn HttpClient> = Arc::new(HttpClientAdapter::new());
    let handler = HttpHandler::new(router, http_client);

    let request = http::Request::builder()
        .uri("/sessions/profile")
        .body(Body::empty())
        .unwrap();
    let first = handler
        .handle(request, "127.0.0.1:1".parse().unwrap())
        .await;
    assert_eq!(first.status(), StatusCode::OK);

    let set_cookie = first
        .headers()
        .get(http::header::SET_COOKIE)
        .expect("a fresh cookie is injected")
        .to_str()
        .unwrap()
        .to_string();
    assert!(set_cookie.starts_with("stormgate-id="));
    assert!(set_cookie.contains("Path=/sessions"));
    let cookie_pair = set_cookie.split(';').next().unwrap().to_string();

    let first_body = axum::body::to_bytes(first.into_body(), usize::MAX)
        .await
        .unwrap();

    // Replay with the injected cookie attached; the hashed key is now
    // stable, so the same backend must answer both requests.
    let second_request = http::Request::builder()
        .uri("/sessions/profile")
        .header(http::header::COOKIE, cookie_pair)
        .body(Body::empty())
        .unwrap();
    let second = handler
        .handle(second_request, "127.0.0.1:1".parse().unwrap())
        .await;
    assert_eq!(second.status(), StatusCode::OK);
    assert!(second.headers().get(http::header::SET_COOKIE).is_none());
    let second_body = axum::body::to_bytes(second.into_body(), usize::MAX)
        .await
        .unwrap();

    assert_eq!(first_body, second_body);
}
