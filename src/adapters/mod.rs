//! Concrete implementations of the `ports` traits: the pooling HTTP client
//! used to reach backends, the per-service health-check loop, and the
//! request dispatcher.

pub mod health_checker;
pub mod http_client;
pub mod http_handler;

pub use health_checker::HealthChecker;
pub use http_client::HttpClientAdapter;
pub use http_handler::HttpHandler;
