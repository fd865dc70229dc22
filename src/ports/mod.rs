//! Trait boundaries between the core business logic and the outside world:
//! the HTTP client used to reach backends, and the HTTP server/handler
//! surface the dispatcher implements.

pub mod http_client;
pub mod http_server;

pub use http_client::{HttpClient, HttpClientError, HttpClientResult};
pub use http_server::{HandlerError, HttpHandler, HttpServer};
