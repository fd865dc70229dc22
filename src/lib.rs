//! Stormgate - an HTTP/1.1 reverse proxy and application-layer load
//! balancer.
//!
//! Stormgate routes requests by longest-matching path prefix to a
//! configured service, then picks a backend within that service using one
//! of four pluggable strategies (round robin, weighted round robin,
//! random, or consistent-hash-modulo). A per-service health-check loop
//! keeps each balancer's live backend set current.
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters**
//! (implementations) while keeping routing and balancing logic inside
//! `core`. The binary crate wires a [`core::Router`], a
//! [`config::ServerConfig`], and the adapters together; embedders can do
//! the same.
//!
//! # Error Handling
//! Fallible APIs return `eyre::Result<T>` or a domain-specific
//! `thiserror` error type, with context attached via `WrapErr` at each
//! boundary that loses information otherwise (config loading, balancer
//! construction).
pub mod adapters;
pub mod config;
pub mod core;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub use crate::{
    adapters::{HealthChecker, HttpClientAdapter, HttpHandler},
    core::{Balancer, Router, Service},
    ports::http_client::HttpClient,
    utils::GracefulShutdown,
};
