use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{BoxError, error_handling::HandleErrorLayer, http::StatusCode};
use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use stormgate::{
    adapters::{HealthChecker, HttpClientAdapter, HttpHandler},
    config::loader::load_config,
    core::{Router as ServiceRouter, Service},
    ports::http_client::HttpClient,
    tracing_setup,
    utils::GracefulShutdown,
};
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;

/// Reverse proxy and load balancer. Reads `config.yaml` from the working
/// directory by default.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Path to the YAML configuration file.
    #[clap(short, long, default_value = "config.yaml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_setup::init_tracing().map_err(|e| eyre!("failed to initialize tracing: {e}"))?;

    let args = Args::parse();

    tracing::info!(config_path = %args.config, "loading configuration");
    let config = load_config(&args.config)
        .await
        .with_context(|| format!("failed to load configuration from {}", args.config))?;

    let services: Vec<Arc<Service>> = config
        .services
        .into_iter()
        .map(|service_config| {
            Service::build(service_config)
                .map(Arc::new)
                .map_err(|e| eyre!(e))
        })
        .collect::<Result<_>>()
        .context("failed to build one or more services")?;

    let router = ServiceRouter::build(&services);

    let http_client: Arc<dyn HttpClient> = Arc::new(HttpClientAdapter::new());
    let handler = Arc::new(HttpHandler::new(router, http_client.clone()));

    let shutdown = Arc::new(GracefulShutdown::new());
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal_shutdown.run_signal_handler().await {
            tracing::error!("signal handler error: {e}");
        }
    });

    let health_checker = HealthChecker::new(http_client.clone());
    let mut health_tasks = Vec::new();
    for service in &services {
        if let Some(task) = health_checker.spawn(service.clone(), shutdown.shutdown_token()) {
            health_tasks.push(task);
        }
    }

    let bind_addr: SocketAddr = format!("{}:{}", config.server.bind_ip, config.server.bind_port)
        .parse()
        .context("failed to parse server.bind_ip/bind_port as a socket address")?;

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind to {bind_addr}"))?;

    tracing::info!(%bind_addr, services = services.len(), "stormgate listening");

    let mut app = axum::Router::new().fallback(
        move |axum::extract::ConnectInfo(addr): axum::extract::ConnectInfo<SocketAddr>,
              request: axum::extract::Request| {
            let handler = handler.clone();
            async move { handler.handle(request, addr).await }
        },
    );

    // `read_time_out`/`write_time_out` together bound how long a single
    // request is allowed to take end to end; there is no separate hook for
    // inbound-read vs outbound-write deadlines in the axum/hyper server, so
    // the sum is applied as one overall per-request timeout.
    let total_timeout_ms = config.server.read_time_out.max(0) as u64
        + config.server.write_time_out.max(0) as u64;
    if total_timeout_ms > 0 {
        app = app.layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_timeout_error))
                .layer(TimeoutLayer::new(Duration::from_millis(total_timeout_ms))),
        );
    }

    tokio::select! {
        result = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()) => {
            result.context("server error")?;
        }
        reason = shutdown.wait_for_shutdown_signal() => {
            tracing::info!(?reason, "shutdown signal received");
            for task in &health_tasks {
                task.abort();
            }
        }
    }

    tracing_setup::shutdown_tracing();
    Ok(())
}

async fn handle_timeout_error(err: BoxError) -> (StatusCode, String) {
    if err.is::<tower::timeout::error::Elapsed>() {
        (StatusCode::REQUEST_TIMEOUT, "request timed out".to_string())
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("unhandled middleware error: {err}"),
        )
    }
}
