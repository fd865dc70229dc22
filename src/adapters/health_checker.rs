//! One task per service with a `health` block: on a fixed tick, probe every
//! declared backend and install the healthy subset directly into that
//! service's balancer. There is no threshold or consecutive-failure
//! hysteresis — each tick's result fully replaces the previous one.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::{
    core::service::Service,
    ports::http_client::HttpClient,
    utils::graceful_shutdown::ShutdownToken,
};

pub struct HealthChecker {
    http_client: Arc<dyn HttpClient>,
}

impl HealthChecker {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self { http_client }
    }

    /// Spawns the health-check task for `service` if it declares a `health`
    /// block, returning `None` otherwise (services without health checks
    /// are always considered fully healthy).
    pub fn spawn(&self, service: Arc<Service>, mut shutdown: ShutdownToken) -> Option<JoinHandle<()>> {
        let health = service.config.health.clone()?;
        let http_client = self.http_client.clone();
        let interval = std::time::Duration::from_millis(health.frequency.max(1) as u64);

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick fires immediately; skip it so the balancer starts
            // with its uniform "all backends healthy" snapshot until the
            // first real probe completes.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        run_once(&service, &health.endpoint, http_client.as_ref()).await;
                    }
                    _ = shutdown.wait_for_shutdown() => {
                        tracing::debug!(service = %service.config.name, "health-check task shutting down");
                        return;
                    }
                }
            }
        }))
    }
}

async fn run_once(service: &Arc<Service>, endpoint: &str, http_client: &dyn HttpClient) {
    let mut healthy = Vec::new();
    for backend in &service.config.backends {
        let url = format!(
            "{}/{}",
            backend.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        );
        match http_client.health_check(&url, 5).await {
            Ok(true) => healthy.push(backend.clone()),
            Ok(false) => {
                tracing::warn!(service = %service.config.name, %backend, "backend reported unhealthy");
            }
            Err(error) => {
                tracing::warn!(service = %service.config.name, %backend, %error, "health probe failed");
            }
        }
    }
    service.balancer.set_healthy_backends(healthy);
}
