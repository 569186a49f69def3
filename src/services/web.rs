use std::net::SocketAddr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;

use crate::services::Service;
use crate::state::{AppState, ServiceStatus};
use crate::web::create_router;

/// Serves the JSON API.
pub struct WebService {
    port: u16,
    app_state: AppState,
}

impl WebService {
    pub fn new(port: u16, app_state: AppState) -> Self {
        Self { port, app_state }
    }
}

#[async_trait]
impl Service for WebService {
    fn name(&self) -> &'static str {
        "web"
    }

    async fn run(self: Box<Self>, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let statuses = self.app_state.service_statuses.clone();
        statuses.set(self.name(), ServiceStatus::Starting);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        info!(%addr, "Web server listening");
        statuses.set(self.name(), ServiceStatus::Active);

        let router = create_router(self.app_state.clone());
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await
            .context("web server error");

        statuses.set(
            self.name(),
            if result.is_ok() {
                ServiceStatus::Disabled
            } else {
                ServiceStatus::Error
            },
        );
        result
    }
}
