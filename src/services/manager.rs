use std::time::Duration;

use anyhow::Result;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::services::Service;

/// Owns registered services, spawns them and stops them together.
pub struct ServiceManager {
    pending: Vec<Box<dyn Service>>,
    running: JoinSet<(&'static str, Result<()>)>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Default for ServiceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceManager {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            pending: Vec::new(),
            running: JoinSet::new(),
            shutdown_tx,
        }
    }

    pub fn register_service(&mut self, service: Box<dyn Service>) {
        debug!(service = service.name(), "Service registered");
        self.pending.push(service);
    }

    pub fn has_services(&self) -> bool {
        !self.pending.is_empty() || !self.running.is_empty()
    }

    /// Spawn every registered service onto the runtime.
    pub fn spawn_all(&mut self) {
        for service in self.pending.drain(..) {
            let name = service.name();
            let shutdown_rx = self.shutdown_tx.subscribe();
            self.running
                .spawn(async move { (name, service.run(shutdown_rx).await) });
            info!(service = name, "Service spawned");
        }
    }

    /// Wait for the first service to exit on its own.
    ///
    /// Returns the service's name and whether it failed. Pends forever when
    /// nothing is running.
    pub async fn wait_for_exit(&mut self) -> (String, bool) {
        match self.running.join_next().await {
            Some(Ok((name, Ok(())))) => (name.to_string(), false),
            Some(Ok((name, Err(e)))) => {
                error!(service = name, error = ?e, "Service failed");
                (name.to_string(), true)
            }
            Some(Err(e)) => {
                error!(error = ?e, "Service task panicked");
                ("unknown".to_string(), true)
            }
            None => std::future::pending().await,
        }
    }

    /// Signal every service to stop and wait up to `timeout` for them.
    ///
    /// Returns `true` when all services stopped cleanly in time.
    pub async fn shutdown(mut self, timeout: Duration) -> bool {
        let _ = self.shutdown_tx.send(());

        let drain = async {
            let mut clean = true;
            while let Some(joined) = self.running.join_next().await {
                match joined {
                    Ok((name, Ok(()))) => debug!(service = name, "Service stopped"),
                    Ok((name, Err(e))) => {
                        warn!(service = name, error = ?e, "Service stopped with error");
                        clean = false;
                    }
                    Err(e) => {
                        warn!(error = ?e, "Service task panicked during shutdown");
                        clean = false;
                    }
                }
            }
            clean
        };

        match tokio::time::timeout(timeout, drain).await {
            Ok(clean) => clean,
            Err(_) => {
                warn!(timeout = ?timeout, "Services did not stop in time, aborting");
                false
            }
        }
    }
}
