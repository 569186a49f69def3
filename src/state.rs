//! Application state shared by the web API and the scheduler.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Notify;
use ts_rs::TS;

use crate::store::Stores;
use crate::sync::StalenessGate;
use crate::sync::clock::{Clock, SystemClock};

/// Health status of a service.
#[derive(Debug, Clone, Serialize, PartialEq, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum ServiceStatus {
    Starting,
    Active,
    Disabled,
    Error,
}

#[derive(Debug, Clone)]
struct StatusEntry {
    status: ServiceStatus,
    #[allow(dead_code)]
    updated_at: Instant,
}

/// Thread-safe registry for services to self-report their health status.
#[derive(Debug, Clone, Default)]
pub struct ServiceStatusRegistry {
    inner: Arc<DashMap<String, StatusEntry>>,
}

impl ServiceStatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or updates the status for a named service.
    pub fn set(&self, name: &str, status: ServiceStatus) {
        self.inner.insert(
            name.to_owned(),
            StatusEntry {
                status,
                updated_at: Instant::now(),
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<ServiceStatus> {
        self.inner.get(name).map(|entry| entry.status.clone())
    }

    /// Snapshot of all service statuses.
    pub fn all(&self) -> Vec<(String, ServiceStatus)> {
        self.inner
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().status.clone()))
            .collect()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub clock: Arc<dyn Clock>,
    pub service_statuses: ServiceStatusRegistry,
    /// Wakes the scheduler for an immediate cycle.
    pub sync_notify: Arc<Notify>,
    /// Bearer token guarding the admin API; `None` leaves it open.
    pub admin_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(stores: Stores) -> Self {
        Self {
            stores,
            clock: Arc::new(SystemClock),
            service_statuses: ServiceStatusRegistry::new(),
            sync_notify: Arc::new(Notify::new()),
            admin_token: None,
        }
    }

    pub fn with_admin_token(mut self, token: Option<String>) -> Self {
        self.admin_token = token.map(Arc::from);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// A gate view over the shared state store.
    pub fn gate(&self) -> StalenessGate {
        StalenessGate::new(self.stores.state.clone(), self.clock.clone())
    }
}
