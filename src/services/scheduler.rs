use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::services::Service;
use crate::state::{ServiceStatus, ServiceStatusRegistry};
use crate::sync::scheduler::Scheduler;

/// Runs the refresh [`Scheduler`] as a service.
pub struct SchedulerService {
    scheduler: Scheduler,
    statuses: ServiceStatusRegistry,
}

impl SchedulerService {
    pub fn new(scheduler: Scheduler, statuses: ServiceStatusRegistry) -> Self {
        Self {
            scheduler,
            statuses,
        }
    }
}

#[async_trait]
impl Service for SchedulerService {
    fn name(&self) -> &'static str {
        "scheduler"
    }

    async fn run(self: Box<Self>, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        self.statuses.set(self.name(), ServiceStatus::Active);
        self.scheduler.run(shutdown_rx).await;
        self.statuses.set(self.name(), ServiceStatus::Disabled);
        Ok(())
    }
}
