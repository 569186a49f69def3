//! Long-running services and their lifecycle.

pub mod manager;
pub mod scheduler;
pub mod signals;
pub mod web;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;

/// A component that runs until told to stop.
#[async_trait]
pub trait Service: Send {
    fn name(&self) -> &'static str;

    /// Run until `shutdown_rx` receives, then return.
    async fn run(self: Box<Self>, shutdown_rx: broadcast::Receiver<()>) -> Result<()>;
}
