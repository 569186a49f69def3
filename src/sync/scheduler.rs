//! Drives refresh cycles on a fixed tick, plus on demand.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{Notify, broadcast};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace, warn};

use crate::directory::{ClientOptions, DirectoryClient};
use crate::settings::DirectorySettings;
use crate::store::Stores;
use crate::sync::clock::Clock;
use crate::sync::cycle::{CycleReport, Pipeline};
use crate::utils::{fmt_duration, log_if_slow};

/// Cycles slower than this are worth a warning.
const SLOW_CYCLE_THRESHOLD: Duration = Duration::from_secs(30);

/// Builds a [`Pipeline`] from the current settings and runs it.
#[derive(Clone)]
pub struct SyncRunner {
    stores: Stores,
    http: reqwest::Client,
    options: ClientOptions,
    clock: Arc<dyn Clock>,
    import_timeout: Duration,
}

impl SyncRunner {
    pub fn new(
        stores: Stores,
        http: reqwest::Client,
        options: ClientOptions,
        clock: Arc<dyn Clock>,
        import_timeout: Duration,
    ) -> Self {
        Self {
            stores,
            http,
            options,
            clock,
            import_timeout,
        }
    }

    /// A pipeline over a client resolved from the stored settings.
    ///
    /// Settings are re-read every time so admin edits apply on the next cycle.
    pub async fn pipeline(&self) -> Result<Pipeline> {
        let settings = DirectorySettings::load(self.stores.state.as_ref())
            .await?
            .unwrap_or_default();
        let client =
            DirectoryClient::from_settings(self.http.clone(), &settings, self.options.clone());
        Ok(
            Pipeline::new(Arc::new(client), self.stores.clone(), self.clock.clone())
                .with_import_timeout(self.import_timeout),
        )
    }

    pub async fn run_once(&self) -> Result<CycleReport> {
        let start = std::time::Instant::now();
        let report = self.pipeline().await?.run_cycle().await?;
        let elapsed = log_if_slow(start, SLOW_CYCLE_THRESHOLD, "refresh cycle");
        trace!(duration = fmt_duration(elapsed), "Cycle complete");
        Ok(report)
    }
}

/// Evaluates every gate once per interval, or sooner when notified.
pub struct Scheduler {
    runner: SyncRunner,
    interval: Duration,
    notify: Arc<Notify>,
}

impl Scheduler {
    pub fn new(runner: SyncRunner, interval: Duration, notify: Arc<Notify>) -> Self {
        Self {
            runner,
            interval,
            notify,
        }
    }

    /// Run until a shutdown signal arrives.
    ///
    /// A tick that lands while the previous cycle is still running is
    /// skipped. On shutdown the running cycle is cancelled and given five
    /// seconds to wind down before it is abandoned.
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(interval = fmt_duration(self.interval), "Scheduler started");

        let mut next_run = time::Instant::now();
        let mut current_work: Option<(tokio::task::JoinHandle<()>, CancellationToken)> = None;

        loop {
            tokio::select! {
                _ = self.notify.notified() => {
                    info!("Refresh cycle triggered manually");
                    next_run = time::Instant::now();
                    continue;
                }
                _ = time::sleep_until(next_run) => {
                    if let Some((ref handle, _)) = current_work
                        && !handle.is_finished()
                    {
                        trace!("Previous cycle still running, skipping");
                        next_run = time::Instant::now() + self.interval;
                        continue;
                    }

                    let cancel_token = CancellationToken::new();
                    let handle = tokio::spawn({
                        let runner = self.runner.clone();
                        let cancel_token = cancel_token.clone();
                        async move {
                            tokio::select! {
                                result = runner.run_once() => {
                                    if let Err(e) = result {
                                        error!(error = ?e, "Refresh cycle failed");
                                    }
                                }
                                _ = cancel_token.cancelled() => {
                                    warn!("Refresh cycle cancelled");
                                }
                            }
                        }
                    });
                    current_work = Some((handle, cancel_token));
                    next_run = time::Instant::now() + self.interval;
                }
                _ = shutdown_rx.recv() => {
                    info!("Scheduler received shutdown signal");
                    if let Some((handle, cancel_token)) = current_work.take() {
                        cancel_token.cancel();
                        if time::timeout(Duration::from_secs(5), handle).await.is_err() {
                            warn!("Refresh cycle did not stop in time, abandoning it");
                        }
                    }
                    break;
                }
            }
        }

        info!("Scheduler stopped");
    }
}
