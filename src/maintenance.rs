//! Cache maintenance sweeps
//!
//! A sweep evicts (or first tries to refresh) every cache entry older than
//! the configured threshold. Sweeps run on a background interval and on
//! demand; the scheduler talks to the background task only through
//! channels, so it never holds live application state between runs.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::{MaintenanceConfig, MaintenanceMode, DEFAULT_REFRESH_CONCURRENCY};
use crate::resolver::Resolver;

/// What caused a sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepTrigger {
    Scheduled,
    OnDemand,
}

/// Outcome of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Entries re-resolved successfully (refresh mode only)
    pub refreshed: usize,
    /// Entries whose refresh failed (refresh mode only)
    pub failed: usize,
    /// Entries deleted
    pub evicted: usize,
}

/// Messages sent from the background maintenance task
#[derive(Debug, Clone)]
pub enum MaintenanceMessage {
    SweepStarted(SweepTrigger),
    SweepCompleted(SweepTrigger, SweepReport),
}

/// Runs sweeps against a resolver's cache
#[derive(Clone)]
pub struct Maintenance {
    resolver: Resolver,
    mode: MaintenanceMode,
    refresh_concurrency: usize,
}

impl Maintenance {
    pub fn new(resolver: Resolver, mode: MaintenanceMode) -> Self {
        Self {
            resolver,
            mode,
            refresh_concurrency: DEFAULT_REFRESH_CONCURRENCY,
        }
    }

    /// Caps how many stale entries a refresh sweep re-resolves at once
    pub fn with_refresh_concurrency(mut self, limit: usize) -> Self {
        self.refresh_concurrency = limit.max(1);
        self
    }

    pub fn mode(&self) -> MaintenanceMode {
        self.mode
    }

    /// Sweeps entries last refreshed more than `stale_after` ago
    ///
    /// Best-effort: storage and provider failures are logged and counted,
    /// never returned. Store scans run on the blocking pool so foreground
    /// resolutions keep their worker threads.
    pub async fn sweep(&self, stale_after: Duration) -> SweepReport {
        let threshold = stale_threshold(Utc::now(), stale_after);
        let mut report = SweepReport::default();

        if self.mode == MaintenanceMode::Refresh {
            let store = self.resolver.store().clone();
            let stale = match tokio::task::spawn_blocking(move || store.list_stale(threshold)).await
            {
                Ok(Ok(stale)) => stale,
                Ok(Err(e)) => {
                    warn!(error = %e, "failed to list stale cache entries");
                    Vec::new()
                }
                Err(e) => {
                    warn!(error = %e, "stale scan task failed");
                    Vec::new()
                }
            };

            debug!(
                count = stale.len(),
                concurrency = self.refresh_concurrency,
                "refreshing stale cache entries"
            );
            let results: Vec<_> = stream::iter(stale)
                .map(|record| async move {
                    let result = self.resolver.refresh(&record).await;
                    (record, result)
                })
                .buffer_unordered(self.refresh_concurrency)
                .collect()
                .await;
            for (record, result) in results {
                match result {
                    Ok(_) => report.refreshed += 1,
                    Err(e) => {
                        warn!(key = %record.key, error = %e, "background refresh failed");
                        report.failed += 1;
                    }
                }
            }
        }

        let store = self.resolver.store().clone();
        report.evicted = match tokio::task::spawn_blocking(move || store.delete_stale(threshold)).await
        {
            Ok(Ok(evicted)) => evicted,
            Ok(Err(e)) => {
                warn!(error = %e, "failed to evict stale cache entries");
                0
            }
            Err(e) => {
                warn!(error = %e, "eviction task failed");
                0
            }
        };

        info!(
            refreshed = report.refreshed,
            failed = report.failed,
            evicted = report.evicted,
            "cache sweep finished"
        );
        report
    }
}

/// `now - stale_after`, saturating at the earliest representable time
fn stale_threshold(now: DateTime<Utc>, stale_after: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(stale_after)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Handle for controlling the background maintenance task
pub struct MaintenanceHandle {
    /// Channel for receiving maintenance messages
    pub receiver: mpsc::Receiver<MaintenanceMessage>,
    trigger_tx: mpsc::Sender<()>,
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl MaintenanceHandle {
    /// Spawns the background maintenance task
    ///
    /// With `config.enabled` false the periodic timer is off, but on-demand
    /// sweeps via `run_maintenance` still run. Dropping the handle stops
    /// the task.
    pub fn spawn(maintenance: Maintenance, config: MaintenanceConfig) -> Self {
        let (msg_tx, msg_rx) = mpsc::channel(32);
        // Capacity 1: triggers arriving while one is pending coalesce
        let (trigger_tx, mut trigger_rx) = mpsc::channel::<()>(1);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let task = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(config.interval.max(Duration::from_millis(1)));
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Skip the first tick (immediate)
            interval.tick().await;

            loop {
                let trigger = tokio::select! {
                    _ = interval.tick(), if config.enabled => SweepTrigger::Scheduled,
                    Some(()) = trigger_rx.recv() => SweepTrigger::OnDemand,
                    _ = shutdown_rx.recv() => break,
                };

                let _ = msg_tx.try_send(MaintenanceMessage::SweepStarted(trigger));
                let report = maintenance.sweep(config.stale_after).await;
                let _ = msg_tx.try_send(MaintenanceMessage::SweepCompleted(trigger, report));
            }
            debug!("maintenance task stopped");
        });

        Self {
            receiver: msg_rx,
            trigger_tx,
            shutdown_tx,
            task,
        }
    }

    /// Requests an immediate sweep without waiting for it
    ///
    /// Returns false if a request is already pending (it will cover this
    /// one) or the task has stopped.
    pub fn run_maintenance(&self) -> bool {
        self.trigger_tx.try_send(()).is_ok()
    }

    /// Stops the background task, waiting for any running sweep to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }
}

/// Checks for pending maintenance messages without blocking
pub fn try_recv(handle: &mut MaintenanceHandle) -> Option<MaintenanceMessage> {
    handle.receiver.try_recv().ok()
}
