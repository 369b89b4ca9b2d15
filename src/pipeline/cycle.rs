// src/pipeline/cycle.rs

//! Poll cycle engine.
//!
//! One cycle is fetch, diff, notify, persist, prune. Nothing that goes
//! wrong inside a cycle escapes it: every failure is logged and folded
//! into the health counters.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::timeout;

use crate::error::{AppError, Result};
use crate::models::{Item, SeenSet, WatcherConfig};
use crate::services::Notifier;
use crate::storage::{HealthStore, SeenStore};
use crate::utils::clock::Clock;
use crate::utils::log::humanize_std;

use super::diff::CyclePlan;
use super::health::{CycleOutcome, HealthMonitor};
use super::source::{ActiveSource, SourceSlot};

/// Time limits and retention for cycles.
#[derive(Debug, Clone)]
pub struct CycleSettings {
    pub retention_days: u64,
    pub fetch_timeout: Duration,
    pub notify_timeout: Duration,
}

impl From<&WatcherConfig> for CycleSettings {
    fn from(config: &WatcherConfig) -> Self {
        Self {
            retention_days: config.retention_days,
            fetch_timeout: config.fetch_timeout(),
            notify_timeout: config.notify_timeout(),
        }
    }
}

/// Summary of one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleResult {
    /// Fetch and delivery both worked
    pub success: bool,
    /// Items not previously seen
    pub new_count: usize,
    /// Items returned by the source
    pub fetched: usize,
    pub fetch_failed: bool,
    pub notify_failed: bool,
    /// Entries removed by the retention prune
    pub pruned: usize,
    /// The cycle could not run (no listing source)
    pub aborted: bool,
}

impl CycleResult {
    fn aborted() -> Self {
        Self {
            aborted: true,
            ..Self::default()
        }
    }

    pub fn outcome(&self) -> CycleOutcome {
        if self.aborted {
            CycleOutcome::Aborted
        } else if self.success {
            CycleOutcome::Succeeded
        } else {
            CycleOutcome::Failed
        }
    }
}

pub struct CycleEngine {
    seen: SeenSet,
    store: SeenStore,
    source: Arc<SourceSlot>,
    notifier: Arc<dyn Notifier>,
    monitor: Arc<HealthMonitor>,
    health_store: HealthStore,
    clock: Arc<dyn Clock>,
    settings: CycleSettings,
}

impl CycleEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        seen: SeenSet,
        store: SeenStore,
        source: Arc<SourceSlot>,
        notifier: Arc<dyn Notifier>,
        monitor: Arc<HealthMonitor>,
        health_store: HealthStore,
        clock: Arc<dyn Clock>,
        settings: CycleSettings,
    ) -> Self {
        Self {
            seen,
            store,
            source,
            notifier,
            monitor,
            health_store,
            clock,
            settings,
        }
    }

    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }

    pub fn monitor(&self) -> &Arc<HealthMonitor> {
        &self.monitor
    }

    /// Run one cycle.
    ///
    /// The source slot stays locked until the cycle, including any
    /// recovery it triggers, has finished.
    pub async fn run_cycle(&mut self) -> CycleResult {
        let slot = Arc::clone(&self.source);
        let mut active = slot.acquire().await;
        let now = self.clock.now();

        let result = match self.poll(&mut active, now).await {
            Ok(result) => result,
            Err(e) => {
                log::error!("Cycle aborted: {}", e);
                CycleResult::aborted()
            }
        };

        if self.monitor.record_cycle(result.outcome(), now) {
            log::warn!("Failure threshold reached, recreating listing source");
            let recovered = match active.recover().await {
                Ok(()) => true,
                Err(e) => {
                    log::error!("Source recovery failed: {}", e);
                    false
                }
            };
            self.monitor.recovery_finished(recovered);
        }
        drop(active);

        log::info!(
            "Cycle done: {} fetched, {} new, {} pruned, {} tracked{}",
            result.fetched,
            result.new_count,
            result.pruned,
            self.seen.len(),
            if result.success { "" } else { " (failed)" }
        );
        self.health_store.publish(&self.monitor.snapshot()).await;
        result
    }

    async fn poll(
        &mut self,
        active: &mut ActiveSource<'_>,
        now: DateTime<Utc>,
    ) -> Result<CycleResult> {
        let source = active.ensure()?;
        let mut result = CycleResult::default();

        let items = match timeout(self.settings.fetch_timeout, source.fetch()).await {
            Ok(Ok(items)) => items,
            Ok(Err(e)) => {
                log::warn!("Fetch from {} failed: {}", source.name(), e);
                result.fetch_failed = true;
                Vec::new()
            }
            Err(_) => {
                let e = AppError::timeout("fetch", self.settings.fetch_timeout);
                log::warn!("Fetch from {} failed: {}", source.name(), e);
                result.fetch_failed = true;
                Vec::new()
            }
        };
        result.fetched = items.len();
        self.monitor.record_fetched(items.len());

        let plan = CyclePlan::build(&self.seen, &items, now);
        result.new_count = plan.new_items.len();

        let delivered = if plan.has_new() {
            log::info!("Found {} new courses, sending digest", result.new_count);
            let delivered = self.deliver(&plan.new_items).await;
            if delivered {
                self.monitor.record_email();
            } else {
                log::warn!(
                    "Digest not delivered, {} new courses will be retried next cycle",
                    result.new_count
                );
                self.monitor.record_error();
                result.notify_failed = true;
            }
            delivered
        } else {
            false
        };
        plan.commit(&mut self.seen, delivered);
        self.persist(now).await;

        match self.seen.prune_retained(now, self.settings.retention_days) {
            Some(pruned) if !pruned.is_empty() => {
                log::info!("Pruned {} stale entries", pruned.len());
                result.pruned = pruned.len();
                self.persist(now).await;
            }
            Some(_) => {}
            None => log::warn!(
                "Retention of {} days is out of range, skipping prune",
                self.settings.retention_days
            ),
        }

        result.success = !result.fetch_failed && !result.notify_failed;
        Ok(result)
    }

    async fn deliver(&self, items: &[Item]) -> bool {
        match timeout(self.settings.notify_timeout, self.notifier.notify(items)).await {
            Ok(delivered) => delivered,
            Err(_) => {
                log::error!(
                    "{}",
                    AppError::timeout("notify", self.settings.notify_timeout)
                );
                false
            }
        }
    }

    /// Write the seen-set. Failures keep the in-memory state; the next
    /// successful write catches up.
    async fn persist(&self, now: DateTime<Utc>) {
        if let Err(e) = self.store.save(&self.seen, now).await {
            log::error!(
                "Could not save seen-set to {}: {}",
                self.store.path().display(),
                e
            );
        }
    }

    /// Send the optional "watcher started" message. Failure is a warning.
    pub async fn announce_startup(&self, poll_interval: Duration) {
        let subject = "Course watcher started";
        let body = format!(
            "The course watcher is running and will check for new free courses every {}.\n\n\
             Tracking {} previously seen courses.",
            humanize_std(poll_interval),
            self.seen.len()
        );
        let sent = timeout(
            self.settings.notify_timeout,
            self.notifier.announce(subject, &body),
        )
        .await
        .unwrap_or(false);
        if !sent {
            log::warn!("Startup announcement was not delivered");
        }
    }

    /// Publish the final `stopped` status and release the source.
    pub async fn shutdown(&mut self) {
        let mut active = self.source.acquire().await;
        self.monitor.mark_stopped(self.clock.now());
        self.health_store.publish(&self.monitor.snapshot()).await;
        active.release().await;
        log::info!("Watcher stopped");
    }
}
