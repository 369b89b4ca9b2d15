//! Health monitor and the periodic health tick.
//!
//! All counters live in one `HealthState` behind a `std::sync::Mutex`.
//! The lock is only taken for short synchronous updates and is never held
//! across an `.await`. Code that needs both the source slot and the health
//! state takes the source slot first.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::models::{Config, HealthStatus, Status};
use crate::storage::HealthStore;
use crate::utils::clock::Clock;
use crate::utils::log::humanize;

use super::source::SourceSlot;

/// How a poll cycle ended, as far as health is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Fetch and delivery both worked
    Succeeded,
    /// The cycle completed but the fetch or the delivery failed
    Failed,
    /// The cycle could not run at all
    Aborted,
}

#[derive(Debug, Clone)]
pub struct HealthState {
    pub consecutive_failures: u32,
    pub last_successful_cycle: Option<DateTime<Utc>>,
    pub recoveries: u64,
    pub status: HealthStatus,
}

pub struct HealthMonitor {
    max_consecutive_failures: u32,
    stale_after: chrono::Duration,
    state: Mutex<HealthState>,
}

impl HealthMonitor {
    pub fn new(
        max_consecutive_failures: u32,
        stale_after: chrono::Duration,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            max_consecutive_failures,
            stale_after,
            state: Mutex::new(HealthState {
                consecutive_failures: 0,
                last_successful_cycle: None,
                recoveries: 0,
                status: HealthStatus::starting(start_time),
            }),
        }
    }

    /// Stale after `staleness_factor` poll intervals without a successful cycle.
    pub fn from_config(config: &Config, start_time: DateTime<Utc>) -> Self {
        let poll_ms = config.watcher.poll_interval().as_millis() as f64;
        let stale_ms = (poll_ms * config.health.staleness_factor) as i64;
        Self::new(
            config.health.max_consecutive_failures,
            chrono::Duration::milliseconds(stale_ms),
            start_time,
        )
    }

    fn lock(&self) -> MutexGuard<'_, HealthState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> HealthStatus {
        self.lock().status.clone()
    }

    pub fn state(&self) -> HealthState {
        self.lock().clone()
    }

    pub fn record_fetched(&self, count: usize) {
        self.lock().status.total_courses_found += count as u64;
    }

    pub fn record_email(&self) {
        self.lock().status.emails_sent += 1;
    }

    pub fn record_error(&self) {
        self.lock().status.errors += 1;
    }

    /// Fold a finished cycle into the counters.
    ///
    /// Returns `true` when the failure threshold has been reached and the
    /// source should be recreated.
    pub fn record_cycle(&self, outcome: CycleOutcome, now: DateTime<Utc>) -> bool {
        let mut state = self.lock();
        state.status.last_check = Some(now);

        match outcome {
            CycleOutcome::Succeeded => {
                state.consecutive_failures = 0;
                state.last_successful_cycle = Some(now);
                state.status.transition(Status::Healthy);
            }
            CycleOutcome::Failed => {
                state.consecutive_failures += 1;
                state.status.transition(Status::Degraded);
            }
            CycleOutcome::Aborted => {
                state.consecutive_failures += 1;
                state.status.errors += 1;
                state.status.transition(Status::Error);
            }
        }

        if state.consecutive_failures > 0 {
            log::warn!(
                "{} consecutive failed cycles (limit {})",
                state.consecutive_failures,
                self.max_consecutive_failures
            );
        }
        state.consecutive_failures >= self.max_consecutive_failures
    }

    /// Record the result of a source recovery attempt.
    ///
    /// Only a successful recovery resets the failure counter, so the next
    /// failed cycle retries a recovery that did not work.
    pub fn recovery_finished(&self, recovered: bool) {
        let mut state = self.lock();
        if recovered {
            state.consecutive_failures = 0;
            state.recoveries += 1;
        } else {
            state.status.errors += 1;
        }
    }

    /// No successful cycle within the staleness window.
    ///
    /// Measured from process start until the first cycle succeeds.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        let state = self.lock();
        let reference = state
            .last_successful_cycle
            .unwrap_or(state.status.start_time);
        now - reference > self.stale_after
    }

    /// Degrade a healthy or starting watcher. An `error` status is kept.
    pub fn mark_degraded(&self) {
        let mut state = self.lock();
        if state.status.status != Status::Error {
            state.status.transition(Status::Degraded);
        }
    }

    pub fn mark_checked(&self, now: DateTime<Utc>) {
        self.lock().status.last_check = Some(now);
    }

    pub fn mark_stopped(&self, now: DateTime<Utc>) {
        let mut state = self.lock();
        state.status.last_check = Some(now);
        state.status.transition(Status::Stopped);
    }
}

/// Periodic staleness check, independent of the poll interval.
pub struct HealthTicker {
    monitor: Arc<HealthMonitor>,
    source: Arc<SourceSlot>,
    store: HealthStore,
    clock: Arc<dyn Clock>,
    probe_timeout: Duration,
}

impl HealthTicker {
    pub fn new(
        monitor: Arc<HealthMonitor>,
        source: Arc<SourceSlot>,
        store: HealthStore,
        clock: Arc<dyn Clock>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            monitor,
            source,
            store,
            clock,
            probe_timeout,
        }
    }

    /// One health check.
    ///
    /// When stale, the status drops to degraded and the source is probed;
    /// a failed probe recreates the source. The snapshot is always logged
    /// and published.
    pub async fn tick(&self) {
        if self.monitor.is_stale(self.clock.now()) {
            // Waits for an in-flight cycle, which may have fixed things.
            let mut active = self.source.acquire().await;
            let now = self.clock.now();
            if self.monitor.is_stale(now) {
                let since = self
                    .monitor
                    .state()
                    .last_successful_cycle
                    .map(|at| format!("in {}", humanize(now - at)))
                    .unwrap_or_else(|| "since start".into());
                log::warn!("No successful cycle {since}, probing listing source");
                self.monitor.mark_degraded();

                let probe = match active.ensure() {
                    Ok(source) => tokio::time::timeout(self.probe_timeout, source.probe())
                        .await
                        .unwrap_or_else(|_| Err(AppError::timeout("probe", self.probe_timeout))),
                    Err(e) => Err(e),
                };
                if let Err(e) = probe {
                    log::warn!("Liveness probe failed: {}. Recreating source", e);
                    let recovered = match active.recover().await {
                        Ok(()) => true,
                        Err(e) => {
                            log::error!("Source recovery failed: {}", e);
                            false
                        }
                    };
                    self.monitor.recovery_finished(recovered);
                }
            }
        }

        self.monitor.mark_checked(self.clock.now());
        let snapshot = self.monitor.snapshot();
        log::info!("{}", snapshot.summary_line());
        self.store.publish(&snapshot).await;
    }

    /// Run `tick` every `every` until `shutdown` fires. The first tick is
    /// one interval after start.
    pub fn spawn(self, every: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + every, every);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticks.tick() => self.tick().await,
                }
            }
            log::debug!("Health tick stopped");
        })
    }
}
