//! Scheduler loop.
//!
//! Runs one cycle right away, then one per poll interval. The wait between
//! cycles is cut into short slices so cancellation is noticed quickly.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::Config;
use crate::services::{ConfigSourceFactory, Notifier, SourceFactory, build_notifier};
use crate::storage::{HealthStore, SeenStore};
use crate::utils::clock::{Clock, SystemClock};
use crate::utils::log::humanize_std;

use super::cycle::{CycleEngine, CycleResult, CycleSettings};
use super::health::{HealthMonitor, HealthTicker};
use super::source::SourceSlot;

/// Timing of the loop and of the health tick.
#[derive(Debug, Clone)]
pub struct ScheduleSettings {
    pub poll_interval: Duration,
    pub sleep_slice: Duration,
    pub check_interval: Duration,
    pub announce_startup: bool,
}

impl From<&Config> for ScheduleSettings {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: config.watcher.poll_interval(),
            sleep_slice: config.watcher.sleep_slice(),
            check_interval: config.health.check_interval(),
            announce_startup: config.watcher.announce_startup,
        }
    }
}

pub struct Scheduler {
    engine: CycleEngine,
    ticker: HealthTicker,
    settings: ScheduleSettings,
}

impl Scheduler {
    /// Build the watcher from configuration.
    ///
    /// Fails if the seen-set cannot be read or the listing source or
    /// notifier cannot be created.
    pub async fn from_config(config: Arc<Config>) -> Result<Self> {
        let factory: Arc<dyn SourceFactory> = Arc::new(ConfigSourceFactory::new(config.clone()));
        let notifier = build_notifier(&config)?;
        Self::assemble(&config, factory, notifier, Arc::new(SystemClock)).await
    }

    /// Wire the engine and the health tick around the given collaborators.
    pub async fn assemble(
        config: &Config,
        factory: Arc<dyn SourceFactory>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let store = SeenStore::new(&config.paths.seen_file);
        let seen = store.load().await?;
        let source = Arc::new(SourceSlot::open(factory)?);

        let monitor = Arc::new(HealthMonitor::from_config(config, clock.now()));
        let health_store = HealthStore::new(&config.paths.health_file);
        health_store.publish(&monitor.snapshot()).await;

        let ticker = HealthTicker::new(
            monitor.clone(),
            source.clone(),
            health_store.clone(),
            clock.clone(),
            config.watcher.fetch_timeout(),
        );
        let engine = CycleEngine::new(
            seen,
            store,
            source,
            notifier,
            monitor,
            health_store,
            clock,
            CycleSettings::from(&config.watcher),
        );

        Ok(Self {
            engine,
            ticker,
            settings: ScheduleSettings::from(config),
        })
    }

    /// Replace the loop timing.
    pub fn with_settings(mut self, settings: ScheduleSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Run a single cycle, then stop.
    pub async fn run_once(mut self) -> CycleResult {
        let result = self.engine.run_cycle().await;
        self.engine.shutdown().await;
        result
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// An in-flight cycle always runs to completion. Returns the number of
    /// cycles run.
    pub async fn run(mut self, shutdown: CancellationToken) -> u64 {
        let tick_token = shutdown.child_token();
        let ticker = self
            .ticker
            .spawn(self.settings.check_interval, tick_token.clone());

        log::info!(
            "Watcher started: polling every {}, health check every {}",
            humanize_std(self.settings.poll_interval),
            humanize_std(self.settings.check_interval)
        );
        if self.settings.announce_startup && !shutdown.is_cancelled() {
            self.engine
                .announce_startup(self.settings.poll_interval)
                .await;
        }

        let mut cycles = 0u64;
        loop {
            if shutdown.is_cancelled() {
                log::info!("Shutdown requested before cycle");
                break;
            }

            cycles += 1;
            log::info!("Starting cycle {}", cycles);
            self.engine.run_cycle().await;

            if !sleep_until_next(&self.settings, &shutdown).await {
                log::info!("Shutdown requested during wait");
                break;
            }
        }

        tick_token.cancel();
        if let Err(e) = ticker.await {
            log::error!("Health tick task failed: {}", e);
        }
        self.engine.shutdown().await;
        cycles
    }
}

/// Sleep one poll interval in slices. Returns `false` if cancelled.
async fn sleep_until_next(settings: &ScheduleSettings, shutdown: &CancellationToken) -> bool {
    let deadline = Instant::now() + settings.poll_interval;
    loop {
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        let slice = settings.sleep_slice.min(deadline - now);
        tokio::select! {
            _ = shutdown.cancelled() => return false,
            _ = tokio::time::sleep(slice) => {}
        }
    }
}
