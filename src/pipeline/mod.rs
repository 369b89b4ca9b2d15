//! Watcher pipeline.
//!
//! - `diff`: compare one poll with the seen-set
//! - `source`: the live listing source and its recovery
//! - `health`: failure counters, staleness and the health tick
//! - `cycle`: one fetch, diff, notify, persist, prune cycle
//! - `scheduler`: the long-running loop
//!
//! `run_forever` and `run_once` are the entry points used by the CLI.

mod cycle;
mod diff;
mod health;
mod scheduler;
mod source;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::Config;

pub use cycle::{CycleEngine, CycleResult, CycleSettings};
pub use diff::CyclePlan;
pub use health::{CycleOutcome, HealthMonitor, HealthState, HealthTicker};
pub use scheduler::{ScheduleSettings, Scheduler};
pub use source::{ActiveSource, SourceSlot};

/// Run the watcher until `shutdown` is cancelled.
///
/// Errors only when the watcher cannot be built.
pub async fn run_forever(config: Arc<Config>, shutdown: CancellationToken) -> Result<()> {
    let scheduler = Scheduler::from_config(config).await?;
    let cycles = scheduler.run(shutdown).await;
    log::info!("Watcher exited after {} cycles", cycles);
    Ok(())
}

/// Run exactly one cycle.
pub async fn run_once(config: Arc<Config>) -> Result<CycleResult> {
    let scheduler = Scheduler::from_config(config).await?;
    Ok(scheduler.run_once().await)
}
