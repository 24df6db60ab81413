//! Periodic sync trigger.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info};

use crate::state::AppState;
use crate::sync::JobFilter;

/// Run a full sync every `period` until the shutdown token fires. A run that
/// overruns its period delays the next tick rather than stacking runs.
pub async fn run_every(state: Arc<AppState>, period: Duration) {
  let mut ticker = time::interval(period);
  ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
  let filter = JobFilter::default();

  info!(period_secs = period.as_secs(), "scheduled sync enabled");
  loop {
    tokio::select! {
      _ = state.shutdown.cancelled() => break,
      _ = ticker.tick() => {}
    }
    match state.engine.sync(&filter, &state.shutdown).await {
      Ok(report) => info!(
        run_id = %report.run_id,
        jobs = report.jobs.len(),
        processed = report.processed,
        errors = report.errors,
        "scheduled sync finished"
      ),
      Err(e) => error!(error = %e, "scheduled sync failed"),
    }
  }
  info!("scheduler stopped");
}
