//! Shared application state for the HTTP handlers and the scheduler.

use tokio_util::sync::CancellationToken;

use crate::sync::SyncEngine;
use crate::validate::IntegrityValidator;

pub struct AppState {
  pub engine: SyncEngine,
  pub validator: IntegrityValidator,
  /// Cancelled on shutdown; in-flight runs stop before their next batch.
  pub shutdown: CancellationToken,
}
