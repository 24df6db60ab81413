//! HTTP trigger surface: manual sync, validation and cleanup.

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use tracing::error;

use crate::state::AppState;
use crate::sync::{JobFilter, SyncReport};
use crate::validate::{CleanupReport, ValidationReport};

pub async fn health() -> &'static str {
  "ok"
}

/// Body is optional; an empty request syncs every discovered table.
pub async fn run_sync(
  State(state): State<Arc<AppState>>,
  body: Option<Json<JobFilter>>,
) -> Result<Json<SyncReport>, StatusCode> {
  let filter = body.map(|Json(f)| f).unwrap_or_default();
  match state.engine.sync(&filter, &state.shutdown).await {
    Ok(report) => Ok(Json(report)),
    Err(e) => {
      error!(error = %e, "sync: run failed");
      Err(StatusCode::INTERNAL_SERVER_ERROR)
    }
  }
}

pub async fn run_validate(
  State(state): State<Arc<AppState>>,
) -> Result<Json<ValidationReport>, StatusCode> {
  state.validator.validate().await.map(Json).map_err(|e| {
    error!(error = %e, "validate: failed");
    StatusCode::INTERNAL_SERVER_ERROR
  })
}

pub async fn run_cleanup(
  State(state): State<Arc<AppState>>,
) -> Result<Json<CleanupReport>, StatusCode> {
  state.validator.cleanup().await.map(Json).map_err(|e| {
    error!(error = %e, "cleanup: failed");
    StatusCode::INTERNAL_SERVER_ERROR
  })
}
