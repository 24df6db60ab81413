//! Structured error types for the sync pipeline.

use sla_engine::SlaError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
  #[error("database: {0}")]
  Database(#[from] sqlx_core::Error),

  #[error("invalid identifier: {0}")]
  InvalidIdentifier(String),

  #[error("missing source table: {0}")]
  MissingSourceTable(String),

  #[error("validation: {field}: {reason}")]
  Validation { field: String, reason: String },

  #[error("sla: {0}")]
  Sla(#[from] SlaError),

  #[error("config: {0}")]
  Config(String),

  #[error("json: {0}")]
  Json(#[from] serde_json::Error),

  #[error("io: {0}")]
  Io(#[from] std::io::Error),
}

impl SyncError {
  pub fn validation(field: &str, reason: &str) -> Self {
    Self::Validation {
      field: field.to_string(),
      reason: reason.to_string(),
    }
  }

  pub fn config(msg: impl Into<String>) -> Self {
    Self::Config(msg.into())
  }
}
