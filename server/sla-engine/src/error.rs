//! Structured error types for the SLA engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SlaError {
  #[error("validation: {field}: {reason}")]
  Validation { field: String, reason: String },

  #[error("parse: {0}")]
  Parse(String),

  #[error("unknown country: {0}")]
  UnknownCountry(String),

  #[error("invalid threshold for {brand_name}/{country_code}: {reason}")]
  InvalidThreshold {
    brand_name: String,
    country_code: String,
    reason: String,
  },
}

impl SlaError {
  pub fn validation(field: &str, reason: &str) -> Self {
    Self::Validation {
      field: field.to_string(),
      reason: reason.to_string(),
    }
  }

  pub fn parse(msg: impl Into<String>) -> Self {
    Self::Parse(msg.into())
  }
}
