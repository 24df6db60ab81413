//! Fulfillment stages and the milestone timestamps that drive them.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Where an order currently sits, by its highest-reached milestone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
  #[serde(rename = "Not Processed")]
  NotProcessed,
  Processed,
  Shipped,
  Delivered,
}

impl Stage {
  pub const ALL: [Stage; 4] = [
    Stage::NotProcessed,
    Stage::Processed,
    Stage::Shipped,
    Stage::Delivered,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::NotProcessed => "Not Processed",
      Self::Processed => "Processed",
      Self::Shipped => "Shipped",
      Self::Delivered => "Delivered",
    }
  }

  pub fn from_str_loose(s: &str) -> Option<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "not processed" | "not_processed" | "pending" => Some(Self::NotProcessed),
      "processed" => Some(Self::Processed),
      "shipped" => Some(Self::Shipped),
      "delivered" => Some(Self::Delivered),
      _ => None,
    }
  }

  /// The stage an order moves into next, if any.
  pub fn next(self) -> Option<Self> {
    match self {
      Self::NotProcessed => Some(Self::Processed),
      Self::Processed => Some(Self::Shipped),
      Self::Shipped => Some(Self::Delivered),
      Self::Delivered => None,
    }
  }
}

impl std::fmt::Display for Stage {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// The four milestone timestamps of one order (stored upstream clock).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestones {
  pub placed: Option<NaiveDateTime>,
  pub processed: Option<NaiveDateTime>,
  pub shipped: Option<NaiveDateTime>,
  pub delivered: Option<NaiveDateTime>,
}

impl Milestones {
  /// Highest-reached milestone wins, regardless of gaps below it.
  pub fn current_stage(&self) -> Stage {
    if self.delivered.is_some() {
      Stage::Delivered
    } else if self.shipped.is_some() {
      Stage::Shipped
    } else if self.processed.is_some() {
      Stage::Processed
    } else {
      Stage::NotProcessed
    }
  }

  /// Timestamp at which `stage` was reached. `NotProcessed` maps to placement.
  pub fn reached_at(&self, stage: Stage) -> Option<NaiveDateTime> {
    match stage {
      Stage::NotProcessed => self.placed,
      Stage::Processed => self.processed,
      Stage::Shipped => self.shipped,
      Stage::Delivered => self.delivered,
    }
  }
}
