//! Source rows, target order records, and the column mapping between them.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sla_engine::{format_duration, Milestones, TimezoneMap};

use crate::error::SyncError;
use crate::naming::SourceTable;

/// A (brand_name, country_code) summary partition. Country is upper-case.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionKey {
  pub brand_name: String,
  pub country_code: String,
}

impl PartitionKey {
  pub fn new(brand_name: &str, country_code: &str) -> Self {
    Self {
      brand_name: brand_name.to_string(),
      country_code: country_code.to_ascii_uppercase(),
    }
  }
}

impl std::fmt::Display for PartitionKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}/{}", self.brand_name, self.country_code)
  }
}

/// One source order joined with its optional payment/shipment enrichment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceOrder {
  pub order_no: String,
  pub order_status: Option<String>,
  pub shipping_status: Option<String>,
  pub confirmation_status: Option<String>,
  pub currency: Option<String>,
  pub invoice_no: Option<String>,
  pub placed_time: Option<NaiveDateTime>,
  pub processed_time: Option<NaiveDateTime>,
  pub shipped_time: Option<NaiveDateTime>,
  pub delivered_time: Option<NaiveDateTime>,
  pub updated_at: Option<NaiveDateTime>,
  pub payment_method: Option<String>,
  pub payment_status: Option<String>,
  pub paid_amount: Option<f64>,
  pub courier: Option<String>,
  pub tracking_no: Option<String>,
}

/// One row of an `orders_<brand>_<cc>` table, minus `updated_at` which the
/// store stamps on every write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRecord {
  pub order_no: String,
  pub order_status: Option<String>,
  pub shipping_status: Option<String>,
  pub confirmation_status: Option<String>,
  pub placed_time: Option<NaiveDateTime>,
  pub processed_time: Option<NaiveDateTime>,
  pub shipped_time: Option<NaiveDateTime>,
  pub delivered_time: Option<NaiveDateTime>,
  pub processed_tat: Option<String>,
  pub shipped_tat: Option<String>,
  pub delivered_tat: Option<String>,
  pub currency: Option<String>,
  pub invoice_no: Option<String>,
  pub brand_name: String,
  pub country_code: String,
  pub payment_method: Option<String>,
  pub payment_status: Option<String>,
  pub paid_amount: Option<f64>,
  pub courier: Option<String>,
  pub tracking_no: Option<String>,
}

impl OrderRecord {
  /// Map a source row, computing per-stage TATs between consecutive milestones.
  pub fn from_source(
    src: SourceOrder,
    table: &SourceTable,
    timezones: &TimezoneMap,
  ) -> Result<Self, SyncError> {
    let order_no = src.order_no.trim().to_string();
    if order_no.is_empty() {
      return Err(SyncError::validation("order_no", "must not be empty"));
    }
    let country = table.country_code();

    let tat = |from: Option<NaiveDateTime>, to: Option<NaiveDateTime>| -> Result<Option<String>, SyncError> {
      match (from, to) {
        (Some(a), Some(b)) => Ok(Some(format_duration(timezones.elapsed_between(a, b, &country)?))),
        _ => Ok(None),
      }
    };

    let processed_tat = tat(src.placed_time, src.processed_time)?;
    let shipped_tat = tat(src.processed_time, src.shipped_time)?;
    let delivered_tat = tat(src.shipped_time, src.delivered_time)?;

    Ok(Self {
      order_no,
      order_status: src.order_status,
      shipping_status: src.shipping_status,
      confirmation_status: src.confirmation_status,
      placed_time: src.placed_time,
      processed_time: src.processed_time,
      shipped_time: src.shipped_time,
      delivered_time: src.delivered_time,
      processed_tat,
      shipped_tat,
      delivered_tat,
      currency: src.currency,
      invoice_no: src.invoice_no,
      brand_name: table.brand_name.clone(),
      country_code: country.clone(),
      payment_method: src.payment_method,
      payment_status: src.payment_status,
      paid_amount: src.paid_amount,
      courier: src.courier,
      tracking_no: src.tracking_no,
    })
  }

  pub fn milestones(&self) -> Milestones {
    Milestones {
      placed: self.placed_time,
      processed: self.processed_time,
      shipped: self.shipped_time,
      delivered: self.delivered_time,
    }
  }

  /// Apply this record over an existing row the way the upsert does:
  /// milestones and their TATs never regress to NULL, everything else is replaced.
  pub fn merged_over(&self, existing: &OrderRecord) -> OrderRecord {
    let mut merged = self.clone();
    merged.placed_time = self.placed_time.or(existing.placed_time);
    merged.processed_time = self.processed_time.or(existing.processed_time);
    merged.shipped_time = self.shipped_time.or(existing.shipped_time);
    merged.delivered_time = self.delivered_time.or(existing.delivered_time);
    merged.processed_tat = self.processed_tat.clone().or_else(|| existing.processed_tat.clone());
    merged.shipped_tat = self.shipped_tat.clone().or_else(|| existing.shipped_tat.clone());
    merged.delivered_tat = self.delivered_tat.clone().or_else(|| existing.delivered_tat.clone());
    merged
  }
}
