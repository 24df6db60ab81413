//! Per-day, per-stage SLA summary aggregation for one brand+country partition.
//!
//! Summaries are always rebuilt from the full set of orders; there is no
//! incremental merge path.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::{Classifier, SlaStatus};
use crate::error::SlaError;
use crate::stage::{Milestones, Stage};
use crate::tat::TatConfig;

/// One `sla_daily_summary` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
  pub summary_date: NaiveDate,
  pub brand_name: String,
  pub country_code: String,
  pub stage: Stage,
  pub orders_total: i64,
  pub orders_on_time: i64,
  pub orders_on_risk: i64,
  pub orders_breached: i64,
  pub avg_delay_seconds: f64,
}

#[derive(Debug, Clone, Default)]
struct Bucket {
  total: i64,
  on_time: i64,
  on_risk: i64,
  breached: i64,
  delay_seconds: u64,
}

/// Accumulates orders into summary buckets keyed by (local placement date, stage).
pub struct SummaryBuilder<'a> {
  classifier: &'a Classifier,
  brand_name: String,
  country_code: String,
  tat: TatConfig,
  now: DateTime<Utc>,
  buckets: BTreeMap<(NaiveDate, Stage), Bucket>,
  skipped: u64,
}

impl<'a> SummaryBuilder<'a> {
  pub fn new(
    classifier: &'a Classifier,
    brand_name: &str,
    country_code: &str,
    tat: TatConfig,
    now: DateTime<Utc>,
  ) -> Self {
    Self {
      classifier,
      brand_name: brand_name.to_string(),
      country_code: country_code.to_ascii_uppercase(),
      tat,
      now,
      buckets: BTreeMap::new(),
      skipped: 0,
    }
  }

  /// Count one order, once, in its current stage.
  pub fn add(&mut self, milestones: &Milestones) -> Result<(), SlaError> {
    let placed = match milestones.placed {
      Some(p) => p,
      None => {
        self.skipped += 1;
        return Ok(());
      }
    };

    let sla = self
      .classifier
      .evaluate_order(&self.country_code, milestones, &self.tat, self.now)?;
    let contribution = sla.contribution();
    let date = self.classifier.timezones().local_date(placed, &self.country_code);

    let bucket = self.buckets.entry((date, sla.current_stage)).or_default();
    bucket.total += 1;
    match contribution.status {
      SlaStatus::OnTime => bucket.on_time += 1,
      SlaStatus::AtRisk => bucket.on_risk += 1,
      SlaStatus::Breached => {
        bucket.breached += 1;
        let sla_minutes = self.tat.stage_sla_minutes(contribution.stage).unwrap_or(0);
        bucket.delay_seconds += contribution.delay_minutes(sla_minutes) * 60;
      }
      SlaStatus::NotApplicable => {}
    }
    Ok(())
  }

  /// Orders without a placement time, which cannot be dated.
  pub fn skipped(&self) -> u64 {
    self.skipped
  }

  pub fn finish(self) -> Vec<SummaryRow> {
    self
      .buckets
      .into_iter()
      .map(|((summary_date, stage), b)| SummaryRow {
        summary_date,
        brand_name: self.brand_name.clone(),
        country_code: self.country_code.clone(),
        stage,
        orders_total: b.total,
        orders_on_time: b.on_time,
        orders_on_risk: b.on_risk,
        orders_breached: b.breached,
        avg_delay_seconds: if b.breached > 0 {
          b.delay_seconds as f64 / b.breached as f64
        } else {
          0.0
        },
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::{Duration, NaiveDateTime, TimeZone};

  fn stored(h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, 15)
      .unwrap()
      .and_hms_opt(h, 0, 0)
      .unwrap()
  }

  #[test]
  fn each_order_counted_once_in_current_stage() {
    let classifier = Classifier::with_defaults();
    let now = Utc.with_ymd_and_hms(2025, 1, 20, 0, 0, 0).unwrap();
    let mut b = SummaryBuilder::new(&classifier, "Brand", "sg", TatConfig::fallback(), now);

    let p = stored(1);
    b.add(&Milestones {
      placed: Some(p),
      processed: Some(p + Duration::minutes(30)),
      ..Milestones::default()
    })
    .unwrap();
    b.add(&Milestones {
      placed: Some(p),
      processed: Some(p + Duration::minutes(200)),
      ..Milestones::default()
    })
    .unwrap();
    b.add(&Milestones {
      placed: Some(p),
      processed: Some(p + Duration::minutes(10)),
      shipped: Some(p + Duration::minutes(20)),
      delivered: Some(p + Duration::minutes(60)),
    })
    .unwrap();
    b.add(&Milestones::default()).unwrap();
    assert_eq!(b.skipped(), 1);

    let rows = b.finish();
    assert_eq!(rows.len(), 2);
    let processed = rows.iter().find(|r| r.stage == Stage::Processed).unwrap();
    assert_eq!(processed.orders_total, 2);
    assert_eq!(processed.orders_on_time, 1);
    assert_eq!(processed.orders_breached, 1);
    // 200m against a 2h SLA is 80 minutes late.
    assert!((processed.avg_delay_seconds - 4800.0).abs() < f64::EPSILON);
    assert_eq!(processed.country_code, "SG");

    let delivered = rows.iter().find(|r| r.stage == Stage::Delivered).unwrap();
    assert_eq!(delivered.orders_total, 1);
    assert_eq!(delivered.orders_on_time, 1);
    let total: i64 = rows.iter().map(|r| r.orders_total).sum();
    assert_eq!(total, 3);
  }

  #[test]
  fn buckets_split_by_local_date() {
    let classifier = Classifier::with_defaults();
    let now = Utc.with_ymd_and_hms(2025, 1, 20, 0, 0, 0).unwrap();
    let mut b = SummaryBuilder::new(&classifier, "Brand", "SG", TatConfig::fallback(), now);
    // Stored 07:00 -> SG 23:00 on the 15th; stored 09:00 -> SG 01:00 on the 16th.
    b.add(&Milestones { placed: Some(stored(7)), ..Milestones::default() }).unwrap();
    b.add(&Milestones { placed: Some(stored(9)), ..Milestones::default() }).unwrap();
    let rows = b.finish();
    let dates: Vec<_> = rows.iter().map(|r| r.summary_date.to_string()).collect();
    assert_eq!(dates, vec!["2025-01-15", "2025-01-16"]);
    assert!(rows.iter().all(|r| r.stage == Stage::NotProcessed && r.orders_breached == 1));
  }
}
