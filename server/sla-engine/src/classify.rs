//! Stage classification (On Time / At Risk / Breached / N/A) and alert severity.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::duration::{format_duration, parse_duration, scale_minutes};
use crate::error::SlaError;
use crate::stage::{Milestones, Stage};
use crate::tat::TatConfig;
use crate::timezone::TimezoneMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlaStatus {
  #[serde(rename = "On Time")]
  OnTime,
  #[serde(rename = "At Risk")]
  AtRisk,
  Breached,
  #[serde(rename = "N/A")]
  NotApplicable,
}

/// Alert severity of the order's open stage. Independent of `SlaStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  None,
  Urgent,
  Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageResult {
  pub stage: Stage,
  pub status: SlaStatus,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub actual_minutes: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub actual: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub exceeded_by: Option<String>,
  /// Milestone not reached yet; `actual` is measured against now.
  pub pending: bool,
}

impl StageResult {
  pub fn not_applicable(stage: Stage) -> Self {
    Self {
      stage,
      status: SlaStatus::NotApplicable,
      actual_minutes: None,
      actual: None,
      exceeded_by: None,
      pending: false,
    }
  }

  /// Minutes past the SLA, when breached.
  pub fn delay_minutes(&self, sla_minutes: u64) -> u64 {
    match (self.status, self.actual_minutes) {
      (SlaStatus::Breached, Some(actual)) => actual.saturating_sub(sla_minutes),
      _ => 0,
    }
  }
}

/// Strict comparisons: reaching the threshold exactly is still within it.
pub fn status_for(actual_minutes: u64, sla_minutes: u64, risk_minutes: u64) -> SlaStatus {
  if sla_minutes == 0 {
    SlaStatus::NotApplicable
  } else if actual_minutes > sla_minutes {
    SlaStatus::Breached
  } else if actual_minutes > risk_minutes {
    SlaStatus::AtRisk
  } else {
    SlaStatus::OnTime
  }
}

/// Per-order SLA view: one current stage, three stage results, one severity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderSla {
  pub current_stage: Stage,
  pub processed: StageResult,
  pub shipped: StageResult,
  pub delivered: StageResult,
  pub severity: Severity,
}

impl OrderSla {
  pub fn stage(&self, stage: Stage) -> Option<&StageResult> {
    match stage {
      Stage::NotProcessed => None,
      Stage::Processed => Some(&self.processed),
      Stage::Shipped => Some(&self.shipped),
      Stage::Delivered => Some(&self.delivered),
    }
  }

  /// The result an order contributes to its current stage's summary bucket.
  /// Not Processed orders count by their pending processing stage.
  pub fn contribution(&self) -> &StageResult {
    match self.current_stage {
      Stage::NotProcessed | Stage::Processed => &self.processed,
      Stage::Shipped => &self.shipped,
      Stage::Delivered => &self.delivered,
    }
  }
}

/// Timezone-aware classifier. All elapsed time goes through local-time strings.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
  timezones: TimezoneMap,
}

impl Classifier {
  pub fn new(timezones: TimezoneMap) -> Self {
    Self { timezones }
  }

  pub fn with_defaults() -> Self {
    Self::default()
  }

  pub fn timezones(&self) -> &TimezoneMap {
    &self.timezones
  }

  /// Classify one stage measured from placement.
  ///
  /// With a milestone, `actual` is placement -> milestone; without one the
  /// stage is pending and `actual` is placement -> `now`.
  #[allow(clippy::too_many_arguments)]
  pub fn classify_stage(
    &self,
    stage: Stage,
    country_code: &str,
    placed: NaiveDateTime,
    milestone: Option<NaiveDateTime>,
    sla: &str,
    risk_pct: f64,
    now: DateTime<Utc>,
  ) -> Result<StageResult, SlaError> {
    let sla_minutes = parse_duration(sla);
    if sla_minutes == 0 {
      return Ok(StageResult::not_applicable(stage));
    }
    let risk_minutes = scale_minutes(sla_minutes, risk_pct);

    let (actual, pending) = match milestone {
      Some(at) => (self.timezones.elapsed_between(placed, at, country_code)?, false),
      None => (self.timezones.elapsed_until(placed, now, country_code)?, true),
    };

    let status = status_for(actual, sla_minutes, risk_minutes);
    let exceeded_by = match status {
      SlaStatus::Breached => Some(format_duration(actual - sla_minutes)),
      _ => None,
    };

    Ok(StageResult {
      stage,
      status,
      actual_minutes: Some(actual),
      actual: Some(format_duration(actual)),
      exceeded_by,
      pending,
    })
  }

  /// Evaluate every stage of one order plus the severity of its open stage.
  pub fn evaluate_order(
    &self,
    country_code: &str,
    milestones: &Milestones,
    tat: &TatConfig,
    now: DateTime<Utc>,
  ) -> Result<OrderSla, SlaError> {
    let current_stage = milestones.current_stage();

    let placed = match milestones.placed {
      Some(p) => p,
      None => {
        return Ok(OrderSla {
          current_stage,
          processed: StageResult::not_applicable(Stage::Processed),
          shipped: StageResult::not_applicable(Stage::Shipped),
          delivered: StageResult::not_applicable(Stage::Delivered),
          severity: Severity::None,
        });
      }
    };

    // Each timed stage needs the previous milestone (or its own) to be measurable.
    let timed = |stage: Stage, prerequisite: Option<NaiveDateTime>| -> Result<StageResult, SlaError> {
      let own = milestones.reached_at(stage);
      if own.is_none() && prerequisite.is_none() {
        return Ok(StageResult::not_applicable(stage));
      }
      let sla = tat.stage_tat(stage).unwrap_or_default();
      self.classify_stage(stage, country_code, placed, own, sla, tat.risk_pct, now)
    };

    let processed = timed(Stage::Processed, Some(placed))?;
    let shipped = timed(Stage::Shipped, milestones.processed)?;
    let delivered = timed(Stage::Delivered, milestones.shipped)?;

    let severity = self.severity(country_code, placed, current_stage, tat, now)?;

    Ok(OrderSla {
      current_stage,
      processed,
      shipped,
      delivered,
      severity,
    })
  }

  /// Severity of the stage the order is waiting on. Delivered orders have none.
  pub fn severity(
    &self,
    country_code: &str,
    placed: NaiveDateTime,
    current_stage: Stage,
    tat: &TatConfig,
    now: DateTime<Utc>,
  ) -> Result<Severity, SlaError> {
    let open = match current_stage.next() {
      Some(s) => s,
      None => return Ok(Severity::None),
    };
    let sla_minutes = tat.stage_sla_minutes(open).unwrap_or(0);
    if sla_minutes == 0 {
      return Ok(Severity::None);
    }
    let elapsed = self.timezones.elapsed_until(placed, now, country_code)?;
    let critical = scale_minutes(sla_minutes, tat.critical_pct);
    let urgent = scale_minutes(sla_minutes, tat.urgent_pct);

    Ok(if elapsed > critical {
      Severity::Critical
    } else if elapsed > urgent {
      Severity::Urgent
    } else {
      Severity::None
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::{Duration, NaiveDate, TimeZone};

  fn placed() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, 15)
      .unwrap()
      .and_hms_opt(1, 0, 0)
      .unwrap()
  }

  fn plus(m: i64) -> NaiveDateTime {
    placed() + Duration::minutes(m)
  }

  // Stored 01:00 is 09:00 UTC.
  fn now_after(m: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 9, 0, 0).unwrap() + Duration::minutes(m)
  }

  #[test]
  fn status_thresholds_are_strict() {
    assert_eq!(status_for(96, 120, 96), SlaStatus::OnTime);
    assert_eq!(status_for(97, 120, 96), SlaStatus::AtRisk);
    assert_eq!(status_for(120, 120, 96), SlaStatus::AtRisk);
    assert_eq!(status_for(121, 120, 96), SlaStatus::Breached);
    assert_eq!(status_for(5, 0, 0), SlaStatus::NotApplicable);
  }

  #[test]
  fn completed_stage_breach_reports_exceeded_by() {
    let c = Classifier::with_defaults();
    let r = c
      .classify_stage(Stage::Processed, "SG", placed(), Some(plus(130)), "2h", 80.0, now_after(0))
      .unwrap();
    assert_eq!(r.status, SlaStatus::Breached);
    assert_eq!(r.exceeded_by.as_deref(), Some("10m"));
    assert_eq!(r.actual.as_deref(), Some("2h 10m"));
    assert!(!r.pending);
  }

  #[test]
  fn pending_stage_measures_against_now() {
    let c = Classifier::with_defaults();
    let r = c
      .classify_stage(Stage::Processed, "SG", placed(), None, "2h", 80.0, now_after(100))
      .unwrap();
    assert_eq!(r.status, SlaStatus::AtRisk);
    assert!(r.pending);
    assert_eq!(r.actual_minutes, Some(100));
    assert!(r.exceeded_by.is_none());
  }

  #[test]
  fn later_stage_without_prerequisite_is_not_applicable() {
    let c = Classifier::with_defaults();
    let m = Milestones {
      placed: Some(placed()),
      ..Milestones::default()
    };
    let sla = c.evaluate_order("SG", &m, &TatConfig::fallback(), now_after(30)).unwrap();
    assert_eq!(sla.current_stage, Stage::NotProcessed);
    assert_eq!(sla.processed.status, SlaStatus::OnTime);
    assert!(sla.processed.pending);
    assert_eq!(sla.shipped.status, SlaStatus::NotApplicable);
    assert_eq!(sla.delivered.status, SlaStatus::NotApplicable);
  }

  #[test]
  fn earlier_breach_does_not_leak_into_later_stage() {
    let c = Classifier::with_defaults();
    let m = Milestones {
      placed: Some(placed()),
      processed: Some(plus(300)),
      shipped: Some(plus(600)),
      delivered: None,
    };
    let sla = c.evaluate_order("SG", &m, &TatConfig::fallback(), now_after(700)).unwrap();
    assert_eq!(sla.processed.status, SlaStatus::Breached);
    assert_eq!(sla.shipped.status, SlaStatus::OnTime);
    assert_eq!(sla.delivered.status, SlaStatus::OnTime);
    assert!(sla.delivered.pending);
    assert_eq!(sla.current_stage, Stage::Shipped);
  }

  #[test]
  fn severity_tracks_open_stage_only() {
    let c = Classifier::with_defaults();
    let tat = TatConfig::fallback();
    // Not processed: open stage SLA is 2h; urgent > 120m, critical > 180m.
    assert_eq!(c.severity("SG", placed(), Stage::NotProcessed, &tat, now_after(100)).unwrap(), Severity::None);
    assert_eq!(c.severity("SG", placed(), Stage::NotProcessed, &tat, now_after(150)).unwrap(), Severity::Urgent);
    assert_eq!(c.severity("SG", placed(), Stage::NotProcessed, &tat, now_after(200)).unwrap(), Severity::Critical);
    // Processed: open stage is shipped (2d), so the same elapsed time is fine.
    assert_eq!(c.severity("SG", placed(), Stage::Processed, &tat, now_after(200)).unwrap(), Severity::None);
  }

  #[test]
  fn delivered_orders_have_no_severity() {
    let c = Classifier::with_defaults();
    let m = Milestones {
      placed: Some(placed()),
      processed: Some(plus(10)),
      shipped: Some(plus(20)),
      delivered: Some(plus(30_000)),
    };
    let sla = c.evaluate_order("SG", &m, &TatConfig::fallback(), now_after(90_000)).unwrap();
    assert_eq!(sla.severity, Severity::None);
    assert_eq!(sla.delivered.status, SlaStatus::Breached);
    assert_eq!(sla.contribution().stage, Stage::Delivered);
  }

  #[test]
  fn missing_placement_is_all_not_applicable() {
    let c = Classifier::with_defaults();
    let m = Milestones {
      shipped: Some(plus(20)),
      ..Milestones::default()
    };
    let sla = c.evaluate_order("SG", &m, &TatConfig::fallback(), now_after(0)).unwrap();
    assert_eq!(sla.current_stage, Stage::Shipped);
    assert_eq!(sla.shipped.status, SlaStatus::NotApplicable);
  }
}
