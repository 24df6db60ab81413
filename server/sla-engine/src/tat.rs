//! TAT configuration: per brand+country stage durations and severity bands.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::duration::parse_duration;
use crate::error::SlaError;
use crate::stage::Stage;

/// Key of one TAT configuration row. Country codes are stored upper-case.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TatKey {
  pub brand_name: String,
  pub country_code: String,
}

impl TatKey {
  pub fn new(brand_name: &str, country_code: &str) -> Self {
    Self {
      brand_name: brand_name.to_string(),
      country_code: country_code.to_ascii_uppercase(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TatConfig {
  pub processed_tat: String,
  pub shipped_tat: String,
  pub delivered_tat: String,
  pub risk_pct: f64,
  pub urgent_pct: f64,
  pub critical_pct: f64,
}

impl TatConfig {
  /// Defaults applied when no row exists for a brand+country.
  pub fn fallback() -> Self {
    Self {
      processed_tat: "2h".into(),
      shipped_tat: "2d".into(),
      delivered_tat: "7d".into(),
      risk_pct: 80.0,
      urgent_pct: 100.0,
      critical_pct: 150.0,
    }
  }

  /// Configured duration string for a timed stage. `NotProcessed` has none.
  pub fn stage_tat(&self, stage: Stage) -> Option<&str> {
    match stage {
      Stage::NotProcessed => None,
      Stage::Processed => Some(&self.processed_tat),
      Stage::Shipped => Some(&self.shipped_tat),
      Stage::Delivered => Some(&self.delivered_tat),
    }
  }

  pub fn stage_sla_minutes(&self, stage: Stage) -> Option<u64> {
    self.stage_tat(stage).map(parse_duration)
  }

  /// Reject percentages that cannot produce meaningful thresholds.
  pub fn validate(&self, key: &TatKey) -> Result<(), SlaError> {
    let checks = [
      ("risk_pct", self.risk_pct),
      ("urgent_pct", self.urgent_pct),
      ("critical_pct", self.critical_pct),
    ];
    for (name, pct) in checks {
      if !pct.is_finite() || pct < 0.0 {
        return Err(SlaError::InvalidThreshold {
          brand_name: key.brand_name.clone(),
          country_code: key.country_code.clone(),
          reason: format!("{} must be a non-negative number, got {}", name, pct),
        });
      }
    }
    Ok(())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TatSource {
  Configured,
  /// Row exists but one or more stage durations were unconfigured.
  PartialFallback,
  Fallback,
}

/// A TAT config with every stage duration guaranteed non-zero.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTat {
  pub config: TatConfig,
  pub source: TatSource,
}

/// Read-only lookup of TAT configs loaded from the target store.
#[derive(Debug, Clone, Default)]
pub struct TatConfigStore {
  entries: HashMap<TatKey, TatConfig>,
}

impl TatConfigStore {
  pub fn new(entries: impl IntoIterator<Item = (TatKey, TatConfig)>) -> Self {
    Self {
      entries: entries
        .into_iter()
        .map(|(k, v)| (TatKey::new(&k.brand_name, &k.country_code), v))
        .collect(),
    }
  }

  pub fn contains(&self, key: &TatKey) -> bool {
    self.entries.contains_key(key)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn keys(&self) -> impl Iterator<Item = &TatKey> {
    self.entries.keys()
  }

  /// Resolve the effective config, substituting fallback values for a missing
  /// row or for stage durations that parse to zero.
  pub fn resolve(&self, brand_name: &str, country_code: &str) -> Result<ResolvedTat, SlaError> {
    let key = TatKey::new(brand_name, country_code);
    let fallback = TatConfig::fallback();

    let configured = match self.entries.get(&key) {
      Some(c) => c,
      None => {
        warn!(
          brand = %key.brand_name,
          country = %key.country_code,
          "no TAT config; applying fallback defaults"
        );
        return Ok(ResolvedTat {
          config: fallback,
          source: TatSource::Fallback,
        });
      }
    };
    configured.validate(&key)?;

    let mut config = configured.clone();
    let mut patched = false;
    for (slot, default) in [
      (&mut config.processed_tat, &fallback.processed_tat),
      (&mut config.shipped_tat, &fallback.shipped_tat),
      (&mut config.delivered_tat, &fallback.delivered_tat),
    ] {
      if parse_duration(slot.as_str()) == 0 {
        *slot = default.clone();
        patched = true;
      }
    }
    if patched {
      warn!(
        brand = %key.brand_name,
        country = %key.country_code,
        "unconfigured stage TAT; using fallback for that stage"
      );
    }

    Ok(ResolvedTat {
      config,
      source: if patched {
        TatSource::PartialFallback
      } else {
        TatSource::Configured
      },
    })
  }
}
