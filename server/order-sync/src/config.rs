//! Runtime settings from the environment, with optional JSON overrides for
//! the brand alias and timezone tables.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use sla_engine::{CountryZone, TimezoneMap};

use crate::error::SyncError;
use crate::naming::{BrandAlias, BrandAliases};

pub const DEFAULT_PORT: u16 = 5005;
pub const DEFAULT_BATCH_SIZE: u64 = 1000;
const DEFAULT_CONFIRMED_STATUS: &str = "confirmed";

/// Tunables for one sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
  /// Rows per source page.
  pub batch_size: u64,
  /// Stop a job after this many rows read.
  pub max_records: Option<u64>,
  /// Only orders placed within the last N days.
  pub window_days: Option<u32>,
  /// Only rows updated since the target's last-sync watermark.
  pub incremental: bool,
  /// Only rows with this `confirmation_status`.
  pub confirmed_status: Option<String>,
  /// Upper bound on concurrently running (brand, country) jobs.
  pub max_parallel_jobs: usize,
}

impl Default for SyncOptions {
  fn default() -> Self {
    Self {
      batch_size: DEFAULT_BATCH_SIZE,
      max_records: None,
      window_days: None,
      incremental: false,
      confirmed_status: None,
      max_parallel_jobs: 1,
    }
  }
}

#[derive(Debug, Clone)]
pub struct Settings {
  pub source_database_url: String,
  pub target_database_url: String,
  pub port: u16,
  pub sync: SyncOptions,
  /// Scheduled sync period; manual triggers only when `None`.
  pub interval: Option<Duration>,
  pub brands: BrandAliases,
  pub timezones: TimezoneMap,
}

/// Shape of the `SYNC_CONFIG_PATH` file. Entries extend or replace the
/// built-in tables key by key.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Overrides {
  #[serde(default)]
  pub brands: BTreeMap<String, BrandAlias>,
  #[serde(default)]
  pub timezones: BTreeMap<String, CountryZone>,
  #[serde(default)]
  pub ingestion_offset_minutes: Option<i32>,
}

impl Overrides {
  pub fn from_json(raw: &str) -> Result<Self, SyncError> {
    Ok(serde_json::from_str(raw)?)
  }

  pub fn apply(
    self,
    brands: &BrandAliases,
    timezones: &TimezoneMap,
  ) -> Result<(BrandAliases, TimezoneMap), SyncError> {
    let mut brand_entries: BTreeMap<String, BrandAlias> = brands
      .entries()
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect();
    brand_entries.extend(self.brands);

    let mut zone_entries: BTreeMap<String, CountryZone> = timezones
      .zones()
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect();
    zone_entries.extend(
      self
        .timezones
        .into_iter()
        .map(|(k, v)| (k.to_ascii_uppercase(), v)),
    );

    let offset = self
      .ingestion_offset_minutes
      .unwrap_or_else(|| timezones.ingestion_offset_minutes());

    Ok((
      BrandAliases::new(brand_entries)?,
      TimezoneMap::new(zone_entries, offset)?,
    ))
  }
}

impl Settings {
  pub fn from_env() -> Result<Self, SyncError> {
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  /// Build settings from any key lookup (the environment in production).
  pub fn from_lookup<F>(get: F) -> Result<Self, SyncError>
  where
    F: Fn(&str) -> Option<String>,
  {
    let required = |key: &str| -> Result<String, SyncError> {
      get(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| SyncError::config(format!("{} must be set", key)))
    };

    let source_database_url = required("SOURCE_DATABASE_URL")?;
    let target_database_url = required("TARGET_DATABASE_URL")?;
    let port = parse_or(&get, "PORT", DEFAULT_PORT)?;

    let batch_size: u64 = parse_or(&get, "SYNC_BATCH_SIZE", DEFAULT_BATCH_SIZE)?;
    if batch_size == 0 {
      return Err(SyncError::config("SYNC_BATCH_SIZE must be greater than 0"));
    }
    let max_parallel_jobs: usize = parse_or(&get, "SYNC_MAX_PARALLEL_JOBS", 1)?;

    let confirmed_status = if parse_bool(&get, "SYNC_CONFIRMED_ONLY")? {
      Some(get("SYNC_CONFIRMED_STATUS").unwrap_or_else(|| DEFAULT_CONFIRMED_STATUS.to_string()))
    } else {
      None
    };

    let sync = SyncOptions {
      batch_size,
      max_records: parse_opt(&get, "SYNC_MAX_RECORDS")?,
      window_days: parse_opt(&get, "SYNC_WINDOW_DAYS")?,
      incremental: parse_bool(&get, "SYNC_INCREMENTAL")?,
      confirmed_status,
      max_parallel_jobs: max_parallel_jobs.max(1),
    };

    let interval = parse_opt::<u64, _>(&get, "SYNC_INTERVAL_SECS")?
      .filter(|s| *s > 0)
      .map(Duration::from_secs);

    let (brands, timezones) = match get("SYNC_CONFIG_PATH") {
      Some(path) => {
        let raw = std::fs::read_to_string(&path)?;
        Overrides::from_json(&raw)?.apply(&BrandAliases::default(), &TimezoneMap::default())?
      }
      None => (BrandAliases::default(), TimezoneMap::default()),
    };

    Ok(Self {
      source_database_url,
      target_database_url,
      port,
      sync,
      interval,
      brands,
      timezones,
    })
  }
}

fn parse_opt<T, F>(get: &F, key: &str) -> Result<Option<T>, SyncError>
where
  T: std::str::FromStr,
  F: Fn(&str) -> Option<String>,
{
  match get(key) {
    Some(raw) if !raw.trim().is_empty() => raw
      .trim()
      .parse::<T>()
      .map(Some)
      .map_err(|_| SyncError::config(format!("{} has an invalid value: {}", key, raw))),
    _ => Ok(None),
  }
}

fn parse_or<T, F>(get: &F, key: &str, default: T) -> Result<T, SyncError>
where
  T: std::str::FromStr,
  F: Fn(&str) -> Option<String>,
{
  Ok(parse_opt(get, key)?.unwrap_or(default))
}

fn parse_bool<F>(get: &F, key: &str) -> Result<bool, SyncError>
where
  F: Fn(&str) -> Option<String>,
{
  match get(key).map(|v| v.trim().to_ascii_lowercase()) {
    None => Ok(false),
    Some(v) => match v.as_str() {
      "" | "0" | "false" | "no" | "off" => Ok(false),
      "1" | "true" | "yes" | "on" => Ok(true),
      _ => Err(SyncError::config(format!("{} must be a boolean, got {}", key, v))),
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect();
    move |k| map.get(k).cloned()
  }

  const URLS: [(&str, &str); 2] = [
    ("SOURCE_DATABASE_URL", "postgres://src"),
    ("TARGET_DATABASE_URL", "postgres://dst"),
  ];

  #[test]
  fn defaults_apply() {
    let s = Settings::from_lookup(lookup(&URLS)).unwrap();
    assert_eq!(s.port, DEFAULT_PORT);
    assert_eq!(s.sync, SyncOptions::default());
    assert!(s.interval.is_none());
    assert_eq!(s.brands.resolve("victoriassecret").code, "vs");
  }

  #[test]
  fn missing_database_url_is_error() {
    let err = Settings::from_lookup(lookup(&URLS[..1])).unwrap_err();
    assert!(err.to_string().contains("TARGET_DATABASE_URL"));
  }

  #[test]
  fn sync_tunables_parse() {
    let mut pairs = URLS.to_vec();
    pairs.extend([
      ("SYNC_BATCH_SIZE", "250"),
      ("SYNC_MAX_RECORDS", "5000"),
      ("SYNC_WINDOW_DAYS", "30"),
      ("SYNC_INCREMENTAL", "yes"),
      ("SYNC_CONFIRMED_ONLY", "true"),
      ("SYNC_MAX_PARALLEL_JOBS", "4"),
      ("SYNC_INTERVAL_SECS", "600"),
    ]);
    let s = Settings::from_lookup(lookup(&pairs)).unwrap();
    assert_eq!(s.sync.batch_size, 250);
    assert_eq!(s.sync.max_records, Some(5000));
    assert_eq!(s.sync.window_days, Some(30));
    assert!(s.sync.incremental);
    assert_eq!(s.sync.confirmed_status.as_deref(), Some("confirmed"));
    assert_eq!(s.sync.max_parallel_jobs, 4);
    assert_eq!(s.interval, Some(Duration::from_secs(600)));
  }

  #[test]
  fn invalid_values_are_rejected() {
    let mut pairs = URLS.to_vec();
    pairs.push(("SYNC_BATCH_SIZE", "0"));
    assert!(Settings::from_lookup(lookup(&pairs)).is_err());

    let mut pairs = URLS.to_vec();
    pairs.push(("SYNC_INCREMENTAL", "maybe"));
    assert!(Settings::from_lookup(lookup(&pairs)).is_err());
  }

  #[test]
  fn overrides_extend_builtin_tables() {
    let raw = r#"{
      "brands": {"newbrand": {"code": "nb", "name": "New Brand"}},
      "timezones": {"lk": {"offset_minutes": 330, "abbr": "IST"}},
      "ingestion_offset_minutes": 0
    }"#;
    let (brands, tz) = Overrides::from_json(raw)
      .unwrap()
      .apply(&BrandAliases::default(), &TimezoneMap::default())
      .unwrap();
    assert_eq!(brands.resolve("newbrand").name, "New Brand");
    assert_eq!(brands.resolve("victoriassecret").code, "vs");
    assert!(tz.is_known("LK"));
    assert!(tz.is_known("SG"));
    assert_eq!(tz.ingestion_offset_minutes(), 0);
  }

  #[test]
  fn unknown_override_keys_rejected() {
    assert!(Overrides::from_json(r#"{"brand": {}}"#).is_err());
  }
}
