//! Country-local time rendering with fixed UTC offsets (no DST).
//!
//! Stored timestamps are naive values on the upstream clock. The ingestion
//! offset converts them to UTC; the country offset converts UTC to local.
//! Local times travel as `"YYYY-MM-DD HH:MM:SS (ABBR)"` strings and elapsed
//! time is always computed by reparsing those strings.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SlaError;

const LOCAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Upstream stores timestamps eight hours behind UTC.
pub const DEFAULT_INGESTION_OFFSET_MINUTES: i32 = 8 * 60;

/// Fixed offset and display abbreviation for one country.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryZone {
  pub offset_minutes: i32,
  pub abbr: String,
}

impl CountryZone {
  pub fn new(offset_minutes: i32, abbr: &str) -> Self {
    Self {
      offset_minutes,
      abbr: abbr.to_string(),
    }
  }

  fn utc() -> Self {
    Self::new(0, "UTC")
  }
}

/// Immutable country -> zone table plus the upstream ingestion offset.
#[derive(Debug, Clone)]
pub struct TimezoneMap {
  zones: BTreeMap<String, CountryZone>,
  ingestion_offset_minutes: i32,
}

impl Default for TimezoneMap {
  fn default() -> Self {
    let zones = [
      ("SG", CountryZone::new(480, "SGT")),
      ("MY", CountryZone::new(480, "MYT")),
      ("PH", CountryZone::new(480, "PHT")),
      ("HK", CountryZone::new(480, "HKT")),
      ("TW", CountryZone::new(480, "CST")),
      ("ID", CountryZone::new(420, "WIB")),
      ("TH", CountryZone::new(420, "ICT")),
      ("VN", CountryZone::new(420, "ICT")),
      ("KH", CountryZone::new(420, "ICT")),
      ("JP", CountryZone::new(540, "JST")),
      ("KR", CountryZone::new(540, "KST")),
      ("AU", CountryZone::new(600, "AEST")),
      ("NZ", CountryZone::new(720, "NZST")),
      ("IN", CountryZone::new(330, "IST")),
      ("AE", CountryZone::new(240, "GST")),
    ];
    Self {
      zones: zones
        .into_iter()
        .map(|(cc, z)| (cc.to_string(), z))
        .collect(),
      ingestion_offset_minutes: DEFAULT_INGESTION_OFFSET_MINUTES,
    }
  }
}

impl TimezoneMap {
  /// Build a map, rejecting abbreviations shared by zones with different offsets
  /// (the abbreviation is how a local string finds its offset again).
  pub fn new(
    zones: impl IntoIterator<Item = (String, CountryZone)>,
    ingestion_offset_minutes: i32,
  ) -> Result<Self, SlaError> {
    let zones: BTreeMap<String, CountryZone> = zones
      .into_iter()
      .map(|(cc, z)| (cc.to_ascii_uppercase(), z))
      .collect();

    let mut by_abbr: BTreeMap<&str, i32> = BTreeMap::new();
    for (cc, zone) in &zones {
      if zone.abbr.is_empty() || zone.abbr.contains(['(', ')']) {
        return Err(SlaError::validation(
          &format!("timezones.{}.abbr", cc),
          "must be non-empty and contain no parentheses",
        ));
      }
      match by_abbr.insert(zone.abbr.as_str(), zone.offset_minutes) {
        Some(prev) if prev != zone.offset_minutes => {
          return Err(SlaError::validation(
            &format!("timezones.{}.abbr", cc),
            &format!("{} already used with a different offset", zone.abbr),
          ));
        }
        _ => {}
      }
    }

    Ok(Self {
      zones,
      ingestion_offset_minutes,
    })
  }

  pub fn zones(&self) -> impl Iterator<Item = (&String, &CountryZone)> {
    self.zones.iter()
  }

  pub fn ingestion_offset_minutes(&self) -> i32 {
    self.ingestion_offset_minutes
  }

  /// Zone for a country code; unknown countries render in UTC.
  pub fn zone(&self, country_code: &str) -> CountryZone {
    self
      .zones
      .get(&country_code.to_ascii_uppercase())
      .cloned()
      .unwrap_or_else(CountryZone::utc)
  }

  pub fn is_known(&self, country_code: &str) -> bool {
    self.zones.contains_key(&country_code.to_ascii_uppercase())
  }

  fn offset_for_abbr(&self, abbr: &str) -> Option<i32> {
    if abbr == "UTC" {
      return Some(0);
    }
    self
      .zones
      .values()
      .find(|z| z.abbr == abbr)
      .map(|z| z.offset_minutes)
  }

  /// Convert a stored upstream timestamp to UTC.
  pub fn stored_to_utc(&self, stored: NaiveDateTime) -> DateTime<Utc> {
    let shifted = stored + Duration::minutes(i64::from(self.ingestion_offset_minutes));
    DateTime::from_naive_utc_and_offset(shifted, Utc)
  }

  /// Local wall-clock time of a stored timestamp.
  pub fn stored_to_local(&self, stored: NaiveDateTime, country_code: &str) -> NaiveDateTime {
    let zone = self.zone(country_code);
    self.stored_to_utc(stored).naive_utc() + Duration::minutes(i64::from(zone.offset_minutes))
  }

  /// Render a stored timestamp as a local-time string for the country.
  pub fn render_local(&self, stored: NaiveDateTime, country_code: &str) -> String {
    let zone = self.zone(country_code);
    let local = self.stored_to_local(stored, country_code);
    format!("{} ({})", local.format(LOCAL_FORMAT), zone.abbr)
  }

  /// Render a real UTC instant (e.g. "now") as a local-time string.
  pub fn render_utc(&self, instant: DateTime<Utc>, country_code: &str) -> String {
    let zone = self.zone(country_code);
    let local = instant.naive_utc() + Duration::minutes(i64::from(zone.offset_minutes));
    format!("{} ({})", local.format(LOCAL_FORMAT), zone.abbr)
  }

  /// Local calendar date of a stored timestamp.
  pub fn local_date(&self, stored: NaiveDateTime, country_code: &str) -> NaiveDate {
    self.stored_to_local(stored, country_code).date()
  }

  /// Split a local-time string into its wall-clock part and abbreviation.
  pub fn parse_local(s: &str) -> Result<(NaiveDateTime, &str), SlaError> {
    let s = s.trim();
    let (clock, rest) = s
      .rsplit_once(" (")
      .ok_or_else(|| SlaError::parse(format!("local time missing zone suffix: {}", s)))?;
    let abbr = rest
      .strip_suffix(')')
      .ok_or_else(|| SlaError::parse(format!("local time zone suffix unterminated: {}", s)))?;
    let clock = NaiveDateTime::parse_from_str(clock, LOCAL_FORMAT)
      .map_err(|e| SlaError::parse(format!("local time {}: {}", s, e)))?;
    Ok((clock, abbr))
  }

  /// Minutes from `first` to `second`, both local-time strings.
  ///
  /// Both wall clocks are pinned to UTC using the offset named by the first
  /// string's suffix, then subtracted.
  pub fn elapsed_minutes(&self, first: &str, second: &str) -> Result<i64, SlaError> {
    let (a, abbr) = Self::parse_local(first)?;
    let (b, _) = Self::parse_local(second)?;
    let offset = self
      .offset_for_abbr(abbr)
      .ok_or_else(|| SlaError::UnknownCountry(abbr.to_string()))?;
    let shift = Duration::minutes(i64::from(offset));
    let a_utc = a - shift;
    let b_utc = b - shift;
    Ok((b_utc - a_utc).num_minutes())
  }

  /// Elapsed minutes between two stored timestamps for a country, clamped at 0.
  pub fn elapsed_between(
    &self,
    from: NaiveDateTime,
    to: NaiveDateTime,
    country_code: &str,
  ) -> Result<u64, SlaError> {
    let a = self.render_local(from, country_code);
    let b = self.render_local(to, country_code);
    Ok(self.elapsed_minutes(&a, &b)?.max(0) as u64)
  }

  /// Elapsed minutes from a stored timestamp to a real UTC instant, clamped at 0.
  pub fn elapsed_until(
    &self,
    from: NaiveDateTime,
    until: DateTime<Utc>,
    country_code: &str,
  ) -> Result<u64, SlaError> {
    let a = self.render_local(from, country_code);
    let b = self.render_utc(until, country_code);
    Ok(self.elapsed_minutes(&a, &b)?.max(0) as u64)
  }
}
