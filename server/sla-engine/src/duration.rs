//! TAT duration strings: `"<d>d <h>h <m>m"` with any subset of components.
//!
//! Durations are whole minutes. A result of 0 means "unconfigured", never
//! "instant": missing, malformed and zero inputs all collapse to 0.

use std::sync::LazyLock;

use regex::Regex;

const MINUTES_PER_HOUR: u64 = 60;
const MINUTES_PER_DAY: u64 = 24 * MINUTES_PER_HOUR;

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^(?:(\d+)\s*d)?\s*(?:(\d+)\s*h)?\s*(?:(\d+)\s*m)?$")
    .expect("duration regex is valid")
});

/// Parse a compound duration string into minutes.
///
/// Components must appear in `d`, `h`, `m` order. Anything else yields 0.
pub fn parse_duration(s: &str) -> u64 {
  let trimmed = s.trim().to_ascii_lowercase();
  if trimmed.is_empty() {
    return 0;
  }
  let caps = match DURATION_RE.captures(&trimmed) {
    Some(c) => c,
    None => return 0,
  };

  let component = |idx: usize| -> Option<u64> {
    match caps.get(idx) {
      Some(m) => m.as_str().parse::<u64>().ok(),
      None => Some(0),
    }
  };

  let total = (|| {
    let days = component(1)?.checked_mul(MINUTES_PER_DAY)?;
    let hours = component(2)?.checked_mul(MINUTES_PER_HOUR)?;
    let minutes = component(3)?;
    days.checked_add(hours)?.checked_add(minutes)
  })();

  total.unwrap_or(0)
}

/// Format minutes as a compound duration string, omitting zero components.
///
/// `0` renders as `"0m"`. Never emits more than three components.
pub fn format_duration(minutes: u64) -> String {
  if minutes == 0 {
    return "0m".to_string();
  }
  let days = minutes / MINUTES_PER_DAY;
  let hours = (minutes % MINUTES_PER_DAY) / MINUTES_PER_HOUR;
  let mins = minutes % MINUTES_PER_HOUR;

  let mut parts = Vec::with_capacity(3);
  if days > 0 {
    parts.push(format!("{}d", days));
  }
  if hours > 0 {
    parts.push(format!("{}h", hours));
  }
  if mins > 0 {
    parts.push(format!("{}m", mins));
  }
  parts.join(" ")
}

/// `floor(minutes * pct / 100)`, clamped at zero.
pub fn scale_minutes(minutes: u64, pct: f64) -> u64 {
  if !pct.is_finite() || pct <= 0.0 {
    return 0;
  }
  (minutes as f64 * pct / 100.0).floor() as u64
}

/// Risk threshold for an SLA string at `pct` percent, as a duration string.
pub fn risk_threshold(sla: &str, pct: f64) -> String {
  format_duration(scale_minutes(parse_duration(sla), pct))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_single_components() {
    assert_eq!(parse_duration("2h"), 120);
    assert_eq!(parse_duration("2d"), 2 * 1440);
    assert_eq!(parse_duration("45m"), 45);
  }

  #[test]
  fn parses_compound_with_and_without_spaces() {
    assert_eq!(parse_duration("1d 2h 30m"), 1440 + 120 + 30);
    assert_eq!(parse_duration("1h36m"), 96);
    assert_eq!(parse_duration("  3d 5m "), 3 * 1440 + 5);
  }

  #[test]
  fn invalid_input_is_zero() {
    assert_eq!(parse_duration(""), 0);
    assert_eq!(parse_duration("abc"), 0);
    assert_eq!(parse_duration("30m 2h"), 0);
    assert_eq!(parse_duration("2x"), 0);
    assert_eq!(parse_duration("-5m"), 0);
  }

  #[test]
  fn overflow_is_zero() {
    assert_eq!(parse_duration("99999999999999999999d"), 0);
    assert_eq!(parse_duration(&format!("{}d", u64::MAX / 10)), 0);
  }

  #[test]
  fn formats_omitting_zero_units() {
    assert_eq!(format_duration(0), "0m");
    assert_eq!(format_duration(96), "1h 36m");
    assert_eq!(format_duration(1440), "1d");
    assert_eq!(format_duration(1441), "1d 1m");
    assert_eq!(format_duration(1500), "1d 1h");
    assert_eq!(format_duration(10), "10m");
  }

  #[test]
  fn round_trip_holds() {
    for m in (0..20_000).step_by(7) {
      assert_eq!(parse_duration(&format_duration(m)), m, "minutes {}", m);
    }
  }

  #[test]
  fn risk_threshold_two_hours_at_eighty() {
    assert_eq!(risk_threshold("2h", 80.0), "1h 36m");
  }

  #[test]
  fn risk_threshold_never_exceeds_sla_at_or_below_hundred() {
    for sla in ["2h", "2d", "7d", "1d 3h 17m", "59m"] {
      for pct in [0.0, 1.0, 33.3, 80.0, 99.9, 100.0] {
        assert!(parse_duration(&risk_threshold(sla, pct)) <= parse_duration(sla));
      }
    }
  }
}
