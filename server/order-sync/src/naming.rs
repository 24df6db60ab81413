//! Table naming conventions and validated SQL identifiers.
//!
//! Source: `<prefix>_<cc>_orders`, auxiliary: `<prefix>_<cc>_payments` /
//! `_shipments`, target: `orders_<brand_code>_<cc>`. Only names matching one
//! of these (or the fixed metadata tables) can become a [`TableName`], and
//! only a `TableName` is ever interpolated into SQL.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::record::PartitionKey;

pub const TAT_CONFIG_TABLE: &str = "tat_config";
pub const SUMMARY_TABLE: &str = "sla_daily_summary";
pub const WATERMARK_TABLE: &str = "sync_watermark";

const MAX_IDENTIFIER_LEN: usize = 63;
const INDEX_HASH_LEN: usize = 8;

static SOURCE_RE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^([a-z][a-z0-9_]*)_([a-z]{2})_orders$").expect("source table regex is valid")
});

static AUXILIARY_RE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^([a-z][a-z0-9_]*)_([a-z]{2})_(payments|shipments)$")
    .expect("auxiliary table regex is valid")
});

static TARGET_RE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^orders_([a-z0-9]+)_([a-z]{2})$").expect("target table regex is valid")
});

static BRAND_CODE_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^[a-z0-9]+$").expect("brand code regex is valid"));

/// A table name proven to follow one of the naming conventions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TableName(String);

impl TableName {
  pub fn new(name: &str) -> Result<Self, SyncError> {
    let ok = name.len() <= MAX_IDENTIFIER_LEN
      && (SOURCE_RE.is_match(name)
        || AUXILIARY_RE.is_match(name)
        || TARGET_RE.is_match(name)
        || name == TAT_CONFIG_TABLE
        || name == SUMMARY_TABLE
        || name == WATERMARK_TABLE);
    if ok {
      Ok(Self(name.to_string()))
    } else {
      Err(SyncError::InvalidIdentifier(name.to_string()))
    }
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Double-quoted form for SQL interpolation.
  pub fn quoted(&self) -> String {
    format!("\"{}\"", self.0)
  }

  /// Quoted index name `<table>_<suffix>`. Names over the identifier limit
  /// keep a table prefix plus a hash of the full name, so distinct indexes
  /// never collide after Postgres truncation.
  pub fn index_name(&self, suffix: &str) -> String {
    let full = format!("{}_{}", self.0, suffix);
    if full.len() <= MAX_IDENTIFIER_LEN {
      return format!("\"{}\"", full);
    }
    let hash = blake3::hash(full.as_bytes()).to_hex();
    let digest = &hash.as_str()[..INDEX_HASH_LEN];
    let keep = MAX_IDENTIFIER_LEN.saturating_sub(suffix.len() + INDEX_HASH_LEN + 2);
    format!("\"{}_{}_{}\"", &self.0[..keep.min(self.0.len())], digest, suffix)
  }
}

impl fmt::Display for TableName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Brand code and display name for one source prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandAlias {
  pub code: String,
  pub name: String,
}

impl BrandAlias {
  pub fn new(code: &str, name: &str) -> Self {
    Self {
      code: code.to_string(),
      name: name.to_string(),
    }
  }
}

/// Immutable prefix -> brand mapping. Unknown prefixes fall back to the
/// first three letters of the prefix.
#[derive(Debug, Clone)]
pub struct BrandAliases {
  by_prefix: BTreeMap<String, BrandAlias>,
}

impl Default for BrandAliases {
  fn default() -> Self {
    let entries = [
      ("victoriassecret", BrandAlias::new("vs", "Victoria's Secret")),
      ("bathandbodyworks", BrandAlias::new("bbw", "Bath & Body Works")),
      ("charleskeith", BrandAlias::new("ck", "Charles & Keith")),
      ("pedro", BrandAlias::new("pdr", "Pedro")),
      ("cottonon", BrandAlias::new("co", "Cotton On")),
    ];
    Self {
      by_prefix: entries
        .into_iter()
        .map(|(p, a)| (p.to_string(), a))
        .collect(),
    }
  }
}

impl BrandAliases {
  pub fn new(entries: impl IntoIterator<Item = (String, BrandAlias)>) -> Result<Self, SyncError> {
    let by_prefix: BTreeMap<String, BrandAlias> = entries.into_iter().collect();
    for (prefix, alias) in &by_prefix {
      if !BRAND_CODE_RE.is_match(&alias.code) {
        return Err(SyncError::validation(
          &format!("brands.{}.code", prefix),
          "must be lowercase letters and digits",
        ));
      }
      if alias.name.trim().is_empty() {
        return Err(SyncError::validation(
          &format!("brands.{}.name", prefix),
          "must not be empty",
        ));
      }
    }
    Ok(Self { by_prefix })
  }

  pub fn entries(&self) -> impl Iterator<Item = (&String, &BrandAlias)> {
    self.by_prefix.iter()
  }

  /// Alias for a source prefix, or the three-letter fallback.
  pub fn resolve(&self, prefix: &str) -> BrandAlias {
    if let Some(alias) = self.by_prefix.get(prefix) {
      return alias.clone();
    }
    BrandAlias {
      code: fallback_code(prefix),
      name: fallback_name(prefix),
    }
  }

  /// Brand code for a display name (reverse lookup). Used to find the target
  /// table a summary partition belongs to.
  pub fn code_for_name(&self, brand_name: &str) -> String {
    self
      .by_prefix
      .values()
      .find(|a| a.name == brand_name)
      .map(|a| a.code.clone())
      .unwrap_or_else(|| fallback_code(brand_name))
  }
}

fn fallback_code(s: &str) -> String {
  s.chars()
    .filter(|c| c.is_ascii_alphanumeric())
    .take(3)
    .collect::<String>()
    .to_ascii_lowercase()
}

fn fallback_name(prefix: &str) -> String {
  prefix
    .split('_')
    .filter(|w| !w.is_empty())
    .map(|w| {
      let mut chars = w.chars();
      match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
      }
    })
    .collect::<Vec<_>>()
    .join(" ")
}

/// A discovered source orders table with its resolved brand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceTable {
  pub name: TableName,
  pub prefix: String,
  /// Lower-case, as it appears in table names.
  pub country: String,
  pub brand_code: String,
  pub brand_name: String,
}

impl SourceTable {
  pub fn parse(name: &str, aliases: &BrandAliases) -> Option<Self> {
    let caps = SOURCE_RE.captures(name)?;
    let prefix = caps.get(1)?.as_str().to_string();
    let country = caps.get(2)?.as_str().to_string();
    let alias = aliases.resolve(&prefix);
    if alias.code.is_empty() {
      return None;
    }
    let table = TableName::new(name).ok()?;
    Some(Self {
      name: table,
      prefix,
      country,
      brand_code: alias.code,
      brand_name: alias.name,
    })
  }

  pub fn country_code(&self) -> String {
    self.country.to_ascii_uppercase()
  }

  pub fn partition(&self) -> PartitionKey {
    PartitionKey::new(&self.brand_name, &self.country)
  }

  pub fn target_name(&self) -> Result<TableName, SyncError> {
    target_table_name(&self.brand_code, &self.country)
  }

  /// `None` when the name would exceed the identifier limit, in which case
  /// the table cannot exist.
  pub fn payments_name(&self) -> Option<TableName> {
    self.auxiliary_name("payments")
  }

  pub fn shipments_name(&self) -> Option<TableName> {
    self.auxiliary_name("shipments")
  }

  fn auxiliary_name(&self, kind: &str) -> Option<TableName> {
    TableName::new(&format!("{}_{}_{}", self.prefix, self.country, kind)).ok()
  }
}

/// Matches the source naming convention, whether or not it is a usable
/// identifier.
pub fn is_source_table(name: &str) -> bool {
  SOURCE_RE.is_match(name)
}

pub fn target_table_name(brand_code: &str, country: &str) -> Result<TableName, SyncError> {
  TableName::new(&format!(
    "orders_{}_{}",
    brand_code,
    country.to_ascii_lowercase()
  ))
}

pub fn is_target_table(name: &str) -> bool {
  TARGET_RE.is_match(name)
}

/// Target table a summary partition should be backed by.
pub fn target_for_partition(
  partition: &PartitionKey,
  aliases: &BrandAliases,
) -> Result<TableName, SyncError> {
  target_table_name(
    &aliases.code_for_name(&partition.brand_name),
    &partition.country_code,
  )
}
