//! DDL for the consolidated order tables and the metadata tables.

use crate::naming::{TableName, SUMMARY_TABLE, TAT_CONFIG_TABLE, WATERMARK_TABLE};

/// Non-key order columns in insert order. `order_no` is always first.
pub(crate) const ORDER_COLUMNS: [&str; 19] = [
  "order_status",
  "shipping_status",
  "confirmation_status",
  "placed_time",
  "processed_time",
  "shipped_time",
  "delivered_time",
  "processed_tat",
  "shipped_tat",
  "delivered_tat",
  "currency",
  "invoice_no",
  "brand_name",
  "country_code",
  "payment_method",
  "payment_status",
  "paid_amount",
  "courier",
  "tracking_no",
];

/// Columns that only move forward: a reached milestone is never cleared.
const MONOTONIC_COLUMNS: [&str; 7] = [
  "placed_time",
  "processed_time",
  "shipped_time",
  "delivered_time",
  "processed_tat",
  "shipped_tat",
  "delivered_tat",
];

const INDEXED_COLUMNS: [&str; 5] = [
  "placed_time",
  "processed_time",
  "shipped_time",
  "delivered_time",
  "updated_at",
];

pub(crate) fn order_table_ddl(table: &TableName) -> Vec<String> {
  let mut stmts = vec![format!(
    "CREATE TABLE IF NOT EXISTS {} (
      order_no TEXT PRIMARY KEY,
      order_status TEXT,
      shipping_status TEXT,
      confirmation_status TEXT,
      placed_time TIMESTAMP,
      processed_time TIMESTAMP,
      shipped_time TIMESTAMP,
      delivered_time TIMESTAMP,
      processed_tat TEXT,
      shipped_tat TEXT,
      delivered_tat TEXT,
      currency TEXT,
      invoice_no TEXT,
      brand_name TEXT NOT NULL,
      country_code TEXT NOT NULL,
      payment_method TEXT,
      payment_status TEXT,
      paid_amount DOUBLE PRECISION,
      courier TEXT,
      tracking_no TEXT,
      updated_at TIMESTAMP NOT NULL DEFAULT (NOW() AT TIME ZONE 'UTC')
    )",
    table.quoted()
  )];
  for col in INDEXED_COLUMNS {
    stmts.push(format!(
      "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
      table.index_name(&format!("{}_idx", col)),
      table.quoted(),
      col
    ));
  }
  stmts.push(format!(
    "CREATE INDEX IF NOT EXISTS {} ON {} (brand_name, country_code)",
    table.index_name("brand_country_idx"),
    table.quoted()
  ));
  stmts
}

/// `INSERT ... ON CONFLICT (order_no) DO UPDATE` with `$1..$20` placeholders.
pub(crate) fn order_upsert_sql(table: &TableName) -> String {
  let columns = std::iter::once("order_no")
    .chain(ORDER_COLUMNS)
    .collect::<Vec<_>>()
    .join(", ");
  let placeholders = (1..=ORDER_COLUMNS.len() + 1)
    .map(|i| format!("${}", i))
    .collect::<Vec<_>>()
    .join(", ");
  let updates = ORDER_COLUMNS
    .iter()
    .map(|col| {
      if MONOTONIC_COLUMNS.contains(col) {
        format!("{col} = COALESCE(EXCLUDED.{col}, {}.{col})", table.quoted())
      } else {
        format!("{col} = EXCLUDED.{col}")
      }
    })
    .chain(std::iter::once(
      "updated_at = (NOW() AT TIME ZONE 'UTC')".to_string(),
    ))
    .collect::<Vec<_>>()
    .join(", ");

  format!(
    "INSERT INTO {table} ({columns}, updated_at) VALUES ({placeholders}, (NOW() AT TIME ZONE 'UTC')) \
     ON CONFLICT (order_no) DO UPDATE SET {updates}",
    table = table.quoted(),
  )
}

pub(crate) fn metadata_ddl() -> Vec<String> {
  vec![
    format!(
      "CREATE TABLE IF NOT EXISTS {TAT_CONFIG_TABLE} (
        brand_name TEXT NOT NULL,
        country_code TEXT NOT NULL,
        processed_tat TEXT NOT NULL DEFAULT '',
        shipped_tat TEXT NOT NULL DEFAULT '',
        delivered_tat TEXT NOT NULL DEFAULT '',
        risk_pct DOUBLE PRECISION NOT NULL DEFAULT 80,
        urgent_pct DOUBLE PRECISION NOT NULL DEFAULT 100,
        critical_pct DOUBLE PRECISION NOT NULL DEFAULT 150,
        PRIMARY KEY (brand_name, country_code)
      )"
    ),
    format!(
      "CREATE TABLE IF NOT EXISTS {SUMMARY_TABLE} (
        summary_date DATE NOT NULL,
        brand_name TEXT NOT NULL,
        country_code TEXT NOT NULL,
        stage TEXT NOT NULL,
        orders_total BIGINT NOT NULL DEFAULT 0,
        orders_on_time BIGINT NOT NULL DEFAULT 0,
        orders_on_risk BIGINT NOT NULL DEFAULT 0,
        orders_breached BIGINT NOT NULL DEFAULT 0,
        avg_delay_seconds DOUBLE PRECISION NOT NULL DEFAULT 0,
        generated_at TIMESTAMP NOT NULL DEFAULT (NOW() AT TIME ZONE 'UTC'),
        PRIMARY KEY (summary_date, brand_name, country_code, stage)
      )"
    ),
    format!(
      "CREATE INDEX IF NOT EXISTS {SUMMARY_TABLE}_partition_idx ON {SUMMARY_TABLE} (brand_name, country_code)"
    ),
    // Source-clock time the last complete incremental run of a table started.
    format!(
      "CREATE TABLE IF NOT EXISTS {WATERMARK_TABLE} (
        target_table TEXT PRIMARY KEY,
        watermark TIMESTAMP NOT NULL,
        updated_at TIMESTAMP NOT NULL DEFAULT (NOW() AT TIME ZONE 'UTC')
      )"
    ),
  ]
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn upsert_has_one_placeholder_per_column() {
    let t = TableName::new("orders_vs_sg").unwrap();
    let sql = order_upsert_sql(&t);
    assert!(sql.contains("$20"));
    assert!(!sql.contains("$21"));
    assert!(sql.contains("ON CONFLICT (order_no) DO UPDATE SET"));
  }

  #[test]
  fn upsert_keeps_milestones_monotonic() {
    let t = TableName::new("orders_vs_sg").unwrap();
    let sql = order_upsert_sql(&t);
    assert!(sql.contains("shipped_time = COALESCE(EXCLUDED.shipped_time, \"orders_vs_sg\".shipped_time)"));
    assert!(sql.contains("order_status = EXCLUDED.order_status"));
    assert!(!sql.contains("order_no = EXCLUDED.order_no"));
  }

  #[test]
  fn order_ddl_indexes_milestones_and_partition() {
    let t = TableName::new("orders_vs_sg").unwrap();
    let ddl = order_table_ddl(&t);
    assert!(ddl[0].starts_with("CREATE TABLE IF NOT EXISTS \"orders_vs_sg\""));
    assert!(ddl.iter().any(|s| s.contains("(processed_time)")));
    assert!(ddl.iter().any(|s| s.contains("(brand_name, country_code)")));
    assert!(ddl.iter().all(|s| s.contains("IF NOT EXISTS")));
  }

  #[test]
  fn long_table_indexes_do_not_collide() {
    let t = TableName::new(&format!("orders_{}_sg", "b".repeat(52))).unwrap();
    let names: std::collections::HashSet<String> = order_table_ddl(&t)[1..]
      .iter()
      .map(|s| s.split_whitespace().nth(5).unwrap_or_default().to_string())
      .collect();
    assert_eq!(names.len(), INDEXED_COLUMNS.len() + 1);
    assert!(names.iter().all(|n| n.trim_matches('"').len() <= 63));
  }

  #[test]
  fn metadata_includes_watermark_table() {
    let ddl = metadata_ddl();
    assert!(ddl
      .iter()
      .any(|s| s.contains("CREATE TABLE IF NOT EXISTS sync_watermark")));
  }
}
