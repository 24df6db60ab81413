//! Target database access: order tables, TAT configs, and summary partitions.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sla_engine::{Milestones, SummaryRow, TatConfig, TatKey};
use sqlx_core::query::query;
use sqlx_core::row::Row;
use sqlx_postgres::{PgPool, Postgres};
use tracing::{debug, info};

use super::schema::{metadata_ddl, order_table_ddl, order_upsert_sql};
use super::{list_tables, to_i64, to_u64};
use crate::error::SyncError;
use crate::naming::{TableName, SUMMARY_TABLE, TAT_CONFIG_TABLE, WATERMARK_TABLE};
use crate::record::{OrderRecord, PartitionKey};
use crate::store::{PartitionCount, TargetStats, TargetStore};

pub struct PgTargetStore {
  pool: PgPool,
}

impl PgTargetStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  pub fn pool(&self) -> &PgPool {
    &self.pool
  }

  /// Run DDL statements in one transaction under an advisory lock, so
  /// concurrent jobs creating the same table serialise instead of racing
  /// on the catalog.
  async fn run_ddl(&self, lock_name: &str, stmts: &[String]) -> Result<(), SyncError> {
    let mut tx = self.pool.begin().await?;
    query::<Postgres>("SELECT pg_advisory_xact_lock(hashtext($1)::bigint)")
      .bind(lock_name)
      .execute(&mut *tx)
      .await?;
    for stmt in stmts {
      query::<Postgres>(stmt).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    Ok(())
  }
}

#[async_trait]
impl TargetStore for PgTargetStore {
  async fn list_tables(&self) -> Result<Vec<String>, SyncError> {
    list_tables(&self.pool).await
  }

  async fn ensure_metadata_tables(&self) -> Result<(), SyncError> {
    self.run_ddl("order-sync:ddl:metadata", &metadata_ddl()).await
  }

  async fn ensure_order_table(&self, table: &TableName) -> Result<(), SyncError> {
    let lock = format!("order-sync:ddl:{}", table);
    self.run_ddl(&lock, &order_table_ddl(table)).await?;
    debug!(table = %table, "order table ensured");
    Ok(())
  }

  async fn table_stats(&self, table: &TableName) -> Result<TargetStats, SyncError> {
    let sql = format!("SELECT MAX(updated_at), COUNT(*) FROM {}", table.quoted());
    let row = query::<Postgres>(&sql).fetch_one(&self.pool).await?;
    Ok(TargetStats {
      watermark: row.try_get::<Option<NaiveDateTime>, _>(0)?,
      row_count: to_u64(row.try_get::<i64, _>(1)?),
    })
  }

  async fn upsert_order(&self, table: &TableName, r: &OrderRecord) -> Result<(), SyncError> {
    let sql = order_upsert_sql(table);
    let mut tx = self.pool.begin().await?;
    query::<Postgres>(&sql)
      .bind(&r.order_no)
      .bind(&r.order_status)
      .bind(&r.shipping_status)
      .bind(&r.confirmation_status)
      .bind(r.placed_time)
      .bind(r.processed_time)
      .bind(r.shipped_time)
      .bind(r.delivered_time)
      .bind(&r.processed_tat)
      .bind(&r.shipped_tat)
      .bind(&r.delivered_tat)
      .bind(&r.currency)
      .bind(&r.invoice_no)
      .bind(&r.brand_name)
      .bind(&r.country_code)
      .bind(&r.payment_method)
      .bind(&r.payment_status)
      .bind(r.paid_amount)
      .bind(&r.courier)
      .bind(&r.tracking_no)
      .execute(&mut *tx)
      .await?;
    tx.commit().await?;
    Ok(())
  }

  async fn fetch_milestones(
    &self,
    table: &TableName,
    partition: &PartitionKey,
    offset: u64,
    limit: u64,
  ) -> Result<Vec<Milestones>, SyncError> {
    let sql = format!(
      "SELECT placed_time, processed_time, shipped_time, delivered_time FROM {} \
       WHERE brand_name = $1 AND country_code = $2 \
       ORDER BY order_no LIMIT $3 OFFSET $4",
      table.quoted()
    );
    let rows = query::<Postgres>(&sql)
      .bind(&partition.brand_name)
      .bind(&partition.country_code)
      .bind(to_i64(limit))
      .bind(to_i64(offset))
      .fetch_all(&self.pool)
      .await?;
    rows
      .iter()
      .map(|row| -> Result<Milestones, SyncError> {
        Ok(Milestones {
          placed: row.try_get("placed_time")?,
          processed: row.try_get("processed_time")?,
          shipped: row.try_get("shipped_time")?,
          delivered: row.try_get("delivered_time")?,
        })
      })
      .collect()
  }

  async fn load_watermark(&self, table: &TableName) -> Result<Option<NaiveDateTime>, SyncError> {
    let row = query::<Postgres>(&format!(
      "SELECT watermark FROM {WATERMARK_TABLE} WHERE target_table = $1"
    ))
    .bind(table.as_str())
    .fetch_optional(&self.pool)
    .await?;
    Ok(match row {
      Some(row) => Some(row.try_get::<NaiveDateTime, _>(0)?),
      None => None,
    })
  }

  async fn store_watermark(&self, table: &TableName, at: NaiveDateTime) -> Result<(), SyncError> {
    query::<Postgres>(&format!(
      "INSERT INTO {WATERMARK_TABLE} (target_table, watermark) VALUES ($1, $2) \
       ON CONFLICT (target_table) DO UPDATE SET watermark = EXCLUDED.watermark, \
       updated_at = (NOW() AT TIME ZONE 'UTC')"
    ))
    .bind(table.as_str())
    .bind(at)
    .execute(&self.pool)
    .await?;
    debug!(table = %table, watermark = %at, "sync watermark stored");
    Ok(())
  }

  async fn load_tat_configs(&self) -> Result<Vec<(TatKey, TatConfig)>, SyncError> {
    let sql = format!(
      "SELECT brand_name, country_code, processed_tat, shipped_tat, delivered_tat, \
       risk_pct::float8 AS risk_pct, urgent_pct::float8 AS urgent_pct, critical_pct::float8 AS critical_pct \
       FROM {TAT_CONFIG_TABLE}"
    );
    let rows = query::<Postgres>(&sql).fetch_all(&self.pool).await?;
    rows
      .iter()
      .map(|row| -> Result<(TatKey, TatConfig), SyncError> {
        let brand: String = row.try_get("brand_name")?;
        let country: String = row.try_get("country_code")?;
        Ok((
          TatKey::new(&brand, &country),
          TatConfig {
            processed_tat: row.try_get("processed_tat")?,
            shipped_tat: row.try_get("shipped_tat")?,
            delivered_tat: row.try_get("delivered_tat")?,
            risk_pct: row.try_get("risk_pct")?,
            urgent_pct: row.try_get("urgent_pct")?,
            critical_pct: row.try_get("critical_pct")?,
          },
        ))
      })
      .collect()
  }

  async fn replace_summaries(
    &self,
    partition: &PartitionKey,
    rows: &[SummaryRow],
  ) -> Result<u64, SyncError> {
    let mut tx = self.pool.begin().await?;
    let deleted = query::<Postgres>(&format!(
      "DELETE FROM {SUMMARY_TABLE} WHERE brand_name = $1 AND country_code = $2"
    ))
    .bind(&partition.brand_name)
    .bind(&partition.country_code)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let insert = format!(
      "INSERT INTO {SUMMARY_TABLE} (summary_date, brand_name, country_code, stage, orders_total, \
       orders_on_time, orders_on_risk, orders_breached, avg_delay_seconds) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
    );
    for row in rows {
      query::<Postgres>(&insert)
        .bind(row.summary_date)
        .bind(&row.brand_name)
        .bind(&row.country_code)
        .bind(row.stage.as_str())
        .bind(row.orders_total)
        .bind(row.orders_on_time)
        .bind(row.orders_on_risk)
        .bind(row.orders_breached)
        .bind(row.avg_delay_seconds)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    debug!(
      partition = %partition,
      deleted,
      inserted = rows.len(),
      "summary partition replaced"
    );
    Ok(rows.len() as u64)
  }

  async fn summary_partitions(&self) -> Result<Vec<PartitionCount>, SyncError> {
    let sql = format!(
      "SELECT brand_name, country_code, COUNT(*) AS records FROM {SUMMARY_TABLE} \
       GROUP BY brand_name, country_code ORDER BY brand_name, country_code"
    );
    let rows = query::<Postgres>(&sql).fetch_all(&self.pool).await?;
    rows
      .iter()
      .map(|row| -> Result<PartitionCount, SyncError> {
        let brand: String = row.try_get("brand_name")?;
        let country: String = row.try_get("country_code")?;
        Ok(PartitionCount {
          partition: PartitionKey::new(&brand, &country),
          record_count: to_u64(row.try_get::<i64, _>("records")?),
        })
      })
      .collect()
  }

  async fn delete_summary_partition(&self, partition: &PartitionKey) -> Result<u64, SyncError> {
    let mut tx = self.pool.begin().await?;
    let row = query::<Postgres>(&format!(
      "SELECT COUNT(*) FROM {SUMMARY_TABLE} WHERE brand_name = $1 AND country_code = $2"
    ))
    .bind(&partition.brand_name)
    .bind(&partition.country_code)
    .fetch_one(&mut *tx)
    .await?;
    let before = to_u64(row.try_get::<i64, _>(0)?);

    query::<Postgres>(&format!(
      "DELETE FROM {SUMMARY_TABLE} WHERE brand_name = $1 AND country_code = $2"
    ))
    .bind(&partition.brand_name)
    .bind(&partition.country_code)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    info!(partition = %partition, records = before, "summary partition deleted");
    Ok(before)
  }
}
