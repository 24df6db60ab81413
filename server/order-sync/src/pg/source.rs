//! Source database access: catalog, counts, and batched extraction.

use async_trait::async_trait;
use sqlx_core::query::{query, Query};
use sqlx_core::row::Row;
use sqlx_postgres::{PgArguments, PgPool, PgRow, Postgres};
use tracing::debug;

use super::{list_tables, table_exists, to_i64, to_u64};
use crate::error::SyncError;
use crate::naming::TableName;
use crate::record::SourceOrder;
use crate::store::{ExtractPlan, SourceFilter, SourceStore};

pub struct PgSourceStore {
  pool: PgPool,
}

impl PgSourceStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  pub fn pool(&self) -> &PgPool {
    &self.pool
  }
}

/// `WHERE` clause for a filter, with placeholders starting at `$1`.
/// Returns the clause and the number of placeholders used.
fn where_clause(filter: &SourceFilter) -> (String, usize) {
  let mut clauses = Vec::new();
  let mut n = 0;
  if filter.confirmed_status.is_some() {
    n += 1;
    clauses.push(format!("o.confirmation_status = ${}", n));
  }
  if filter.placed_since.is_some() {
    n += 1;
    clauses.push(format!("o.placed_time >= ${}", n));
  }
  if filter.updated_since.is_some() {
    n += 1;
    clauses.push(format!("o.updated_at >= ${}", n));
  }
  if clauses.is_empty() {
    (String::new(), 0)
  } else {
    (format!(" WHERE {}", clauses.join(" AND ")), n)
  }
}

/// Bind filter values in the same order `where_clause` numbered them.
fn bind_filter<'q>(
  mut q: Query<'q, Postgres, PgArguments>,
  filter: &'q SourceFilter,
) -> Query<'q, Postgres, PgArguments> {
  if let Some(status) = &filter.confirmed_status {
    q = q.bind(status.as_str());
  }
  if let Some(ts) = filter.placed_since {
    q = q.bind(ts);
  }
  if let Some(ts) = filter.updated_since {
    q = q.bind(ts);
  }
  q
}

pub(crate) fn count_sql(table: &TableName, filter: &SourceFilter) -> String {
  let (predicate, _) = where_clause(filter);
  format!("SELECT COUNT(*) FROM {} o{}", table.quoted(), predicate)
}

/// Extraction query for a plan. Missing auxiliary tables become typed NULLs,
/// so the column set is identical for every plan.
pub(crate) fn extract_sql(plan: &ExtractPlan, filter: &SourceFilter) -> String {
  let (predicate, used) = where_clause(filter);

  let (pay_cols, pay_join) = match &plan.payments {
    Some(t) => (
      "pay.payment_method, pay.payment_status, pay.paid_amount",
      format!(
        " LEFT JOIN LATERAL (
            SELECT p.payment_method::text AS payment_method,
                   p.payment_status::text AS payment_status,
                   p.paid_amount::float8 AS paid_amount
            FROM {} p WHERE p.order_no = o.order_no
            ORDER BY p.paid_at DESC NULLS LAST LIMIT 1
          ) pay ON TRUE",
        t.quoted()
      ),
    ),
    None => (
      "NULL::text AS payment_method, NULL::text AS payment_status, NULL::float8 AS paid_amount",
      String::new(),
    ),
  };

  let (ship_cols, ship_join) = match &plan.shipments {
    Some(t) => (
      "shp.courier, shp.tracking_no",
      format!(
        " LEFT JOIN LATERAL (
            SELECT s.courier::text AS courier, s.tracking_no::text AS tracking_no
            FROM {} s WHERE s.order_no = o.order_no
            ORDER BY s.updated_at DESC NULLS LAST LIMIT 1
          ) shp ON TRUE",
        t.quoted()
      ),
    ),
    None => ("NULL::text AS courier, NULL::text AS tracking_no", String::new()),
  };

  format!(
    "SELECT o.order_no::text AS order_no,
            o.order_status::text AS order_status,
            o.shipping_status::text AS shipping_status,
            o.confirmation_status::text AS confirmation_status,
            o.currency::text AS currency,
            o.invoice_no::text AS invoice_no,
            o.placed_time, o.processed_time, o.shipped_time, o.delivered_time, o.updated_at,
            {pay_cols}, {ship_cols}
     FROM {source} o{pay_join}{ship_join}{predicate}
     ORDER BY o.placed_time DESC NULLS LAST, o.order_no
     LIMIT ${limit} OFFSET ${offset}",
    source = plan.source.quoted(),
    limit = used + 1,
    offset = used + 2,
  )
}

fn decode_order(row: &PgRow) -> Result<SourceOrder, SyncError> {
  Ok(SourceOrder {
    order_no: row.try_get("order_no")?,
    order_status: row.try_get("order_status")?,
    shipping_status: row.try_get("shipping_status")?,
    confirmation_status: row.try_get("confirmation_status")?,
    currency: row.try_get("currency")?,
    invoice_no: row.try_get("invoice_no")?,
    placed_time: row.try_get("placed_time")?,
    processed_time: row.try_get("processed_time")?,
    shipped_time: row.try_get("shipped_time")?,
    delivered_time: row.try_get("delivered_time")?,
    updated_at: row.try_get("updated_at")?,
    payment_method: row.try_get("payment_method")?,
    payment_status: row.try_get("payment_status")?,
    paid_amount: row.try_get("paid_amount")?,
    courier: row.try_get("courier")?,
    tracking_no: row.try_get("tracking_no")?,
  })
}

#[async_trait]
impl SourceStore for PgSourceStore {
  async fn list_tables(&self) -> Result<Vec<String>, SyncError> {
    list_tables(&self.pool).await
  }

  async fn table_exists(&self, table: &TableName) -> Result<bool, SyncError> {
    table_exists(&self.pool, table).await
  }

  async fn count_orders(&self, table: &TableName, filter: &SourceFilter) -> Result<u64, SyncError> {
    let sql = count_sql(table, filter);
    let row = bind_filter(query::<Postgres>(&sql), filter)
      .fetch_one(&self.pool)
      .await?;
    Ok(to_u64(row.try_get::<i64, _>(0)?))
  }

  async fn fetch_orders(
    &self,
    plan: &ExtractPlan,
    filter: &SourceFilter,
    offset: u64,
    limit: u64,
  ) -> Result<Vec<SourceOrder>, SyncError> {
    let sql = extract_sql(plan, filter);
    debug!(table = %plan.source, offset, limit, "fetching source batch");
    let rows = bind_filter(query::<Postgres>(&sql), filter)
      .bind(to_i64(limit))
      .bind(to_i64(offset))
      .fetch_all(&self.pool)
      .await?;
    rows.iter().map(decode_order).collect()
  }
}
