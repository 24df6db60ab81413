//! Postgres implementations of the source and target stores.

mod schema;
mod source;
mod target;

pub use source::PgSourceStore;
pub use target::PgTargetStore;

use sqlx_core::row::Row;
use sqlx_postgres::{PgPool, PgRow, Postgres};

use crate::error::SyncError;
use crate::naming::TableName;

const LIST_TABLES_SQL: &str = r#"
  SELECT table_name::text AS table_name
  FROM information_schema.tables
  WHERE table_schema = current_schema() AND table_type = 'BASE TABLE'
  ORDER BY 1
"#;

const TABLE_EXISTS_SQL: &str = r#"
  SELECT EXISTS (
    SELECT 1 FROM information_schema.tables
    WHERE table_schema = current_schema() AND table_name = $1
  )
"#;

async fn list_tables(pool: &PgPool) -> Result<Vec<String>, SyncError> {
  let rows: Vec<PgRow> = sqlx_core::query::query::<Postgres>(LIST_TABLES_SQL)
    .fetch_all(pool)
    .await?;
  rows
    .iter()
    .map(|r| r.try_get::<String, _>("table_name").map_err(SyncError::from))
    .collect()
}

async fn table_exists(pool: &PgPool, table: &TableName) -> Result<bool, SyncError> {
  let row = sqlx_core::query::query::<Postgres>(TABLE_EXISTS_SQL)
    .bind(table.as_str())
    .fetch_one(pool)
    .await?;
  Ok(row.try_get::<bool, _>(0)?)
}

fn to_i64(n: u64) -> i64 {
  i64::try_from(n).unwrap_or(i64::MAX)
}

fn to_u64(n: i64) -> u64 {
  u64::try_from(n).unwrap_or(0)
}
