//! Storage seams: the source catalog/orders and the consolidated target.
//!
//! The Postgres implementations live in [`crate::pg`]. Every method takes
//! validated [`TableName`]s; values are always bound, never interpolated.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Serialize;
use sla_engine::{Milestones, SummaryRow, TatConfig, TatKey};

use crate::error::SyncError;
use crate::naming::TableName;
use crate::record::{OrderRecord, PartitionKey, SourceOrder};

/// Row filter applied to a source orders table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceFilter {
  /// Only rows whose `confirmation_status` equals this value.
  pub confirmed_status: Option<String>,
  /// Only rows placed at or after this (stored clock) time.
  pub placed_since: Option<NaiveDateTime>,
  /// Only rows updated at or after this (stored clock) time.
  pub updated_since: Option<NaiveDateTime>,
}

/// Fixed extraction query shape for one job, chosen after probing the
/// auxiliary tables once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractPlan {
  pub source: TableName,
  pub payments: Option<TableName>,
  pub shipments: Option<TableName>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TargetStats {
  /// `MAX(updated_at)`; `None` for an empty table.
  pub watermark: Option<NaiveDateTime>,
  pub row_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionCount {
  pub partition: PartitionKey,
  pub record_count: u64,
}

#[async_trait]
pub trait SourceStore: Send + Sync {
  /// All table names in the source schema.
  async fn list_tables(&self) -> Result<Vec<String>, SyncError>;

  async fn table_exists(&self, table: &TableName) -> Result<bool, SyncError>;

  async fn count_orders(&self, table: &TableName, filter: &SourceFilter) -> Result<u64, SyncError>;

  /// One page of orders, newest placement first, with enrichment joined per `plan`.
  async fn fetch_orders(
    &self,
    plan: &ExtractPlan,
    filter: &SourceFilter,
    offset: u64,
    limit: u64,
  ) -> Result<Vec<SourceOrder>, SyncError>;
}

#[async_trait]
pub trait TargetStore: Send + Sync {
  async fn list_tables(&self) -> Result<Vec<String>, SyncError>;

  /// Create `tat_config`, `sla_daily_summary` and `sync_watermark` if missing.
  async fn ensure_metadata_tables(&self) -> Result<(), SyncError>;

  /// Create an order table and its indexes if missing. Safe under races.
  async fn ensure_order_table(&self, table: &TableName) -> Result<(), SyncError>;

  async fn table_stats(&self, table: &TableName) -> Result<TargetStats, SyncError>;

  /// Insert or update one order keyed on `order_no`, in its own transaction.
  async fn upsert_order(&self, table: &TableName, record: &OrderRecord) -> Result<(), SyncError>;

  /// One page of a partition's milestone sets, ordered by `order_no`. Rows
  /// of other brands sharing the table are excluded.
  async fn fetch_milestones(
    &self,
    table: &TableName,
    partition: &PartitionKey,
    offset: u64,
    limit: u64,
  ) -> Result<Vec<Milestones>, SyncError>;

  /// Source-clock start of the last complete incremental run into `table`.
  async fn load_watermark(&self, table: &TableName) -> Result<Option<NaiveDateTime>, SyncError>;

  async fn store_watermark(&self, table: &TableName, at: NaiveDateTime) -> Result<(), SyncError>;

  async fn load_tat_configs(&self) -> Result<Vec<(TatKey, TatConfig)>, SyncError>;

  /// Delete then insert a partition's summary rows in one transaction.
  async fn replace_summaries(
    &self,
    partition: &PartitionKey,
    rows: &[SummaryRow],
  ) -> Result<u64, SyncError>;

  async fn summary_partitions(&self) -> Result<Vec<PartitionCount>, SyncError>;

  /// Delete one partition's summary rows in one transaction; returns the
  /// number of rows it held.
  async fn delete_summary_partition(&self, partition: &PartitionKey) -> Result<u64, SyncError>;
}
