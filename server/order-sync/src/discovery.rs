//! Schema discovery: find source order tables and pair them with targets.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::naming::{is_source_table, BrandAliases, SourceTable, TableName};
use crate::store::{SourceFilter, SourceStore, TargetStore};

/// One source table and the state of its target, as of this discovery run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Discovery {
  pub source: SourceTable,
  pub target_table: TableName,
  pub exists_in_target: bool,
  /// `MAX(updated_at)` of the target table, when it exists.
  pub last_sync: Option<NaiveDateTime>,
  /// Source-clock start of the last complete run into the target, when it
  /// exists. Incremental runs read rows updated at or after this.
  pub sync_watermark: Option<NaiveDateTime>,
  pub target_rows: Option<u64>,
  pub source_rows: u64,
}

/// Scan the source catalog. Per-table failures are logged and skipped; only
/// failing to list either catalog is an error.
///
/// Each target table is claimed by the first source table (in catalog order)
/// that maps to it. Later sources resolving to the same target, as unknown
/// prefixes sharing a fallback code do, are skipped with a warning.
pub async fn discover(
  source: &dyn SourceStore,
  target: &dyn TargetStore,
  aliases: &BrandAliases,
  confirmed_status: Option<&str>,
) -> Result<Vec<Discovery>, SyncError> {
  let source_tables = source.list_tables().await?;
  let target_tables: HashSet<String> = target.list_tables().await?.into_iter().collect();

  let count_filter = SourceFilter {
    confirmed_status: confirmed_status.map(str::to_string),
    ..SourceFilter::default()
  };

  let mut claimed: HashMap<TableName, TableName> = HashMap::new();
  let mut found = Vec::new();
  for name in source_tables {
    let table = match SourceTable::parse(&name, aliases) {
      Some(t) => t,
      None => {
        if is_source_table(&name) {
          warn!(table = %name, "source table name is not a usable identifier; skipped");
        }
        continue;
      }
    };
    let target_table = match table.target_name() {
      Ok(t) => t,
      Err(e) => {
        warn!(table = %name, error = %e, "discovery skipped table");
        continue;
      }
    };
    if let Some(owner) = claimed.get(&target_table) {
      warn!(
        table = %name,
        target = %target_table,
        claimed_by = %owner,
        "target table already claimed by another source; skipped"
      );
      continue;
    }
    claimed.insert(target_table.clone(), table.name.clone());

    match inspect(source, target, &target_tables, table, target_table, &count_filter).await {
      Ok(d) => {
        debug!(
          source = %d.source.name,
          target = %d.target_table,
          exists = d.exists_in_target,
          rows = d.source_rows,
          "discovered source table"
        );
        found.push(d);
      }
      Err(e) => warn!(table = %name, error = %e, "discovery skipped table"),
    }
  }

  info!(tables = found.len(), "discovery complete");
  Ok(found)
}

async fn inspect(
  source: &dyn SourceStore,
  target: &dyn TargetStore,
  target_tables: &HashSet<String>,
  table: SourceTable,
  target_table: TableName,
  count_filter: &SourceFilter,
) -> Result<Discovery, SyncError> {
  let exists_in_target = target_tables.contains(target_table.as_str());

  let (last_sync, sync_watermark, target_rows) = if exists_in_target {
    let stats = target.table_stats(&target_table).await?;
    // An emptied table is resynced in full.
    let watermark = if stats.row_count == 0 {
      None
    } else {
      target.load_watermark(&target_table).await?
    };
    (stats.watermark, watermark, Some(stats.row_count))
  } else {
    (None, None, None)
  };

  let source_rows = source.count_orders(&table.name, count_filter).await?;

  Ok(Discovery {
    source: table,
    target_table,
    exists_in_target,
    last_sync,
    sync_watermark,
    target_rows,
    source_rows,
  })
}
