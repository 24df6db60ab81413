//! Integrity validation and orphaned-summary reconciliation.
//!
//! `validate()` is read-only. `cleanup()` is the only mutating path and
//! deletes exactly the partitions `validate()` would report as orphaned.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use sla_engine::TatKey;
use tracing::{info, warn};

use crate::discovery::{self, Discovery};
use crate::error::SyncError;
use crate::locks::PartitionLocks;
use crate::naming::{is_target_table, target_for_partition, BrandAliases, TableName};
use crate::record::PartitionKey;
use crate::store::{PartitionCount, SourceStore, TargetStore};

/// Summary data exists for a partition with no `tat_config` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TatIssue {
  pub brand_name: String,
  pub country_code: String,
  pub summary_records: u64,
}

/// Summary data whose backing target table is gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrphanedPartition {
  pub brand_name: String,
  pub country_code: String,
  pub missing_table: String,
  pub record_count: u64,
}

/// A discovered source table that has no target table yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingTable {
  pub source_table: String,
  pub target_table: String,
  pub brand_name: String,
  pub country_code: String,
  pub source_rows: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ValidationSummary {
  pub partitions_checked: usize,
  pub tat_issue_count: usize,
  pub orphaned_count: usize,
  pub orphaned_records: u64,
  pub missing_table_count: usize,
  pub healthy: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
  pub tat_issues: Vec<TatIssue>,
  pub orphaned: Vec<OrphanedPartition>,
  pub missing_tables: Vec<MissingTable>,
  pub summary: ValidationSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovedPartition {
  pub brand_name: String,
  pub country_code: String,
  pub missing_table: String,
  /// Rows present immediately before deletion.
  pub record_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupFailure {
  pub brand_name: String,
  pub country_code: String,
  pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
  pub removed: Vec<RemovedPartition>,
  pub errors: Vec<CleanupFailure>,
  pub records_deleted: u64,
}

pub struct IntegrityValidator {
  source: Arc<dyn SourceStore>,
  target: Arc<dyn TargetStore>,
  brands: BrandAliases,
  confirmed_status: Option<String>,
  locks: PartitionLocks,
}

impl IntegrityValidator {
  pub fn new(
    source: Arc<dyn SourceStore>,
    target: Arc<dyn TargetStore>,
    brands: BrandAliases,
  ) -> Self {
    Self {
      source,
      target,
      brands,
      confirmed_status: None,
      locks: PartitionLocks::new(),
    }
  }

  /// Share partition locks with the sync engine so cleanup and sync never
  /// touch the same partition at once.
  pub fn with_locks(mut self, locks: PartitionLocks) -> Self {
    self.locks = locks;
    self
  }

  /// Source row counts in `missing_tables` use this confirmation filter.
  pub fn with_confirmed_status(mut self, status: Option<String>) -> Self {
    self.confirmed_status = status;
    self
  }

  pub async fn validate(&self) -> Result<ValidationReport, SyncError> {
    let partitions = self.target.summary_partitions().await?;
    let configured: HashSet<TatKey> = self
      .target
      .load_tat_configs()
      .await?
      .into_iter()
      .map(|(key, _)| key)
      .collect();
    let target_tables = self.target_tables().await?;

    let tat_issues: Vec<TatIssue> = partitions
      .iter()
      .filter(|p| {
        !configured.contains(&TatKey::new(
          &p.partition.brand_name,
          &p.partition.country_code,
        ))
      })
      .map(|p| TatIssue {
        brand_name: p.partition.brand_name.clone(),
        country_code: p.partition.country_code.clone(),
        summary_records: p.record_count,
      })
      .collect();

    let orphaned = self.orphans(&partitions, &target_tables);

    let discoveries = discovery::discover(
      self.source.as_ref(),
      self.target.as_ref(),
      &self.brands,
      self.confirmed_status.as_deref(),
    )
    .await?;
    let missing_tables: Vec<MissingTable> = discoveries
      .iter()
      .filter(|d| !d.exists_in_target)
      .map(missing_table)
      .collect();

    let summary = ValidationSummary {
      partitions_checked: partitions.len(),
      tat_issue_count: tat_issues.len(),
      orphaned_count: orphaned.len(),
      orphaned_records: orphaned.iter().map(|o| o.record_count).sum(),
      missing_table_count: missing_tables.len(),
      healthy: tat_issues.is_empty() && orphaned.is_empty() && missing_tables.is_empty(),
    };

    info!(
      partitions = summary.partitions_checked,
      tat_issues = summary.tat_issue_count,
      orphaned = summary.orphaned_count,
      missing_tables = summary.missing_table_count,
      "validation finished"
    );

    Ok(ValidationReport {
      tat_issues,
      orphaned,
      missing_tables,
      summary,
    })
  }

  /// Delete every orphaned summary partition, one transaction each.
  ///
  /// Each partition is rechecked under its lock, so a table recreated by a
  /// concurrent sync is left alone.
  pub async fn cleanup(&self) -> Result<CleanupReport, SyncError> {
    let partitions = self.target.summary_partitions().await?;
    let candidates = self.orphans(&partitions, &self.target_tables().await?);
    let mut report = CleanupReport::default();

    for orphan in candidates {
      let key = PartitionKey::new(&orphan.brand_name, &orphan.country_code);
      let _guard = self.locks.lock(&key).await;

      match self.remove_partition(&key, &orphan.missing_table).await {
        Ok(Some(records)) => {
          info!(
            partition = %key,
            missing_table = %orphan.missing_table,
            records,
            "orphaned summary partition removed"
          );
          report.records_deleted += records;
          report.removed.push(RemovedPartition {
            brand_name: orphan.brand_name,
            country_code: orphan.country_code,
            missing_table: orphan.missing_table,
            record_count: records,
          });
        }
        Ok(None) => {
          info!(
            partition = %key,
            table = %orphan.missing_table,
            "target table reappeared, partition kept"
          );
        }
        Err(e) => {
          warn!(partition = %key, error = %e, "summary cleanup failed");
          report.errors.push(CleanupFailure {
            brand_name: orphan.brand_name,
            country_code: orphan.country_code,
            error: e.to_string(),
          });
        }
      }
    }
    Ok(report)
  }

  async fn remove_partition(
    &self,
    key: &PartitionKey,
    missing_table: &str,
  ) -> Result<Option<u64>, SyncError> {
    if self.target_tables().await?.contains(missing_table) {
      return Ok(None);
    }
    Ok(Some(self.target.delete_summary_partition(key).await?))
  }

  async fn target_tables(&self) -> Result<HashSet<String>, SyncError> {
    Ok(
      self
        .target
        .list_tables()
        .await?
        .into_iter()
        .filter(|t| is_target_table(t))
        .collect(),
    )
  }

  fn orphans(
    &self,
    partitions: &[PartitionCount],
    target_tables: &HashSet<String>,
  ) -> Vec<OrphanedPartition> {
    partitions
      .iter()
      .filter_map(|p| {
        let table = self.backing_table(&p.partition)?;
        if target_tables.contains(table.as_str()) {
          return None;
        }
        Some(OrphanedPartition {
          brand_name: p.partition.brand_name.clone(),
          country_code: p.partition.country_code.clone(),
          missing_table: table.to_string(),
          record_count: p.record_count,
        })
      })
      .collect()
  }

  fn backing_table(&self, partition: &PartitionKey) -> Option<TableName> {
    match target_for_partition(partition, &self.brands) {
      Ok(table) => Some(table),
      Err(e) => {
        warn!(
          partition = %partition,
          error = %e,
          "summary partition does not map to a target table name"
        );
        None
      }
    }
  }
}

fn missing_table(d: &Discovery) -> MissingTable {
  MissingTable {
    source_table: d.source.name.to_string(),
    target_table: d.target_table.to_string(),
    brand_name: d.source.brand_name.clone(),
    country_code: d.source.country_code(),
    source_rows: d.source_rows,
  }
}
