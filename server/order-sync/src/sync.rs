//! Sync engine: batched, idempotent copy of source orders into target tables,
//! followed by a full rebuild of each partition's SLA summaries.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use sla_engine::{Classifier, SummaryBuilder, TatConfig, TatConfigStore, TatSource};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::SyncOptions;
use crate::discovery::{self, Discovery};
use crate::error::SyncError;
use crate::locks::PartitionLocks;
use crate::naming::{BrandAliases, SourceTable, TableName};
use crate::record::{OrderRecord, PartitionKey};
use crate::store::{ExtractPlan, SourceFilter, SourceStore, TargetStore};

/// Source of "now" for pending-stage classification.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Restricts a run to matching brands and/or countries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct JobFilter {
  #[serde(default)]
  pub brand: Option<String>,
  #[serde(default)]
  pub country: Option<String>,
}

impl JobFilter {
  /// Brand matches the code, display name, or table prefix (case-insensitive).
  pub fn matches(&self, table: &SourceTable) -> bool {
    let brand_ok = match &self.brand {
      Some(b) => {
        let b = b.trim();
        b.eq_ignore_ascii_case(&table.brand_code)
          || b.eq_ignore_ascii_case(&table.brand_name)
          || b.eq_ignore_ascii_case(&table.prefix)
      }
      None => true,
    };
    let country_ok = match &self.country {
      Some(c) => c.trim().eq_ignore_ascii_case(&table.country),
      None => true,
    };
    brand_ok && country_ok
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
  Succeeded,
  Failed { error: String },
  Cancelled,
}

/// Outcome of one (brand, country) job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobReport {
  pub source_table: String,
  pub target_table: String,
  pub brand_name: String,
  pub country_code: String,
  #[serde(flatten)]
  pub status: JobStatus,
  pub rows_total: u64,
  pub rows_read: u64,
  pub rows_upserted: u64,
  pub row_errors: u64,
  pub batches: u64,
  pub summary_rows: u64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub tat_source: Option<TatSource>,
  pub payments_joined: bool,
  pub shipments_joined: bool,
  /// The target's sync watermark moved to this job's start. Only complete
  /// runs advance it: uncancelled, uncapped, unwindowed, without row errors.
  pub watermark_advanced: bool,
  pub elapsed_ms: u64,
}

impl JobReport {
  fn new(d: &Discovery) -> Self {
    Self {
      source_table: d.source.name.to_string(),
      target_table: d.target_table.to_string(),
      brand_name: d.source.brand_name.clone(),
      country_code: d.source.country_code(),
      status: JobStatus::Succeeded,
      rows_total: 0,
      rows_read: 0,
      rows_upserted: 0,
      row_errors: 0,
      batches: 0,
      summary_rows: 0,
      tat_source: None,
      payments_joined: false,
      shipments_joined: false,
      watermark_advanced: false,
      elapsed_ms: 0,
    }
  }

  pub fn is_failed(&self) -> bool {
    matches!(self.status, JobStatus::Failed { .. })
  }
}

/// Outcome of one `sync()` call across all matching jobs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
  pub run_id: Uuid,
  pub started_at: DateTime<Utc>,
  pub finished_at: DateTime<Utc>,
  pub jobs: Vec<JobReport>,
  /// Rows upserted across all jobs.
  pub processed: u64,
  /// Row errors plus failed jobs.
  pub errors: u64,
  pub cancelled: bool,
}

pub struct SyncEngine {
  source: Arc<dyn SourceStore>,
  target: Arc<dyn TargetStore>,
  classifier: Classifier,
  brands: BrandAliases,
  options: SyncOptions,
  locks: PartitionLocks,
  clock: Clock,
}

impl SyncEngine {
  pub fn new(
    source: Arc<dyn SourceStore>,
    target: Arc<dyn TargetStore>,
    classifier: Classifier,
    brands: BrandAliases,
    options: SyncOptions,
  ) -> Self {
    Self {
      source,
      target,
      classifier,
      brands,
      options,
      locks: PartitionLocks::new(),
      clock: Arc::new(Utc::now),
    }
  }

  /// Share partition locks with the integrity validator.
  pub fn with_locks(mut self, locks: PartitionLocks) -> Self {
    self.locks = locks;
    self
  }

  pub fn with_clock(mut self, clock: Clock) -> Self {
    self.clock = clock;
    self
  }

  pub fn locks(&self) -> &PartitionLocks {
    &self.locks
  }

  pub fn options(&self) -> &SyncOptions {
    &self.options
  }

  pub async fn discover(&self) -> Result<Vec<Discovery>, SyncError> {
    discovery::discover(
      self.source.as_ref(),
      self.target.as_ref(),
      &self.brands,
      self.options.confirmed_status.as_deref(),
    )
    .await
  }

  /// Run every discovered job matching `filter`.
  ///
  /// Only setup failures (catalog or TAT config unreachable) are returned as
  /// errors; everything else lands in the per-job reports.
  pub async fn sync(
    &self,
    filter: &JobFilter,
    cancel: &CancellationToken,
  ) -> Result<SyncReport, SyncError> {
    let run_id = Uuid::new_v4();
    let started_at = (self.clock)();

    let discoveries: Vec<Discovery> = self
      .discover()
      .await?
      .into_iter()
      .filter(|d| filter.matches(&d.source))
      .collect();
    let tat = TatConfigStore::new(self.target.load_tat_configs().await?);

    info!(
      run_id = %run_id,
      jobs = discoveries.len(),
      tat_configs = tat.len(),
      "sync run starting"
    );

    let pending: Vec<_> = discoveries
      .into_iter()
      .map(|d| self.run_job(d, &tat, cancel))
      .collect();
    let mut jobs: Vec<JobReport> = stream::iter(pending)
      .buffer_unordered(self.options.max_parallel_jobs.max(1))
      .collect()
      .await;
    jobs.sort_by(|a, b| a.source_table.cmp(&b.source_table));

    let processed = jobs.iter().map(|j| j.rows_upserted).sum();
    let errors = jobs.iter().map(|j| j.row_errors).sum::<u64>()
      + jobs.iter().filter(|j| j.is_failed()).count() as u64;
    let cancelled = cancel.is_cancelled();

    info!(
      run_id = %run_id,
      jobs = jobs.len(),
      processed,
      errors,
      cancelled,
      "sync run finished"
    );

    Ok(SyncReport {
      run_id,
      started_at,
      finished_at: (self.clock)(),
      jobs,
      processed,
      errors,
      cancelled,
    })
  }

  async fn run_job(
    &self,
    d: Discovery,
    tat: &TatConfigStore,
    cancel: &CancellationToken,
  ) -> JobReport {
    let started = Instant::now();
    let mut report = JobReport::new(&d);

    if cancel.is_cancelled() {
      report.status = JobStatus::Cancelled;
      return report;
    }

    let partition = d.source.partition();
    let _guard = self.locks.lock(&partition).await;

    if let Err(e) = self.execute_job(&d, &partition, tat, cancel, &mut report).await {
      error!(
        table = %d.source.name,
        partition = %partition,
        error = %e,
        "sync job failed"
      );
      report.status = JobStatus::Failed {
        error: e.to_string(),
      };
    }
    report.elapsed_ms = started.elapsed().as_millis() as u64;
    report
  }

  async fn execute_job(
    &self,
    d: &Discovery,
    partition: &PartitionKey,
    tat: &TatConfigStore,
    cancel: &CancellationToken,
    report: &mut JobReport,
  ) -> Result<(), SyncError> {
    let resolved = tat.resolve(&partition.brand_name, &partition.country_code)?;
    report.tat_source = Some(resolved.source);
    // Rows updated after this instant are read again by the next incremental run.
    let job_started = self.stored_now();

    if !self.source.table_exists(&d.source.name).await? {
      return Err(SyncError::MissingSourceTable(d.source.name.to_string()));
    }
    self.target.ensure_order_table(&d.target_table).await?;

    let plan = self.extract_plan(&d.source).await?;
    report.payments_joined = plan.payments.is_some();
    report.shipments_joined = plan.shipments.is_some();

    let filter = self.source_filter(d);
    let total = self.source.count_orders(&d.source.name, &filter).await?;
    report.rows_total = total;
    let cap = match self.options.max_records {
      Some(max) => total.min(max),
      None => total,
    };

    info!(
      table = %d.source.name,
      target = %d.target_table,
      rows = total,
      cap,
      payments = report.payments_joined,
      shipments = report.shipments_joined,
      "sync job starting"
    );

    let mut offset = 0u64;
    while offset < cap {
      if cancel.is_cancelled() {
        warn!(table = %d.source.name, offset, "sync job cancelled before next batch");
        report.status = JobStatus::Cancelled;
        return Ok(());
      }
      let limit = self.options.batch_size.min(cap - offset);
      let rows = self.source.fetch_orders(&plan, &filter, offset, limit).await?;
      if rows.is_empty() {
        break;
      }
      let fetched = rows.len() as u64;
      report.batches += 1;
      report.rows_read += fetched;

      for row in rows {
        let order_no = row.order_no.clone();
        let result = match OrderRecord::from_source(row, &d.source, self.classifier.timezones()) {
          Ok(record) => self.target.upsert_order(&d.target_table, &record).await,
          Err(e) => Err(e),
        };
        match result {
          Ok(()) => report.rows_upserted += 1,
          Err(e) => {
            report.row_errors += 1;
            warn!(
              table = %d.source.name,
              order_no = %order_no,
              error = %e,
              "row sync failed"
            );
          }
        }
      }
      offset += fetched;
    }

    report.summary_rows = self
      .rebuild_summary(&d.target_table, partition, &resolved.config)
      .await?;

    let complete = report.row_errors == 0 && cap == total && filter.placed_since.is_none();
    if complete {
      match self.target.store_watermark(&d.target_table, job_started).await {
        Ok(()) => report.watermark_advanced = true,
        Err(e) => warn!(
          target = %d.target_table,
          error = %e,
          "sync watermark not stored; next incremental run rereads"
        ),
      }
    }

    info!(
      table = %d.source.name,
      upserted = report.rows_upserted,
      row_errors = report.row_errors,
      summary_rows = report.summary_rows,
      watermark_advanced = report.watermark_advanced,
      "sync job finished"
    );
    Ok(())
  }

  /// Probe the auxiliary tables once; the plan then fixes the query shape.
  async fn extract_plan(&self, table: &SourceTable) -> Result<ExtractPlan, SyncError> {
    Ok(ExtractPlan {
      source: table.name.clone(),
      payments: self.auxiliary(table, table.payments_name(), "payments").await?,
      shipments: self.auxiliary(table, table.shipments_name(), "shipments").await?,
    })
  }

  /// An auxiliary table whose name cannot be an identifier is absent.
  async fn auxiliary(
    &self,
    table: &SourceTable,
    name: Option<TableName>,
    kind: &str,
  ) -> Result<Option<TableName>, SyncError> {
    match name {
      Some(name) => Ok(self.source.table_exists(&name).await?.then_some(name)),
      None => {
        debug!(table = %table.name, kind, "auxiliary table name too long; treated as absent");
        Ok(None)
      }
    }
  }

  fn ingestion(&self) -> Duration {
    Duration::minutes(i64::from(
      self.classifier.timezones().ingestion_offset_minutes(),
    ))
  }

  /// Now on the stored (upstream) clock.
  fn stored_now(&self) -> NaiveDateTime {
    (self.clock)().naive_utc() - self.ingestion()
  }

  /// Windows and watermarks are both on the stored (upstream) clock.
  fn source_filter(&self, d: &Discovery) -> SourceFilter {
    let placed_since = self
      .options
      .window_days
      .map(|days| self.stored_now() - Duration::days(i64::from(days)));
    let updated_since = if self.options.incremental {
      d.sync_watermark
    } else {
      None
    };

    SourceFilter {
      confirmed_status: self.options.confirmed_status.clone(),
      placed_since,
      updated_since,
    }
  }

  /// Delete-then-insert the partition's summaries from the full target table.
  async fn rebuild_summary(
    &self,
    table: &TableName,
    partition: &PartitionKey,
    tat: &TatConfig,
  ) -> Result<u64, SyncError> {
    let mut builder = SummaryBuilder::new(
      &self.classifier,
      &partition.brand_name,
      &partition.country_code,
      tat.clone(),
      (self.clock)(),
    );

    let mut offset = 0u64;
    loop {
      let page = self
        .target
        .fetch_milestones(table, partition, offset, self.options.batch_size)
        .await?;
      if page.is_empty() {
        break;
      }
      for milestones in &page {
        builder.add(milestones)?;
      }
      offset += page.len() as u64;
      if (page.len() as u64) < self.options.batch_size {
        break;
      }
    }

    if builder.skipped() > 0 {
      warn!(
        table = %table,
        skipped = builder.skipped(),
        "orders without placement time left out of summaries"
      );
    }

    let rows = builder.finish();
    self.target.replace_summaries(partition, &rows).await
  }
}
