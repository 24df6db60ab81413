//! In-memory source and target stores with the same semantics as the
//! Postgres implementations.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use order_sync::{
  ExtractPlan, OrderRecord, PartitionCount, PartitionKey, SourceFilter, SourceOrder, SourceStore,
  SyncError, TableName, TargetStats, TargetStore,
};
use sla_engine::{Milestones, SummaryRow, TatConfig, TatKey};
use tokio_util::sync::CancellationToken;

pub fn ts(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
  NaiveDate::from_ymd_opt(y, m, d)
    .unwrap()
    .and_hms_opt(h, min, 0)
    .unwrap()
}

#[derive(Debug, Clone, Default)]
pub struct Payment {
  pub method: Option<String>,
  pub status: Option<String>,
  pub amount: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct Shipment {
  pub courier: Option<String>,
  pub tracking_no: Option<String>,
}

#[derive(Default)]
struct SourceData {
  orders: BTreeMap<String, Vec<SourceOrder>>,
  payments: BTreeMap<String, HashMap<String, Payment>>,
  shipments: BTreeMap<String, HashMap<String, Shipment>>,
  /// Listed in the catalog but gone by the time a job probes it.
  vanished: HashSet<String>,
  /// Row counts against these tables fail.
  count_failures: HashSet<String>,
  fetches: u64,
  cancel_after: Option<(u64, CancellationToken)>,
}

#[derive(Default)]
pub struct MemorySource {
  data: Mutex<SourceData>,
}

impl MemorySource {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_orders(&self, table: &str, rows: Vec<SourceOrder>) {
    self
      .data
      .lock()
      .unwrap()
      .orders
      .entry(table.to_string())
      .or_default()
      .extend(rows);
  }

  /// Replace a stored row by order number.
  pub fn update_order(&self, table: &str, row: SourceOrder) {
    let mut data = self.data.lock().unwrap();
    let rows = data.orders.get_mut(table).unwrap();
    let slot = rows.iter_mut().find(|r| r.order_no == row.order_no).unwrap();
    *slot = row;
  }

  pub fn add_payment(&self, table: &str, order_no: &str, payment: Payment) {
    self
      .data
      .lock()
      .unwrap()
      .payments
      .entry(table.to_string())
      .or_default()
      .insert(order_no.to_string(), payment);
  }

  pub fn add_shipment(&self, table: &str, order_no: &str, shipment: Shipment) {
    self
      .data
      .lock()
      .unwrap()
      .shipments
      .entry(table.to_string())
      .or_default()
      .insert(order_no.to_string(), shipment);
  }

  /// Keep the table in the catalog listing but fail existence probes.
  pub fn vanish(&self, table: &str) {
    self.data.lock().unwrap().vanished.insert(table.to_string());
  }

  pub fn fail_count(&self, table: &str) {
    self.data.lock().unwrap().count_failures.insert(table.to_string());
  }

  pub fn cancel_after_fetches(&self, n: u64, token: CancellationToken) {
    self.data.lock().unwrap().cancel_after = Some((n, token));
  }

  pub fn fetches(&self) -> u64 {
    self.data.lock().unwrap().fetches
  }
}

fn passes(order: &SourceOrder, filter: &SourceFilter) -> bool {
  if let Some(status) = &filter.confirmed_status {
    if order.confirmation_status.as_deref() != Some(status.as_str()) {
      return false;
    }
  }
  if let Some(since) = filter.placed_since {
    if !order.placed_time.is_some_and(|t| t >= since) {
      return false;
    }
  }
  if let Some(since) = filter.updated_since {
    if !order.updated_at.is_some_and(|t| t >= since) {
      return false;
    }
  }
  true
}

#[async_trait]
impl SourceStore for MemorySource {
  async fn list_tables(&self) -> Result<Vec<String>, SyncError> {
    let data = self.data.lock().unwrap();
    let names: BTreeSet<String> = data
      .orders
      .keys()
      .chain(data.payments.keys())
      .chain(data.shipments.keys())
      .cloned()
      .chain(std::iter::once("audit_log".to_string()))
      .collect();
    Ok(names.into_iter().collect())
  }

  async fn table_exists(&self, table: &TableName) -> Result<bool, SyncError> {
    let data = self.data.lock().unwrap();
    let name = table.as_str();
    if data.vanished.contains(name) {
      return Ok(false);
    }
    Ok(
      data.orders.contains_key(name)
        || data.payments.contains_key(name)
        || data.shipments.contains_key(name),
    )
  }

  async fn count_orders(&self, table: &TableName, filter: &SourceFilter) -> Result<u64, SyncError> {
    let data = self.data.lock().unwrap();
    if data.count_failures.contains(table.as_str()) {
      return Err(SyncError::validation("count", "source connection reset"));
    }
    let rows = data
      .orders
      .get(table.as_str())
      .ok_or_else(|| SyncError::MissingSourceTable(table.to_string()))?;
    Ok(rows.iter().filter(|o| passes(o, filter)).count() as u64)
  }

  async fn fetch_orders(
    &self,
    plan: &ExtractPlan,
    filter: &SourceFilter,
    offset: u64,
    limit: u64,
  ) -> Result<Vec<SourceOrder>, SyncError> {
    let mut data = self.data.lock().unwrap();
    data.fetches += 1;
    if let Some((n, token)) = &data.cancel_after {
      if data.fetches >= *n {
        token.cancel();
      }
    }

    let mut rows: Vec<SourceOrder> = data
      .orders
      .get(plan.source.as_str())
      .ok_or_else(|| SyncError::MissingSourceTable(plan.source.to_string()))?
      .iter()
      .filter(|o| passes(o, filter))
      .cloned()
      .collect();
    // placed_time DESC NULLS LAST, order_no
    rows.sort_by(|a, b| match (a.placed_time, b.placed_time) {
      (Some(x), Some(y)) => y.cmp(&x).then_with(|| a.order_no.cmp(&b.order_no)),
      (Some(_), None) => std::cmp::Ordering::Less,
      (None, Some(_)) => std::cmp::Ordering::Greater,
      (None, None) => a.order_no.cmp(&b.order_no),
    });

    let payments = plan.payments.as_ref().and_then(|t| data.payments.get(t.as_str()));
    let shipments = plan.shipments.as_ref().and_then(|t| data.shipments.get(t.as_str()));

    Ok(
      rows
        .into_iter()
        .skip(offset as usize)
        .take(limit as usize)
        .map(|mut row| {
          let payment = payments.and_then(|p| p.get(&row.order_no)).cloned().unwrap_or_default();
          let shipment = shipments.and_then(|s| s.get(&row.order_no)).cloned().unwrap_or_default();
          row.payment_method = payment.method;
          row.payment_status = payment.status;
          row.paid_amount = payment.amount;
          row.courier = shipment.courier;
          row.tracking_no = shipment.tracking_no;
          row
        })
        .collect(),
    )
  }
}

#[derive(Default)]
struct TargetData {
  tables: BTreeMap<String, BTreeMap<String, (OrderRecord, NaiveDateTime)>>,
  tat: Vec<(TatKey, TatConfig)>,
  summaries: Vec<SummaryRow>,
  failing: HashSet<String>,
  watermarks: HashMap<String, NaiveDateTime>,
  replace_calls: u64,
}

#[derive(Default)]
pub struct MemoryTarget {
  data: Mutex<TargetData>,
}

impl MemoryTarget {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set_tat(&self, brand_name: &str, country_code: &str, config: TatConfig) {
    let mut data = self.data.lock().unwrap();
    let key = TatKey::new(brand_name, country_code);
    data.tat.retain(|(k, _)| *k != key);
    data.tat.push((key, config));
  }

  /// Upserts for this order number fail.
  pub fn fail_order(&self, order_no: &str) {
    self.data.lock().unwrap().failing.insert(order_no.to_string());
  }

  pub fn clear_failures(&self) {
    self.data.lock().unwrap().failing.clear();
  }

  pub fn watermark(&self, table: &str) -> Option<NaiveDateTime> {
    self.data.lock().unwrap().watermarks.get(table).copied()
  }

  pub fn create_table(&self, table: &str) {
    self.data.lock().unwrap().tables.entry(table.to_string()).or_default();
  }

  pub fn drop_table(&self, table: &str) {
    let mut data = self.data.lock().unwrap();
    data.tables.remove(table);
    data.watermarks.remove(table);
  }

  pub fn records(&self, table: &str) -> Vec<OrderRecord> {
    self
      .data
      .lock()
      .unwrap()
      .tables
      .get(table)
      .map(|rows| rows.values().map(|(r, _)| r.clone()).collect())
      .unwrap_or_default()
  }

  pub fn record(&self, table: &str, order_no: &str) -> Option<OrderRecord> {
    self.records(table).into_iter().find(|r| r.order_no == order_no)
  }

  pub fn insert_summaries(&self, rows: Vec<SummaryRow>) {
    self.data.lock().unwrap().summaries.extend(rows);
  }

  pub fn summaries(&self, brand_name: &str, country_code: &str) -> Vec<SummaryRow> {
    self
      .data
      .lock()
      .unwrap()
      .summaries
      .iter()
      .filter(|r| r.brand_name == brand_name && r.country_code == country_code)
      .cloned()
      .collect()
  }

  pub fn all_summaries(&self) -> Vec<SummaryRow> {
    self.data.lock().unwrap().summaries.clone()
  }

  pub fn replace_calls(&self) -> u64 {
    self.data.lock().unwrap().replace_calls
  }
}

#[async_trait]
impl TargetStore for MemoryTarget {
  async fn list_tables(&self) -> Result<Vec<String>, SyncError> {
    let data = self.data.lock().unwrap();
    let mut names: Vec<String> = data.tables.keys().cloned().collect();
    names.push("tat_config".to_string());
    names.push("sla_daily_summary".to_string());
    Ok(names)
  }

  async fn ensure_metadata_tables(&self) -> Result<(), SyncError> {
    Ok(())
  }

  async fn ensure_order_table(&self, table: &TableName) -> Result<(), SyncError> {
    self.create_table(table.as_str());
    Ok(())
  }

  async fn table_stats(&self, table: &TableName) -> Result<TargetStats, SyncError> {
    let data = self.data.lock().unwrap();
    let rows = data
      .tables
      .get(table.as_str())
      .ok_or_else(|| SyncError::validation("table", "does not exist"))?;
    Ok(TargetStats {
      watermark: rows.values().map(|(_, at)| *at).max(),
      row_count: rows.len() as u64,
    })
  }

  async fn upsert_order(&self, table: &TableName, record: &OrderRecord) -> Result<(), SyncError> {
    let mut data = self.data.lock().unwrap();
    if data.failing.contains(&record.order_no) {
      return Err(SyncError::validation("order_no", "rejected by target"));
    }
    let rows = data
      .tables
      .get_mut(table.as_str())
      .ok_or_else(|| SyncError::validation("table", "does not exist"))?;
    let merged = match rows.get(&record.order_no) {
      Some((existing, _)) => record.merged_over(existing),
      None => record.clone(),
    };
    rows.insert(record.order_no.clone(), (merged, Utc::now().naive_utc()));
    Ok(())
  }

  async fn fetch_milestones(
    &self,
    table: &TableName,
    partition: &PartitionKey,
    offset: u64,
    limit: u64,
  ) -> Result<Vec<Milestones>, SyncError> {
    let data = self.data.lock().unwrap();
    let rows = data
      .tables
      .get(table.as_str())
      .ok_or_else(|| SyncError::validation("table", "does not exist"))?;
    Ok(
      rows
        .values()
        .filter(|(r, _)| {
          r.brand_name == partition.brand_name && r.country_code == partition.country_code
        })
        .skip(offset as usize)
        .take(limit as usize)
        .map(|(r, _)| r.milestones())
        .collect(),
    )
  }

  async fn load_watermark(&self, table: &TableName) -> Result<Option<NaiveDateTime>, SyncError> {
    Ok(self.watermark(table.as_str()))
  }

  async fn store_watermark(&self, table: &TableName, at: NaiveDateTime) -> Result<(), SyncError> {
    self
      .data
      .lock()
      .unwrap()
      .watermarks
      .insert(table.to_string(), at);
    Ok(())
  }

  async fn load_tat_configs(&self) -> Result<Vec<(TatKey, TatConfig)>, SyncError> {
    Ok(self.data.lock().unwrap().tat.clone())
  }

  async fn replace_summaries(
    &self,
    partition: &PartitionKey,
    rows: &[SummaryRow],
  ) -> Result<u64, SyncError> {
    let mut data = self.data.lock().unwrap();
    data.replace_calls += 1;
    data.summaries.retain(|r| {
      !(r.brand_name == partition.brand_name && r.country_code == partition.country_code)
    });
    data.summaries.extend(rows.iter().cloned());
    Ok(rows.len() as u64)
  }

  async fn summary_partitions(&self) -> Result<Vec<PartitionCount>, SyncError> {
    let data = self.data.lock().unwrap();
    let mut counts: BTreeMap<PartitionKey, u64> = BTreeMap::new();
    for row in &data.summaries {
      *counts
        .entry(PartitionKey::new(&row.brand_name, &row.country_code))
        .or_default() += 1;
    }
    Ok(
      counts
        .into_iter()
        .map(|(partition, record_count)| PartitionCount {
          partition,
          record_count,
        })
        .collect(),
    )
  }

  async fn delete_summary_partition(&self, partition: &PartitionKey) -> Result<u64, SyncError> {
    let mut data = self.data.lock().unwrap();
    let before = data.summaries.len();
    data.summaries.retain(|r| {
      !(r.brand_name == partition.brand_name && r.country_code == partition.country_code)
    });
    Ok((before - data.summaries.len()) as u64)
  }
}
