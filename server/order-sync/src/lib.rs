//! Order Sync Pipeline
//!
//! Discovers per-brand, per-country source order tables, copies them into
//! consolidated `orders_<brand>_<country>` tables with idempotent upserts,
//! rebuilds the `sla_daily_summary` partitions, and reconciles orphaned
//! summary data. Bind to 127.0.0.1 by default (internal only).

pub mod config;
pub mod discovery;
pub mod error;
mod handlers;
pub mod locks;
pub mod naming;
pub mod pg;
pub mod record;
pub mod schedule;
mod state;
pub mod store;
pub mod sync;
pub mod validate;

pub use config::{Settings, SyncOptions};
pub use discovery::{discover, Discovery};
pub use error::SyncError;
pub use handlers::{health, run_cleanup, run_sync, run_validate};
pub use locks::PartitionLocks;
pub use naming::{BrandAlias, BrandAliases, SourceTable, TableName};
pub use record::{OrderRecord, PartitionKey, SourceOrder};
pub use state::AppState;
pub use store::{ExtractPlan, PartitionCount, SourceFilter, SourceStore, TargetStats, TargetStore};
pub use sync::{JobFilter, JobReport, JobStatus, SyncEngine, SyncReport};
pub use validate::{CleanupReport, IntegrityValidator, ValidationReport};
