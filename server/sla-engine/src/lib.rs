//! Order SLA Engine: deterministic, timezone-aware fulfillment SLA classification.
//!
//! Parses TAT durations, renders stored timestamps into country-local time,
//! classifies each fulfillment stage, assigns alert severity, and aggregates
//! daily per-stage summaries.
//!
//! No DB, no network; pure computation over caller-supplied orders and configs.

pub mod classify;
pub mod duration;
pub mod error;
pub mod stage;
pub mod summary;
pub mod tat;
pub mod timezone;

pub use classify::{Classifier, OrderSla, Severity, SlaStatus, StageResult};
pub use duration::{format_duration, parse_duration, risk_threshold};
pub use error::SlaError;
pub use stage::{Milestones, Stage};
pub use summary::{SummaryBuilder, SummaryRow};
pub use tat::{ResolvedTat, TatConfig, TatConfigStore, TatKey, TatSource};
pub use timezone::{CountryZone, TimezoneMap};
