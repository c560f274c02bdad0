//! # Capwatch Usage Aggregation Engine
//!
//! Measures an account's product usage for the current billing period by
//! querying the analytics backend, and reduces the answers to flat
//! per-metric records: usage, cap, utilization, sampling confidence, and an
//! optional error. Records then bucket into a severity summary that drives
//! dashboards and notifications.
//!
//! ```text
//!   MetricDefinitions      ┌────────────────────┐
//!   BillingPeriod ────────▶│     UsageEngine    │────▶ Vec<UsageRecord>
//!   TrafficFilters         │  batches + fan-out │          │
//!                          └─────────┬──────────┘          ▼
//!                                    │ QueryExecute    categorize()
//!                          ┌─────────▼──────────┐          │
//!                          │  AnalyticsClient   │          ▼
//!                          │  (GraphQL over     │     UsageSummary
//!                          │   HTTPS, bearer)   │
//!                          └────────────────────┘
//! ```
//!
//! The engine never fails a sweep: backend outages, deadline overruns, and
//! bad definitions all surface as records with `error` set, so callers can
//! render or store every metric uniformly.

#![warn(missing_docs)]
#![allow(dead_code)]

pub mod catalog;
pub mod categorize;
pub mod client;
pub mod config;
pub mod confidence;
pub mod engine;
pub mod normalize;
pub mod period;
pub mod query;
pub mod zones;

pub use catalog::{
    default_catalog, Aggregation, MetricDefinition, Scope, TimeFilterKind, UnitTransform,
};
pub use categorize::{categorize, UsageSummary};
pub use client::{AnalyticsClient, QueryError, QueryExecute};
pub use config::{ContractConfig, EngineConfig, SuppressionPair, TrafficFilters};
pub use confidence::ConfidenceInterval;
pub use engine::UsageEngine;
pub use normalize::{percent_used, UsageRecord};
pub use period::{current_billing_period, BillingPeriod};
pub use zones::{ZoneDirectory, ZoneEntry};

use thiserror::Error;

/// Configuration and definition errors the caller should fix, as opposed to
/// runtime query failures, which travel inside `UsageRecord::error`.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A metric definition is internally inconsistent.
    #[error("invalid metric definition '{id}': {reason}")]
    InvalidDefinition {
        /// Id of the offending definition.
        id: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The configured billing timezone is not a known IANA name.
    #[error("unknown timezone: {0}")]
    Timezone(String),
}

/// Convenience alias for fallible engine setup calls.
pub type EngineResult<T> = Result<T, EngineError>;
