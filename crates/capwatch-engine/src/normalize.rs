//! Response normalization.
//!
//! Turns whatever the analytics backend returned into one flat
//! [`UsageRecord`] per metric. Rows live under a fixed `series` alias in the
//! first zone or account node; an absent or empty node is a legitimate
//! zero-usage answer (a dormant zone, a product never used) and never an
//! error. Backend failures surface as records with `error` set and zeroed
//! usage, so a scheduler can store or render every record uniformly.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::{Aggregation, MetricDefinition, Scope};
use crate::confidence::{self, ConfidenceInterval};

/// Normalized result for one metric over one billing window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Catalog id of the metric.
    pub metric_id: String,
    /// Human-readable metric name.
    pub name: String,
    /// Aggregated usage in post-transform units. Always finite and >= 0.
    pub current_usage: f64,
    /// Contract cap in the same units. 0.0 means no cap configured.
    pub limit: f64,
    /// Utilization percentage; 0.0 for unlimited or uncapped metrics.
    pub percent_used: f64,
    /// Whether the value was summed across zones or measured account-wide.
    pub scope: Scope,
    /// Metric has no cap by contract.
    pub unlimited: bool,
    /// Metric was enabled when the sweep ran.
    pub enabled: bool,
    /// Combined sampling interval, when the dataset reports one.
    pub confidence: Option<ConfidenceInterval>,
    /// Raw backend error message, preserved verbatim for diagnosis.
    pub error: Option<String>,
    /// Wall-clock time spent resolving this metric.
    pub query_duration_ms: u64,
}

impl UsageRecord {
    /// Whether the record carries a usable measurement.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Usage extracted from a single backend response, before zone partitions
/// are merged and units are transformed.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PartitionUsage {
    pub value: f64,
    pub confidence: Option<ConfidenceInterval>,
}

/// Pull the aggregated value and confidence out of one response body.
pub(crate) fn extract_usage(def: &MetricDefinition, data: &Value) -> PartitionUsage {
    let rows = match locate_rows(def.scope, data) {
        Some(rows) => rows,
        None => {
            return PartitionUsage {
                value: 0.0,
                confidence: None,
            }
        }
    };

    let mut value = 0.0;
    let mut intervals = Vec::new();
    for row in rows {
        if let Some(v) = row_value(def, row) {
            value += v;
        }
        if let Some(interval) = row_confidence(def, row) {
            intervals.push(interval);
        }
    }
    PartitionUsage {
        value,
        confidence: confidence::combine(&intervals),
    }
}

fn locate_rows(scope: Scope, data: &Value) -> Option<&Vec<Value>> {
    let nodes = match scope {
        Scope::Zone => "zones",
        Scope::Account => "accounts",
    };
    data.get("viewer")?
        .get(nodes)?
        .as_array()?
        .first()?
        .get("series")?
        .as_array()
}

fn row_value(def: &MetricDefinition, row: &Value) -> Option<f64> {
    match def.aggregation {
        Aggregation::Count => row.get("count")?.as_f64(),
        agg => row.get(agg.keyword())?.get(&def.field)?.as_f64(),
    }
}

fn row_confidence(def: &MetricDefinition, row: &Value) -> Option<ConfidenceInterval> {
    let node = row.get("confidence")?;
    let bounds = match def.aggregation {
        Aggregation::Count => node.get("count")?,
        agg => node.get(agg.keyword())?.get(&def.field)?,
    };
    Some(ConfidenceInterval::new(
        bounds.get("estimate")?.as_f64()?,
        bounds.get("lower")?.as_f64()?,
        bounds.get("upper")?.as_f64()?,
        node.get("sampleSize").and_then(Value::as_u64).unwrap_or(0),
        node.get("isValid").and_then(Value::as_bool).unwrap_or(true),
        node.get("level")?.as_f64()?,
    ))
}

/// Utilization percentage under the cap rules: unlimited metrics and
/// metrics without a configured cap always read 0.
pub fn percent_used(value: f64, limit: f64, unlimited: bool) -> f64 {
    if unlimited || limit <= 0.0 {
        return 0.0;
    }
    value / limit * 100.0
}

/// Assemble the final record from a merged raw value.
pub(crate) fn finalize_record(
    def: &MetricDefinition,
    raw_value: f64,
    confidence: Option<ConfidenceInterval>,
    query_duration_ms: u64,
) -> UsageRecord {
    let sanitized = if raw_value.is_finite() {
        raw_value.max(0.0)
    } else {
        0.0
    };
    let current_usage = match &def.unit_transform {
        Some(transform) if sanitized != 0.0 => transform.apply(sanitized),
        _ => sanitized,
    };
    UsageRecord {
        metric_id: def.id.clone(),
        name: def.name.clone(),
        current_usage,
        limit: def.limit,
        percent_used: percent_used(current_usage, def.limit, def.unlimited),
        scope: def.scope,
        unlimited: def.unlimited,
        enabled: def.enabled,
        confidence,
        error: None,
        query_duration_ms,
    }
}

/// Record for a metric whose queries failed. Usage reads zero so the record
/// still renders; the message says why it cannot be trusted.
pub(crate) fn error_record(
    def: &MetricDefinition,
    message: String,
    query_duration_ms: u64,
) -> UsageRecord {
    UsageRecord {
        error: Some(message),
        ..finalize_record(def, 0.0, None, query_duration_ms)
    }
}

/// Zeroed placeholder for a metric the contract has disabled.
pub(crate) fn placeholder_record(def: &MetricDefinition) -> UsageRecord {
    finalize_record(def, 0.0, None, 0)
}
