//! Severity categorization.
//!
//! Sorts normalized records into exactly one of four buckets. Error beats
//! alert beats warning beats healthy, so a metric that both failed and
//! looks over-cap is reported as failed rather than as a confident alert.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::normalize::UsageRecord;

/// One sweep's records, bucketed by severity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageSummary {
    /// Metrics at or above the alert threshold, worst first.
    pub alerts: Vec<UsageRecord>,
    /// Metrics at or above the warning threshold, worst first.
    pub warnings: Vec<UsageRecord>,
    /// Everything comfortably under the thresholds.
    pub healthy: Vec<UsageRecord>,
    /// Metrics whose queries failed; their usage numbers are zeroes.
    pub errors: Vec<UsageRecord>,
    /// When the summary was assembled.
    pub timestamp: DateTime<Utc>,
    /// Total backend time across all records in the sweep.
    pub total_query_duration_ms: u64,
}

impl UsageSummary {
    /// Records across all buckets.
    pub fn record_count(&self) -> usize {
        self.alerts.len() + self.warnings.len() + self.healthy.len() + self.errors.len()
    }

    /// Anything an operator should be paged about.
    pub fn has_alerts(&self) -> bool {
        !self.alerts.is_empty()
    }

    /// Anything worth a lower-priority notification.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Bucket `records` by the contract thresholds (percentages, e.g. 90/75).
///
/// Every record lands in exactly one bucket. Alerts and warnings come back
/// sorted by utilization descending so notification payloads lead with the
/// worst offender; ties keep their input order.
pub fn categorize(
    records: Vec<UsageRecord>,
    alert_threshold: f64,
    warning_threshold: f64,
) -> UsageSummary {
    let mut summary = UsageSummary {
        alerts: Vec::new(),
        warnings: Vec::new(),
        healthy: Vec::new(),
        errors: Vec::new(),
        timestamp: Utc::now(),
        total_query_duration_ms: 0,
    };

    for record in records {
        summary.total_query_duration_ms += record.query_duration_ms;
        if record.error.is_some() {
            summary.errors.push(record);
        } else if record.percent_used >= alert_threshold {
            summary.alerts.push(record);
        } else if record.percent_used >= warning_threshold {
            summary.warnings.push(record);
        } else {
            summary.healthy.push(record);
        }
    }

    let by_utilization_desc = |a: &UsageRecord, b: &UsageRecord| {
        b.percent_used
            .partial_cmp(&a.percent_used)
            .unwrap_or(Ordering::Equal)
    };
    summary.alerts.sort_by(by_utilization_desc);
    summary.warnings.sort_by(by_utilization_desc);
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Scope;

    fn record(id: &str, percent: f64, error: Option<&str>) -> UsageRecord {
        UsageRecord {
            metric_id: id.to_string(),
            name: id.to_string(),
            current_usage: percent * 10.0,
            limit: 1000.0,
            percent_used: percent,
            scope: Scope::Zone,
            unlimited: false,
            enabled: true,
            confidence: None,
            error: error.map(str::to_string),
            query_duration_ms: 5,
        }
    }

    #[test]
    fn buckets_are_disjoint_and_exhaustive() {
        let records = vec![
            record("a", 95.0, None),
            record("b", 80.0, None),
            record("c", 10.0, None),
            record("d", 99.0, Some("backend returned HTTP 502")),
        ];
        let summary = categorize(records, 90.0, 75.0);
        assert_eq!(summary.alerts.len(), 1);
        assert_eq!(summary.warnings.len(), 1);
        assert_eq!(summary.healthy.len(), 1);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.record_count(), 4);
        assert_eq!(summary.total_query_duration_ms, 20);
    }

    #[test]
    fn error_outranks_alert() {
        // 99% utilization with a failed query is an error, not an alert.
        let summary = categorize(vec![record("x", 99.0, Some("timeout"))], 90.0, 75.0);
        assert!(summary.alerts.is_empty());
        assert_eq!(summary.errors[0].metric_id, "x");
    }

    #[test]
    fn thresholds_are_inclusive() {
        let summary = categorize(
            vec![record("at_alert", 90.0, None), record("at_warn", 75.0, None)],
            90.0,
            75.0,
        );
        assert_eq!(summary.alerts[0].metric_id, "at_alert");
        assert_eq!(summary.warnings[0].metric_id, "at_warn");
    }

    #[test]
    fn alerts_and_warnings_sort_worst_first() {
        let summary = categorize(
            vec![
                record("a", 91.0, None),
                record("b", 150.0, None),
                record("c", 95.0, None),
                record("d", 76.0, None),
                record("e", 89.9, None),
            ],
            90.0,
            75.0,
        );
        let alert_ids: Vec<&str> = summary.alerts.iter().map(|r| r.metric_id.as_str()).collect();
        assert_eq!(alert_ids, vec!["b", "c", "a"]);
        let warn_ids: Vec<&str> = summary.warnings.iter().map(|r| r.metric_id.as_str()).collect();
        assert_eq!(warn_ids, vec!["e", "d"]);
    }

    #[test]
    fn all_healthy_is_quiet() {
        let summary = categorize(vec![record("a", 1.0, None)], 90.0, 75.0);
        assert!(!summary.has_alerts());
        assert!(!summary.has_warnings());
        assert_eq!(summary.healthy.len(), 1);
    }
}
