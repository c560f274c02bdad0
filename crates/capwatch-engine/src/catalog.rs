//! Metric Catalog
//!
//! Declarative registry of the products Capwatch watches. Each entry is
//! plain data describing one analytics query: which dataset to hit, which
//! field to aggregate, how to scope it, and how to turn the raw number into
//! the unit the contract caps are written in. Capability tables for the
//! analytics datasets (supported traffic filters, sampling metadata) live
//! here as well so the query builder never has to guess.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::EngineError;

/// HTTP edge traffic, adaptively sampled.
pub const DS_HTTP_REQUESTS: &str = "httpRequestsAdaptiveGroups";
/// Firewall mitigation events, adaptively sampled.
pub const DS_FIREWALL_EVENTS: &str = "firewallEventsAdaptiveGroups";
/// Rendered page views, adaptively sampled.
pub const DS_PAGE_VIEWS: &str = "pageViewsAdaptiveGroups";
/// Authoritative DNS queries, exact counters rolled up by calendar date.
pub const DS_DNS_QUERIES: &str = "dnsQueriesGroups";
/// Edge function invocations, rolled up by hour.
pub const DS_WORKERS: &str = "workersInvocationsAdaptive";
/// Object storage class-A/B operations, exact counters by calendar date.
pub const DS_STORAGE_OPS: &str = "storageOperationsGroups";

/// Datasets backed by exact counters. Requesting confidence sub-fields from
/// these is a schema error on the backend, so the query builder must skip
/// the confidence selection entirely.
pub const CONFIDENCE_DENYLIST: &[&str] = &[DS_DNS_QUERIES, DS_STORAGE_OPS];

/// Aggregation the backend applies over the billing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// Sum of a numeric field across rows.
    Sum,
    /// Row count. Never references a field.
    Count,
    /// Average of a numeric field.
    Avg,
    /// Maximum of a numeric field.
    Max,
}

impl Aggregation {
    /// Selection keyword as it appears in the query text.
    pub fn keyword(&self) -> &'static str {
        match self {
            Aggregation::Sum => "sum",
            Aggregation::Count => "count",
            Aggregation::Avg => "avg",
            Aggregation::Max => "max",
        }
    }
}

/// Whether a metric is measured per zone (and fanned out) or once for the
/// whole account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// One query per zone tag, partial results summed.
    Zone,
    /// A single query against the account tag.
    Account,
}

/// Time-filter dialect a dataset accepts. Using the wrong dialect is
/// rejected by the backend schema, so every definition carries its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimeFilterKind {
    /// `datetime_geq` / `datetime_lt` with RFC 3339 timestamps.
    DateTime,
    /// `date_geq` / `date_lt` with plain `YYYY-MM-DD` dates.
    Date,
    /// `datetimeHour_geq` / `datetimeHour_lt` with hour-truncated timestamps.
    DateTimeHour,
}

impl TimeFilterKind {
    /// Filter key prefix, e.g. `datetime` in `datetime_geq`.
    pub fn key(&self) -> &'static str {
        match self {
            TimeFilterKind::DateTime => "datetime",
            TimeFilterKind::Date => "date",
            TimeFilterKind::DateTimeHour => "datetimeHour",
        }
    }

    /// GraphQL variable type for the window bounds.
    pub fn graphql_type(&self) -> &'static str {
        match self {
            TimeFilterKind::DateTime | TimeFilterKind::DateTimeHour => "Time",
            TimeFilterKind::Date => "Date",
        }
    }
}

/// Named unit conversion applied after aggregation, so caps can be written
/// in contract units (GB, millions of requests) instead of raw counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitTransform {
    /// Microseconds to milliseconds.
    MicrosToMillis,
    /// Bytes to decimal gigabytes.
    BytesToGigabytes,
    /// Raw count to millions.
    PerMillion,
}

impl UnitTransform {
    /// Apply the conversion to a raw aggregated value.
    pub fn apply(&self, value: f64) -> f64 {
        match self {
            UnitTransform::MicrosToMillis => value / 1_000.0,
            UnitTransform::BytesToGigabytes => value / 1_000_000_000.0,
            UnitTransform::PerMillion => value / 1_000_000.0,
        }
    }
}

/// Scalar value usable in a dimension filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// String dimension value.
    Str(String),
    /// Integer dimension value.
    Int(i64),
    /// Boolean dimension value.
    Bool(bool),
}

/// One dimension filter: scalar equality or membership in a list
/// (rendered as a `_in` filter key).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DimensionFilter {
    /// Equality against a single value.
    One(FilterValue),
    /// Membership in a list of values.
    In(Vec<FilterValue>),
}

/// Traffic-dimension switches the request layer may ask for. Only applied
/// to datasets that actually expose the dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficFilterKind {
    /// Keep end-user traffic only.
    EyeballOnly,
    /// Drop requests terminated by a security rule.
    ExcludeBlocked,
    /// Drop edge-internal requests that never reached an origin.
    ExcludeEdgeOrigin,
}

/// Traffic filters a dataset understands. Anything not listed is silently
/// skipped by the query builder rather than sent and rejected.
pub fn supported_traffic_filters(dataset: &str) -> &'static [TrafficFilterKind] {
    match dataset {
        DS_HTTP_REQUESTS => &[
            TrafficFilterKind::EyeballOnly,
            TrafficFilterKind::ExcludeBlocked,
            TrafficFilterKind::ExcludeEdgeOrigin,
        ],
        DS_PAGE_VIEWS => &[
            TrafficFilterKind::EyeballOnly,
            TrafficFilterKind::ExcludeBlocked,
        ],
        _ => &[],
    }
}

/// Whether a dataset exposes a traffic filter dimension.
pub fn dataset_supports(dataset: &str, kind: TrafficFilterKind) -> bool {
    supported_traffic_filters(dataset).contains(&kind)
}

/// Whether a dataset exposes sampling confidence metadata.
pub fn dataset_supports_confidence(dataset: &str) -> bool {
    !CONFIDENCE_DENYLIST.contains(&dataset)
}

/// Everything the engine needs to meter one product. Pure data: entries are
/// serializable, ship no behavior, and can come from static defaults or the
/// configuration layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    /// Stable identifier, e.g. `zone_requests`.
    pub id: String,
    /// Human-readable name for summaries and notifications.
    pub name: String,
    /// Analytics dataset to query.
    pub dataset: String,
    /// Field to aggregate. `Count` ignores it, so it may stay empty.
    #[serde(default)]
    pub field: String,
    /// Aggregation the backend applies.
    pub aggregation: Aggregation,
    /// Zone fan-out or single account-wide query.
    pub scope: Scope,
    /// Time-filter dialect the dataset accepts.
    pub time_filter: TimeFilterKind,
    /// Extra equality / membership filters on dataset dimensions.
    #[serde(default)]
    pub dimension_filters: BTreeMap<String, DimensionFilter>,
    /// Unit conversion applied to the aggregated value, if any.
    #[serde(default)]
    pub unit_transform: Option<UnitTransform>,
    /// Metric has no cap; utilization is always reported as 0%.
    #[serde(default)]
    pub unlimited: bool,
    /// Disabled metrics are skipped (or reported as zeroed placeholders).
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Contract cap in post-transform units. 0.0 means no cap configured.
    #[serde(default)]
    pub limit: f64,
}

fn default_enabled() -> bool {
    true
}

impl MetricDefinition {
    /// Validate internal consistency before the definition reaches the
    /// query builder.
    pub fn validate(&self) -> Result<(), EngineError> {
        let invalid = |reason: &str| EngineError::InvalidDefinition {
            id: self.id.clone(),
            reason: reason.to_string(),
        };
        if self.id.is_empty() {
            return Err(invalid("empty id"));
        }
        if self.dataset.is_empty() {
            return Err(invalid("empty dataset"));
        }
        match self.aggregation {
            Aggregation::Sum | Aggregation::Avg | Aggregation::Max if self.field.is_empty() => {
                Err(invalid("field aggregation requires a field"))
            }
            _ if self.limit < 0.0 || !self.limit.is_finite() => {
                Err(invalid("limit must be a finite non-negative number"))
            }
            _ => Ok(()),
        }
    }
}

fn metric(
    id: &str,
    name: &str,
    dataset: &str,
    field: &str,
    aggregation: Aggregation,
    scope: Scope,
    time_filter: TimeFilterKind,
    limit: f64,
) -> MetricDefinition {
    MetricDefinition {
        id: id.to_string(),
        name: name.to_string(),
        dataset: dataset.to_string(),
        field: field.to_string(),
        aggregation,
        scope,
        time_filter,
        dimension_filters: BTreeMap::new(),
        unit_transform: None,
        unlimited: false,
        enabled: true,
        limit,
    }
}

/// Built-in catalog covering the metered products. Limits are the plan
/// defaults; the contract layer overrides them per account.
pub fn default_catalog() -> Vec<MetricDefinition> {
    let cached = {
        let mut def = metric(
            "cached_requests",
            "Cached Requests",
            DS_HTTP_REQUESTS,
            "",
            Aggregation::Count,
            Scope::Zone,
            TimeFilterKind::DateTime,
            0.0,
        );
        def.dimension_filters.insert(
            "cacheStatus".to_string(),
            DimensionFilter::In(vec![
                FilterValue::Str("hit".to_string()),
                FilterValue::Str("stale".to_string()),
                FilterValue::Str("revalidated".to_string()),
            ]),
        );
        def
    };
    let blocked = {
        let mut def = metric(
            "firewall_events",
            "Firewall Events",
            DS_FIREWALL_EVENTS,
            "",
            Aggregation::Count,
            Scope::Zone,
            TimeFilterKind::DateTime,
            1_000_000.0,
        );
        def.dimension_filters.insert(
            "action".to_string(),
            DimensionFilter::One(FilterValue::Str("block".to_string())),
        );
        def
    };

    vec![
        metric(
            "zone_requests",
            "HTTP Requests (zones)",
            DS_HTTP_REQUESTS,
            "",
            Aggregation::Count,
            Scope::Zone,
            TimeFilterKind::DateTime,
            10_000_000.0,
        ),
        MetricDefinition {
            unit_transform: Some(UnitTransform::BytesToGigabytes),
            ..metric(
                "zone_bandwidth",
                "Bandwidth (zones, GB)",
                DS_HTTP_REQUESTS,
                "edgeResponseBytes",
                Aggregation::Sum,
                Scope::Zone,
                TimeFilterKind::DateTime,
                500.0,
            )
        },
        cached,
        blocked,
        metric(
            "page_views",
            "Page Views",
            DS_PAGE_VIEWS,
            "",
            Aggregation::Count,
            Scope::Zone,
            TimeFilterKind::DateTime,
            5_000_000.0,
        ),
        metric(
            "dns_queries",
            "DNS Queries",
            DS_DNS_QUERIES,
            "",
            Aggregation::Count,
            Scope::Zone,
            TimeFilterKind::Date,
            30_000_000.0,
        ),
        MetricDefinition {
            unlimited: true,
            ..metric(
                "origin_latency",
                "Origin TTFB (avg ms)",
                DS_HTTP_REQUESTS,
                "edgeTimeToFirstByteMs",
                Aggregation::Avg,
                Scope::Account,
                TimeFilterKind::DateTime,
                0.0,
            )
        },
        metric(
            "account_requests",
            "HTTP Requests (account)",
            DS_HTTP_REQUESTS,
            "",
            Aggregation::Count,
            Scope::Account,
            TimeFilterKind::DateTime,
            50_000_000.0,
        ),
        MetricDefinition {
            unit_transform: Some(UnitTransform::BytesToGigabytes),
            ..metric(
                "account_bandwidth",
                "Bandwidth (account, GB)",
                DS_HTTP_REQUESTS,
                "edgeResponseBytes",
                Aggregation::Sum,
                Scope::Account,
                TimeFilterKind::DateTime,
                2_000.0,
            )
        },
        MetricDefinition {
            unit_transform: Some(UnitTransform::PerMillion),
            ..metric(
                "workers_requests",
                "Workers Invocations (millions)",
                DS_WORKERS,
                "requests",
                Aggregation::Sum,
                Scope::Account,
                TimeFilterKind::DateTimeHour,
                10.0,
            )
        },
        MetricDefinition {
            unit_transform: Some(UnitTransform::MicrosToMillis),
            ..metric(
                "workers_cpu",
                "Workers CPU Time (ms)",
                DS_WORKERS,
                "cpuTimeUs",
                Aggregation::Sum,
                Scope::Account,
                TimeFilterKind::DateTimeHour,
                30_000_000.0,
            )
        },
        metric(
            "storage_operations",
            "Storage Operations",
            DS_STORAGE_OPS,
            "",
            Aggregation::Count,
            Scope::Account,
            TimeFilterKind::Date,
            1_000_000.0,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_validates() {
        let catalog = default_catalog();
        assert_eq!(catalog.len(), 12);
        for def in &catalog {
            def.validate().unwrap();
        }
    }

    #[test]
    fn count_tolerates_a_redundant_field() {
        let mut def = metric(
            "requests",
            "Requests",
            DS_HTTP_REQUESTS,
            "edgeResponseBytes",
            Aggregation::Count,
            Scope::Zone,
            TimeFilterKind::DateTime,
            0.0,
        );
        def.validate().unwrap();
        def.field.clear();
        def.validate().unwrap();
    }

    #[test]
    fn field_aggregations_require_a_field() {
        let def = metric(
            "bad_sum",
            "Bad Sum",
            DS_WORKERS,
            "",
            Aggregation::Sum,
            Scope::Account,
            TimeFilterKind::DateTimeHour,
            1.0,
        );
        let err = def.validate().unwrap_err();
        assert!(err.to_string().contains("bad_sum"));
    }

    #[test]
    fn unit_transforms() {
        assert_eq!(UnitTransform::MicrosToMillis.apply(2_500.0), 2.5);
        assert_eq!(UnitTransform::BytesToGigabytes.apply(3_000_000_000.0), 3.0);
        assert_eq!(UnitTransform::PerMillion.apply(4_500_000.0), 4.5);
    }

    #[test]
    fn capability_tables() {
        assert!(dataset_supports(
            DS_HTTP_REQUESTS,
            TrafficFilterKind::ExcludeEdgeOrigin
        ));
        assert!(!dataset_supports(
            DS_PAGE_VIEWS,
            TrafficFilterKind::ExcludeEdgeOrigin
        ));
        assert!(supported_traffic_filters(DS_WORKERS).is_empty());
        assert!(dataset_supports_confidence(DS_HTTP_REQUESTS));
        assert!(!dataset_supports_confidence(DS_DNS_QUERIES));
    }

    #[test]
    fn dimension_filters_parse_from_config_json() {
        let def: MetricDefinition = serde_json::from_str(
            r#"{
                "id": "custom",
                "name": "Custom",
                "dataset": "httpRequestsAdaptiveGroups",
                "aggregation": "count",
                "scope": "zone",
                "time_filter": "dateTime",
                "dimension_filters": {
                    "clientCountryName": "US",
                    "edgeResponseStatus": [200, 304]
                },
                "limit": 100.0
            }"#,
        )
        .unwrap();
        assert_eq!(
            def.dimension_filters["clientCountryName"],
            DimensionFilter::One(FilterValue::Str("US".to_string()))
        );
        assert_eq!(
            def.dimension_filters["edgeResponseStatus"],
            DimensionFilter::In(vec![FilterValue::Int(200), FilterValue::Int(304)])
        );
        def.validate().unwrap();
    }
}
