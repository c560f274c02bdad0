//! Analytics query construction.
//!
//! Builds one GraphQL document per metric and scope tag. The document text
//! is assembled from the metric definition; window bounds and the scope tag
//! always travel as variables. Rows come back under the fixed alias
//! `series` so the normalizer never needs to know the dataset name.

use serde_json::{Map, Value};

use crate::catalog::{
    self, Aggregation, DimensionFilter, FilterValue, MetricDefinition, Scope, TimeFilterKind,
    TrafficFilterKind,
};
use crate::config::{EngineConfig, TrafficFilters};
use crate::period::BillingPeriod;

use chrono::{DateTime, SecondsFormat, Timelike, Utc};

/// A ready-to-send query: document text plus its variables object.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltQuery {
    /// GraphQL document.
    pub text: String,
    /// Variables object posted alongside the document.
    pub variables: Value,
}

/// Build the query for one metric against one scope tag (a zone tag for
/// zone-scoped metrics, the account tag otherwise).
pub fn build_query(
    def: &MetricDefinition,
    scope_tag: &str,
    period: &BillingPeriod,
    filters: &TrafficFilters,
    config: &EngineConfig,
) -> BuiltQuery {
    let (scope_var, scope_field) = match def.scope {
        Scope::Zone => ("zoneTag", "zones"),
        Scope::Account => ("accountTag", "accounts"),
    };
    let time_type = def.time_filter.graphql_type();
    let time_key = def.time_filter.key();

    let mut filter_parts = vec![
        format!("{}_geq: $start", time_key),
        format!("{}_lt: $end", time_key),
    ];
    for kind in catalog::supported_traffic_filters(&def.dataset) {
        let requested = match kind {
            TrafficFilterKind::EyeballOnly => filters.eyeball_only,
            TrafficFilterKind::ExcludeBlocked => filters.exclude_blocked,
            TrafficFilterKind::ExcludeEdgeOrigin => filters.exclude_edge_origin,
        };
        if !requested {
            continue;
        }
        filter_parts.push(match kind {
            TrafficFilterKind::EyeballOnly => r#"requestSource: "eyeball""#.to_string(),
            TrafficFilterKind::ExcludeBlocked => r#"securityAction_neq: "block""#.to_string(),
            TrafficFilterKind::ExcludeEdgeOrigin => "originResponseStatus_gt: 0".to_string(),
        });
    }
    for (key, dim) in &def.dimension_filters {
        filter_parts.push(match dim {
            DimensionFilter::One(value) => format!("{}: {}", key, render_value(value)),
            DimensionFilter::In(values) => {
                let list: Vec<String> = values.iter().map(render_value).collect();
                format!("{}_in: [{}]", key, list.join(", "))
            }
        });
    }
    let filter = filter_parts.join(", ");

    let selection = match def.aggregation {
        Aggregation::Count => "count".to_string(),
        agg => format!("{} {{ {} }}", agg.keyword(), def.field),
    };
    let confidence = if catalog::dataset_supports_confidence(&def.dataset) {
        let inner = match def.aggregation {
            Aggregation::Count => "count { estimate lower upper }".to_string(),
            agg => format!("{} {{ {} {{ estimate lower upper }} }}", agg.keyword(), def.field),
        };
        format!(
            " confidence(level: {}) {{ level isValid sampleSize {} }}",
            config.confidence_level, inner
        )
    } else {
        String::new()
    };

    let text = format!(
        "query(${}: String!, $start: {}!, $end: {}!) {{ \
viewer {{ {}(filter: {{ {}: ${} }}) {{ \
series: {}(limit: {}, filter: {{ {} }}) {{ {}{} }} \
}} }} }}",
        scope_var,
        time_type,
        time_type,
        scope_field,
        scope_var,
        scope_var,
        def.dataset,
        config.query_limit,
        filter,
        selection,
        confidence,
    );

    let (start, end) = render_window(def.time_filter, period);
    let mut variables = Map::new();
    variables.insert(scope_var.to_string(), Value::String(scope_tag.to_string()));
    variables.insert("start".to_string(), Value::String(start));
    variables.insert("end".to_string(), Value::String(end));

    BuiltQuery {
        text,
        variables: Value::Object(variables),
    }
}

/// Render the window bounds in the dataset's dialect.
fn render_window(kind: TimeFilterKind, period: &BillingPeriod) -> (String, String) {
    match kind {
        TimeFilterKind::DateTime => (rfc3339(period.start), rfc3339(period.end)),
        TimeFilterKind::Date => (period.start_date.to_string(), period.end_date.to_string()),
        TimeFilterKind::DateTimeHour => (
            rfc3339(truncate_to_hour(period.start)),
            rfc3339(truncate_to_hour(period.end)),
        ),
    }
}

fn rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// Hourly datasets reject sub-hour precision; flooring is lossless because
// they roll up by hour anyway.
fn truncate_to_hour(t: DateTime<Utc>) -> DateTime<Utc> {
    t.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

fn render_value(value: &FilterValue) -> String {
    match value {
        FilterValue::Str(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        FilterValue::Int(i) => i.to_string(),
        FilterValue::Bool(b) => b.to_string(),
    }
}
