//! HTTP handlers.
//!
//! Each usage request runs a fresh sweep against the analytics backend for
//! the current billing period; nothing is read from storage. Handlers never
//! fail: sweep problems are embedded in the records themselves and the
//! envelope stays `success: true` as long as the request was serviceable.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use tracing::info;

use capwatch_engine::{categorize, current_billing_period, MetricDefinition, UsageSummary};

use crate::models::{ApiResponse, SummaryPayload, UsagePayload, UsageQueryParams};
use crate::AppState;

/// `GET /api/v1/usage` - per-metric records for the current billing period.
pub async fn get_usage(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UsageQueryParams>,
) -> Json<ApiResponse<UsagePayload>> {
    let filters = params.filters();
    let period = current_billing_period(state.contract.anchor_day, state.tz, Utc::now());
    let metrics = state.contract.effective_catalog();
    let records = if params.include_disabled {
        state
            .engine
            .query_all_configured(&metrics, &state.zone_tags, &period, &filters)
            .await
    } else {
        state
            .engine
            .query_all_enabled(&metrics, &state.zone_tags, &period, &filters)
            .await
    };
    info!(records = records.len(), period = %period, "usage sweep served");
    Json(ApiResponse::success(UsagePayload { period, records }))
}

/// `GET /api/v1/usage/summary` - severity-bucketed sweep. Dispatches
/// notifications when the summary warrants them, then caches it for
/// `GET /api/v1/usage/last`.
pub async fn get_summary(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UsageQueryParams>,
) -> Json<ApiResponse<SummaryPayload>> {
    let filters = params.filters();
    let period = current_billing_period(state.contract.anchor_day, state.tz, Utc::now());
    let metrics = state.contract.effective_catalog();
    let records = state
        .engine
        .query_all_enabled(&metrics, &state.zone_tags, &period, &filters)
        .await;
    let summary = categorize(
        records,
        state.contract.alert_threshold,
        state.contract.warning_threshold,
    );
    let delivered = state.dispatcher.dispatch(&summary).await;
    info!(
        alerts = summary.alerts.len(),
        warnings = summary.warnings.len(),
        errors = summary.errors.len(),
        notified = delivered,
        "summary served"
    );
    *state.last_summary.write() = Some(summary.clone());
    Json(ApiResponse::success(SummaryPayload { period, summary }))
}

/// `GET /api/v1/usage/last` - the most recent summary without re-querying.
pub async fn get_last(
    State(state): State<Arc<AppState>>,
) -> Json<ApiResponse<UsageSummary>> {
    match state.last_summary.read().clone() {
        Some(summary) => Json(ApiResponse::success(summary)),
        None => Json(ApiResponse::error("no summary computed yet")),
    }
}

/// `GET /api/v1/catalog` - the effective metric catalog for this contract.
pub async fn get_catalog(
    State(state): State<Arc<AppState>>,
) -> Json<ApiResponse<Vec<MetricDefinition>>> {
    Json(ApiResponse::success(state.contract.effective_catalog()))
}
