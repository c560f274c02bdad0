//! API request and response models.

use capwatch_engine::{BillingPeriod, TrafficFilters, UsageRecord, UsageSummary};
use serde::{Deserialize, Serialize};

/// Uniform response envelope for every endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the request was served.
    pub success: bool,
    /// Payload when `success` is true.
    pub data: Option<T>,
    /// Human-readable reason when `success` is false.
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Successful envelope around `data`.
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Failed envelope with a reason.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Query-string parameters accepted by the usage endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct UsageQueryParams {
    /// Restrict zone-scoped metrics to this zone tag.
    pub zone: Option<String>,
    /// Keep end-user traffic only.
    #[serde(default)]
    pub eyeball_only: bool,
    /// Drop requests terminated by a security rule.
    #[serde(default)]
    pub exclude_blocked: bool,
    /// Drop edge-internal requests that never reached an origin.
    #[serde(default)]
    pub exclude_edge_origin: bool,
    /// Also return disabled metrics as zeroed placeholders.
    #[serde(default)]
    pub include_disabled: bool,
}

impl UsageQueryParams {
    /// Engine-level filters for this request.
    pub fn filters(&self) -> TrafficFilters {
        TrafficFilters {
            eyeball_only: self.eyeball_only,
            exclude_blocked: self.exclude_blocked,
            exclude_edge_origin: self.exclude_edge_origin,
            zone: self.zone.clone(),
        }
    }
}

/// Records plus the billing window they were measured over.
#[derive(Debug, Serialize, Deserialize)]
pub struct UsagePayload {
    /// Billing window the sweep covered.
    pub period: BillingPeriod,
    /// One record per queried metric, in catalog order.
    pub records: Vec<UsageRecord>,
}

/// Severity summary plus the billing window it was computed over.
#[derive(Debug, Serialize, Deserialize)]
pub struct SummaryPayload {
    /// Billing window the sweep covered.
    pub period: BillingPeriod,
    /// Records bucketed by severity.
    pub summary: UsageSummary,
}
