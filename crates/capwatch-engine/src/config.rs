//! Engine and contract configuration.
//!
//! Two separate structs on purpose: [`ContractConfig`] is what the account
//! bought (caps, thresholds, billing anchor), [`EngineConfig`] is how the
//! runner behaves (batching, pacing, deadline). Both are plain serializable
//! data handed to the engine's entry points; nothing here is global state.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::catalog::{self, MetricDefinition};
use crate::EngineError;

/// Traffic-dimension switches requested by the caller. Each switch is only
/// applied to datasets that support it; the `zone` restriction narrows zone
/// fan-out to a single zone tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficFilters {
    /// Keep end-user traffic only.
    #[serde(default)]
    pub eyeball_only: bool,
    /// Drop requests terminated by a security rule.
    #[serde(default)]
    pub exclude_blocked: bool,
    /// Drop edge-internal requests that never reached an origin.
    #[serde(default)]
    pub exclude_edge_origin: bool,
    /// Restrict zone-scoped metrics to this single zone tag.
    #[serde(default)]
    pub zone: Option<String>,
}

/// Account-wide metric hidden while a single-zone restriction is active,
/// because its zone-scoped twin already covers the narrowed view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuppressionPair {
    /// Account-scoped metric id to hide.
    pub account_metric: String,
    /// Zone-scoped metric id that stands in for it.
    pub zone_metric: String,
}

fn default_suppression_pairs() -> Vec<SuppressionPair> {
    vec![
        SuppressionPair {
            account_metric: "account_requests".to_string(),
            zone_metric: "zone_requests".to_string(),
        },
        SuppressionPair {
            account_metric: "account_bandwidth".to_string(),
            zone_metric: "zone_bandwidth".to_string(),
        },
    ]
}

fn default_alert_threshold() -> f64 {
    90.0
}

fn default_warning_threshold() -> f64 {
    75.0
}

fn default_anchor_day() -> u32 {
    1
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// What the account's contract says: severity thresholds, billing anchor,
/// and per-metric deviations from the built-in catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractConfig {
    /// Utilization percentage at which a metric is escalated to alert.
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: f64,
    /// Utilization percentage at which a metric becomes a warning.
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: f64,
    /// Day of month (1-28) the billing period starts on.
    #[serde(default = "default_anchor_day")]
    pub anchor_day: u32,
    /// IANA timezone the billing anchor is interpreted in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Contract caps overriding catalog defaults, keyed by metric id.
    #[serde(default)]
    pub limit_overrides: BTreeMap<String, f64>,
    /// Metric ids the contract does not include.
    #[serde(default)]
    pub disabled_metrics: Vec<String>,
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            alert_threshold: default_alert_threshold(),
            warning_threshold: default_warning_threshold(),
            anchor_day: default_anchor_day(),
            timezone: default_timezone(),
            limit_overrides: BTreeMap::new(),
            disabled_metrics: Vec::new(),
        }
    }
}

impl ContractConfig {
    /// Built-in catalog with this contract's overrides applied.
    pub fn effective_catalog(&self) -> Vec<MetricDefinition> {
        let mut metrics = catalog::default_catalog();
        for def in &mut metrics {
            if let Some(limit) = self.limit_overrides.get(&def.id) {
                def.limit = *limit;
            }
            if self.disabled_metrics.iter().any(|id| *id == def.id) {
                def.enabled = false;
            }
        }
        metrics
    }

    /// Parsed billing timezone.
    pub fn billing_timezone(&self) -> Result<Tz, EngineError> {
        Tz::from_str(&self.timezone).map_err(|_| EngineError::Timezone(self.timezone.clone()))
    }
}

/// Runner behavior: how many queries fly at once, how batches are paced,
/// and how long a full sweep may take.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum metric queries in flight at once.
    pub batch_size: usize,
    /// Pause between consecutive batches. Not applied after the last one.
    pub batch_delay: Duration,
    /// Overall deadline for a sweep. `None` waits for every query.
    pub deadline: Option<Duration>,
    /// Confidence level requested from sampled datasets, e.g. 0.95.
    pub confidence_level: f64,
    /// Row limit per query. The backend truncates beyond this.
    pub query_limit: u32,
    /// Account-wide metrics to hide when a single-zone view is requested.
    pub suppression_pairs: Vec<SuppressionPair>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            batch_delay: Duration::from_millis(300),
            deadline: None,
            confidence_level: 0.95,
            query_limit: 10_000,
            suppression_pairs: default_suppression_pairs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_overrides_apply() {
        let mut contract = ContractConfig::default();
        contract.limit_overrides.insert("zone_requests".to_string(), 42.0);
        contract.disabled_metrics.push("page_views".to_string());

        let metrics = contract.effective_catalog();
        let requests = metrics.iter().find(|m| m.id == "zone_requests").unwrap();
        assert_eq!(requests.limit, 42.0);
        let views = metrics.iter().find(|m| m.id == "page_views").unwrap();
        assert!(!views.enabled);
        // Untouched entries keep their catalog defaults.
        let dns = metrics.iter().find(|m| m.id == "dns_queries").unwrap();
        assert!(dns.enabled);
        assert_eq!(dns.limit, 30_000_000.0);
    }

    #[test]
    fn default_suppression_pairs_cover_the_account_twins() {
        let engine = EngineConfig::default();
        let accounts: Vec<&str> = engine
            .suppression_pairs
            .iter()
            .map(|p| p.account_metric.as_str())
            .collect();
        assert_eq!(accounts, vec!["account_requests", "account_bandwidth"]);
    }

    #[test]
    fn timezone_parses_or_errors() {
        let contract = ContractConfig {
            timezone: "America/New_York".to_string(),
            ..ContractConfig::default()
        };
        assert_eq!(contract.billing_timezone().unwrap(), chrono_tz::America::New_York);

        let bad = ContractConfig {
            timezone: "Mars/Olympus".to_string(),
            ..ContractConfig::default()
        };
        assert!(bad.billing_timezone().is_err());
    }

    #[test]
    fn engine_defaults_are_sane() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.batch_size, 5);
        assert!(cfg.deadline.is_none());
        assert!(cfg.confidence_level > 0.0 && cfg.confidence_level < 1.0);
    }
}
