//! Usage aggregation engine.
//!
//! One sweep turns a list of metric definitions into a list of usage
//! records, in the same order. Zone-scoped metrics fan out across the
//! account's zone tags and merge best-effort; metrics run in fixed-size
//! batches with a pause between them so a sweep never stampedes the
//! backend. Failures of any shape become error records rather than
//! escaping: the caller always gets one record per queried metric.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tokio::time::{sleep, timeout_at, Instant as TokioInstant};
use tracing::{debug, warn};

use crate::catalog::{MetricDefinition, Scope};
use crate::client::{QueryError, QueryExecute};
use crate::config::{EngineConfig, TrafficFilters};
use crate::confidence;
use crate::normalize::{self, PartitionUsage, UsageRecord};
use crate::period::BillingPeriod;
use crate::query;

/// Aggregates current usage for a set of metrics against one account.
pub struct UsageEngine {
    client: Arc<dyn QueryExecute>,
    account_tag: String,
    config: EngineConfig,
}

impl UsageEngine {
    /// Build an engine around a query executor and the account it meters.
    pub fn new(
        client: Arc<dyn QueryExecute>,
        account_tag: impl Into<String>,
        config: EngineConfig,
    ) -> Self {
        Self {
            client,
            account_tag: account_tag.into(),
            config,
        }
    }

    /// Sweep the enabled metrics. Disabled metrics are skipped entirely;
    /// account-wide metrics with a zone-scoped twin are hidden while a
    /// single-zone restriction is active. Records come back in the input
    /// order of the metrics that actually ran.
    pub async fn query_all_enabled(
        &self,
        metrics: &[MetricDefinition],
        zone_tags: &[String],
        period: &BillingPeriod,
        filters: &TrafficFilters,
    ) -> Vec<UsageRecord> {
        let selected: Vec<&MetricDefinition> = metrics
            .iter()
            .filter(|def| def.enabled && !self.is_suppressed(def, filters))
            .collect();
        self.run_batched(&selected, zone_tags, period, filters).await
    }

    /// Sweep every configured metric. Enabled metrics are queried; disabled
    /// ones come back as zeroed placeholders so dashboards can render the
    /// full catalog. Input order is preserved.
    pub async fn query_all_configured(
        &self,
        metrics: &[MetricDefinition],
        zone_tags: &[String],
        period: &BillingPeriod,
        filters: &TrafficFilters,
    ) -> Vec<UsageRecord> {
        let queried: Vec<&MetricDefinition> = metrics
            .iter()
            .filter(|def| def.enabled && !self.is_suppressed(def, filters))
            .collect();
        let mut results = self
            .run_batched(&queried, zone_tags, period, filters)
            .await
            .into_iter();

        let mut records = Vec::with_capacity(metrics.len());
        for def in metrics {
            if self.is_suppressed(def, filters) {
                continue;
            } else if !def.enabled {
                records.push(normalize::placeholder_record(def));
            } else if let Some(record) = results.next() {
                records.push(record);
            }
        }
        records
    }

    fn is_suppressed(&self, def: &MetricDefinition, filters: &TrafficFilters) -> bool {
        filters.zone.is_some()
            && self
                .config
                .suppression_pairs
                .iter()
                .any(|pair| pair.account_metric == def.id)
    }

    /// Run the selected metrics in batches of `batch_size`, pausing between
    /// batches and honoring the sweep deadline if one is configured. Output
    /// order matches `metrics`; metrics left unresolved when the deadline
    /// fires report a deadline error.
    async fn run_batched(
        &self,
        metrics: &[&MetricDefinition],
        zone_tags: &[String],
        period: &BillingPeriod,
        filters: &TrafficFilters,
    ) -> Vec<UsageRecord> {
        let batch_size = self.config.batch_size.max(1);
        let total_batches = (metrics.len() + batch_size - 1) / batch_size;
        let deadline = self.config.deadline.map(|d| TokioInstant::now() + d);
        debug!(
            metrics = metrics.len(),
            batches = total_batches,
            period = %period,
            "starting usage sweep"
        );

        let mut records = Vec::with_capacity(metrics.len());
        for (index, batch) in metrics.chunks(batch_size).enumerate() {
            if let Some(at) = deadline {
                if TokioInstant::now() >= at {
                    break;
                }
            }
            let queries = join_all(
                batch
                    .iter()
                    .map(|def| self.query_metric(def, zone_tags, period, filters)),
            );
            let outcome = match deadline {
                Some(at) => timeout_at(at, queries).await,
                None => Ok(queries.await),
            };
            match outcome {
                Ok(batch_records) => records.extend(batch_records),
                Err(_) => {
                    warn!(
                        batch = index + 1,
                        total_batches, "sweep deadline exceeded, abandoning in-flight queries"
                    );
                    break;
                }
            }
            if index + 1 < total_batches {
                sleep(self.config.batch_delay).await;
            }
        }

        for def in &metrics[records.len()..] {
            records.push(normalize::error_record(def, "Deadline exceeded".to_string(), 0));
        }
        records
    }

    /// Resolve one metric to a record. Never returns an error; failures are
    /// folded into the record itself.
    async fn query_metric(
        &self,
        def: &MetricDefinition,
        zone_tags: &[String],
        period: &BillingPeriod,
        filters: &TrafficFilters,
    ) -> UsageRecord {
        let started = Instant::now();
        if let Err(err) = def.validate() {
            return normalize::error_record(def, err.to_string(), elapsed_ms(started));
        }
        match def.scope {
            Scope::Account => {
                let built = query::build_query(def, &self.account_tag, period, filters, &self.config);
                match self.client.execute(&built.text, built.variables).await {
                    Ok(data) => {
                        let usage = normalize::extract_usage(def, &data);
                        normalize::finalize_record(
                            def,
                            usage.value,
                            usage.confidence,
                            elapsed_ms(started),
                        )
                    }
                    Err(err) => {
                        warn!(metric = %def.id, error = %err, "account query failed");
                        normalize::error_record(def, err.to_string(), elapsed_ms(started))
                    }
                }
            }
            Scope::Zone => {
                self.query_zone_metric(def, zone_tags, period, filters, started)
                    .await
            }
        }
    }

    /// Fan a zone-scoped metric out across the zone tags and merge what
    /// comes back. A failed zone logs and contributes zero; the record only
    /// turns into an error when every zone failed, or none were configured.
    async fn query_zone_metric(
        &self,
        def: &MetricDefinition,
        zone_tags: &[String],
        period: &BillingPeriod,
        filters: &TrafficFilters,
        started: Instant,
    ) -> UsageRecord {
        let selected: Vec<&str> = match &filters.zone {
            Some(tag) => vec![tag.as_str()],
            None => zone_tags.iter().map(String::as_str).collect(),
        };
        if selected.is_empty() {
            return normalize::error_record(
                def,
                "No zone tags configured".to_string(),
                elapsed_ms(started),
            );
        }

        let partitions = join_all(
            selected
                .iter()
                .map(|tag| self.zone_partition(def, tag, period, filters)),
        )
        .await;

        let mut value = 0.0;
        let mut intervals = Vec::new();
        let mut failures = Vec::new();
        for (tag, outcome) in selected.iter().zip(partitions) {
            match outcome {
                Ok(partition) => {
                    value += partition.value;
                    if let Some(interval) = partition.confidence {
                        intervals.push(interval);
                    }
                }
                Err(err) => {
                    warn!(metric = %def.id, zone = %tag, error = %err, "zone query failed, continuing without it");
                    failures.push(err.to_string());
                }
            }
        }

        if failures.len() == selected.len() {
            let first = failures.first().cloned().unwrap_or_default();
            return normalize::error_record(
                def,
                format!("all {} zone queries failed: {}", failures.len(), first),
                elapsed_ms(started),
            );
        }
        normalize::finalize_record(def, value, confidence::combine(&intervals), elapsed_ms(started))
    }

    async fn zone_partition(
        &self,
        def: &MetricDefinition,
        zone_tag: &str,
        period: &BillingPeriod,
        filters: &TrafficFilters,
    ) -> Result<PartitionUsage, QueryError> {
        let built = query::build_query(def, zone_tag, period, filters, &self.config);
        let data = self.client.execute(&built.text, built.variables).await?;
        Ok(normalize::extract_usage(def, &data))
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
