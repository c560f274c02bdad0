//! Notification delivery.
//!
//! A [`Dispatcher`] fans a usage summary out to the configured providers
//! when it contains alerts (and optionally warnings). Providers are
//! independent: one failing delivery is logged and never blocks the others,
//! and delivery failures never propagate back into the sweep.

use async_trait::async_trait;
use capwatch_engine::{UsageRecord, UsageSummary};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Failures while delivering one notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Connection, TLS, or timeout failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Provider answered with a non-2xx status.
    #[error("provider returned HTTP {0}")]
    Status(u16),
}

/// One delivery target for usage summaries.
#[async_trait]
pub trait Notify: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &'static str;

    /// Deliver `summary` to the provider.
    async fn send(&self, summary: &UsageSummary) -> Result<(), NotifyError>;
}

fn http_client() -> Result<reqwest::Client, NotifyError> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?)
}

async fn post_json(
    http: &reqwest::Client,
    url: &str,
    payload: &Value,
) -> Result<(), NotifyError> {
    let response = http.post(url).json(payload).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(NotifyError::Status(status.as_u16()));
    }
    Ok(())
}

/// One-line description of how bad the summary is.
fn headline(summary: &UsageSummary) -> String {
    let mut parts = Vec::new();
    if !summary.alerts.is_empty() {
        parts.push(format!("{} over alert threshold", summary.alerts.len()));
    }
    if !summary.warnings.is_empty() {
        parts.push(format!("{} approaching cap", summary.warnings.len()));
    }
    if !summary.errors.is_empty() {
        parts.push(format!("{} unreadable", summary.errors.len()));
    }
    if parts.is_empty() {
        return "All metrics healthy".to_string();
    }
    format!("Usage check: {}", parts.join(", "))
}

fn record_line(record: &UsageRecord) -> String {
    format!(
        "{}: {:.1}% of cap ({:.1} / {:.1})",
        record.name, record.percent_used, record.current_usage, record.limit
    )
}

fn bucket_lines(records: &[UsageRecord]) -> String {
    records
        .iter()
        .map(record_line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Incoming-webhook notifier for Slack.
pub struct SlackNotifier {
    http: reqwest::Client,
    webhook_url: String,
}

impl SlackNotifier {
    /// Notifier posting to a Slack incoming-webhook URL.
    pub fn new(webhook_url: impl Into<String>) -> Result<Self, NotifyError> {
        Ok(Self {
            http: http_client()?,
            webhook_url: webhook_url.into(),
        })
    }
}

pub(crate) fn slack_payload(summary: &UsageSummary) -> Value {
    let mut blocks = vec![json!({
        "type": "header",
        "text": { "type": "plain_text", "text": headline(summary) }
    })];
    for (label, records) in [
        ("Alerts", &summary.alerts),
        ("Warnings", &summary.warnings),
        ("Errors", &summary.errors),
    ] {
        if records.is_empty() {
            continue;
        }
        let body = if label == "Errors" {
            records
                .iter()
                .map(|r| {
                    format!(
                        "{}: {}",
                        r.name,
                        r.error.as_deref().unwrap_or("unknown failure")
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            bucket_lines(records)
        };
        blocks.push(json!({
            "type": "section",
            "text": { "type": "mrkdwn", "text": format!("*{}*\n{}", label, body) }
        }));
    }
    json!({ "text": headline(summary), "blocks": blocks })
}

#[async_trait]
impl Notify for SlackNotifier {
    fn name(&self) -> &'static str {
        "slack"
    }

    async fn send(&self, summary: &UsageSummary) -> Result<(), NotifyError> {
        post_json(&self.http, &self.webhook_url, &slack_payload(summary)).await
    }
}

/// Webhook notifier for Discord.
pub struct DiscordNotifier {
    http: reqwest::Client,
    webhook_url: String,
}

impl DiscordNotifier {
    /// Notifier posting to a Discord webhook URL.
    pub fn new(webhook_url: impl Into<String>) -> Result<Self, NotifyError> {
        Ok(Self {
            http: http_client()?,
            webhook_url: webhook_url.into(),
        })
    }
}

const DISCORD_RED: u32 = 0x00E7_4C3C;
const DISCORD_AMBER: u32 = 0x00FF_A500;
const DISCORD_GREEN: u32 = 0x002E_CC71;

pub(crate) fn discord_payload(summary: &UsageSummary) -> Value {
    let color = if summary.has_alerts() {
        DISCORD_RED
    } else if summary.has_warnings() {
        DISCORD_AMBER
    } else {
        DISCORD_GREEN
    };
    // Discord caps an embed at 25 fields.
    let fields: Vec<Value> = summary
        .alerts
        .iter()
        .chain(summary.warnings.iter())
        .take(25)
        .map(|r| {
            json!({
                "name": r.name,
                "value": record_line(r),
                "inline": false
            })
        })
        .collect();
    json!({
        "embeds": [{
            "title": headline(summary),
            "color": color,
            "fields": fields
        }]
    })
}

#[async_trait]
impl Notify for DiscordNotifier {
    fn name(&self) -> &'static str {
        "discord"
    }

    async fn send(&self, summary: &UsageSummary) -> Result<(), NotifyError> {
        post_json(&self.http, &self.webhook_url, &discord_payload(summary)).await
    }
}

/// Plain JSON webhook for downstream automation.
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    /// Notifier posting the raw summary to any HTTP endpoint.
    pub fn new(url: impl Into<String>) -> Result<Self, NotifyError> {
        Ok(Self {
            http: http_client()?,
            url: url.into(),
        })
    }
}

pub(crate) fn webhook_payload(summary: &UsageSummary) -> Value {
    json!({
        "event_id": Uuid::new_v4(),
        "event_type": "usage_summary",
        "timestamp": summary.timestamp,
        "headline": headline(summary),
        "summary": summary,
    })
}

#[async_trait]
impl Notify for WebhookNotifier {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, summary: &UsageSummary) -> Result<(), NotifyError> {
        post_json(&self.http, &self.url, &webhook_payload(summary)).await
    }
}

/// Fans summaries out to every configured provider.
pub struct Dispatcher {
    providers: Vec<Box<dyn Notify>>,
    notify_on_warnings: bool,
}

impl Dispatcher {
    /// Empty dispatcher. `notify_on_warnings` also triggers deliveries for
    /// warning-only summaries.
    pub fn new(notify_on_warnings: bool) -> Self {
        Self {
            providers: Vec::new(),
            notify_on_warnings,
        }
    }

    /// Register a provider.
    pub fn add_provider(&mut self, provider: Box<dyn Notify>) {
        self.providers.push(provider);
    }

    /// Number of registered providers.
    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Deliver `summary` if it warrants a notification. Returns how many
    /// providers accepted it.
    pub async fn dispatch(&self, summary: &UsageSummary) -> usize {
        let warranted =
            summary.has_alerts() || (self.notify_on_warnings && summary.has_warnings());
        if !warranted || self.providers.is_empty() {
            debug!("summary does not warrant notifications");
            return 0;
        }
        let mut delivered = 0;
        for provider in &self.providers {
            match provider.send(summary).await {
                Ok(()) => {
                    info!(provider = provider.name(), "notification delivered");
                    delivered += 1;
                }
                Err(err) => {
                    warn!(provider = provider.name(), error = %err, "notification failed");
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capwatch_engine::{categorize, Scope};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn record(id: &str, percent: f64, error: Option<&str>) -> UsageRecord {
        UsageRecord {
            metric_id: id.to_string(),
            name: id.to_string(),
            current_usage: percent,
            limit: 100.0,
            percent_used: percent,
            scope: Scope::Zone,
            unlimited: false,
            enabled: true,
            confidence: None,
            error: error.map(str::to_string),
            query_duration_ms: 1,
        }
    }

    fn summary(percents: &[f64]) -> UsageSummary {
        let records = percents
            .iter()
            .enumerate()
            .map(|(i, p)| record(&format!("m{}", i), *p, None))
            .collect();
        categorize(records, 90.0, 75.0)
    }

    struct MockProvider {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl Notify for MockProvider {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn send(&self, _summary: &UsageSummary) -> Result<(), NotifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(NotifyError::Status(500))
            } else {
                Ok(())
            }
        }
    }

    fn provider(calls: &Arc<AtomicUsize>, fail: bool) -> Box<dyn Notify> {
        Box::new(MockProvider {
            calls: calls.clone(),
            fail,
        })
    }

    #[tokio::test]
    async fn quiet_summaries_are_not_dispatched() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = Dispatcher::new(true);
        dispatcher.add_provider(provider(&calls, false));

        let delivered = dispatcher.dispatch(&summary(&[10.0, 20.0])).await;
        assert_eq!(delivered, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn one_failing_provider_does_not_block_the_rest() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = Dispatcher::new(false);
        dispatcher.add_provider(provider(&calls, true));
        dispatcher.add_provider(provider(&calls, false));

        let delivered = dispatcher.dispatch(&summary(&[95.0])).await;
        assert_eq!(delivered, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn warnings_only_respect_the_flag() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut muted = Dispatcher::new(false);
        muted.add_provider(provider(&calls, false));
        assert_eq!(muted.dispatch(&summary(&[80.0])).await, 0);

        let mut chatty = Dispatcher::new(true);
        chatty.add_provider(provider(&calls, false));
        assert_eq!(chatty.dispatch(&summary(&[80.0])).await, 1);
    }

    #[test]
    fn headline_counts_buckets() {
        let mut s = summary(&[95.0, 96.0, 80.0]);
        s.errors.push(record("broken", 0.0, Some("HTTP 502")));
        assert_eq!(
            headline(&s),
            "Usage check: 2 over alert threshold, 1 approaching cap, 1 unreadable"
        );
        assert_eq!(headline(&summary(&[5.0])), "All metrics healthy");
    }

    #[test]
    fn slack_payload_sections_follow_the_buckets() {
        let payload = slack_payload(&summary(&[95.0, 80.0]));
        let blocks = payload["blocks"].as_array().unwrap();
        // Header, alerts section, warnings section.
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0]["type"], "header");
        let alerts_text = blocks[1]["text"]["text"].as_str().unwrap();
        assert!(alerts_text.starts_with("*Alerts*"));
        assert!(alerts_text.contains("95.0% of cap"));
    }

    #[test]
    fn discord_color_tracks_severity() {
        assert_eq!(
            discord_payload(&summary(&[95.0]))["embeds"][0]["color"],
            DISCORD_RED
        );
        assert_eq!(
            discord_payload(&summary(&[80.0]))["embeds"][0]["color"],
            DISCORD_AMBER
        );
        assert_eq!(
            discord_payload(&summary(&[10.0]))["embeds"][0]["color"],
            DISCORD_GREEN
        );
    }

    #[test]
    fn webhook_payload_embeds_the_summary() {
        let payload = webhook_payload(&summary(&[95.0]));
        assert_eq!(payload["event_type"], "usage_summary");
        assert!(payload["event_id"].as_str().is_some());
        assert_eq!(payload["summary"]["alerts"][0]["percent_used"], 95.0);
    }
}
