//! Capwatch API service.
//!
//! Wires the usage engine to its HTTP surface: loads configuration from the
//! environment, discovers zone tags when none are pinned, registers the
//! configured notification providers, and serves the router.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use capwatch_api::{build_router, notify, AppState};
use capwatch_engine::{
    AnalyticsClient, ContractConfig, EngineConfig, UsageEngine, ZoneDirectory,
};

struct ServiceConfig {
    bind: String,
    api_token: String,
    backend_base: String,
    backend_token: String,
    account_tag: String,
    zone_tags: Option<Vec<String>>,
    contract: ContractConfig,
    engine: EngineConfig,
    notify_on_warnings: bool,
    slack_webhook: Option<String>,
    discord_webhook: Option<String>,
    alert_webhook: Option<String>,
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn required(name: &str) -> Result<String, String> {
    optional(name).ok_or_else(|| format!("{} is required", name))
}

fn parse_var<T: FromStr>(name: &str) -> Result<Option<T>, String> {
    match optional(name) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| format!("invalid {}: {}", name, raw)),
        None => Ok(None),
    }
}

impl ServiceConfig {
    fn from_env() -> Result<Self, String> {
        let mut contract = ContractConfig::default();
        if let Some(v) = parse_var::<f64>("CAPWATCH_ALERT_THRESHOLD")? {
            contract.alert_threshold = v;
        }
        if let Some(v) = parse_var::<f64>("CAPWATCH_WARNING_THRESHOLD")? {
            contract.warning_threshold = v;
        }
        if let Some(v) = parse_var::<u32>("CAPWATCH_ANCHOR_DAY")? {
            contract.anchor_day = v;
        }
        if let Some(v) = optional("CAPWATCH_TIMEZONE") {
            contract.timezone = v;
        }

        let mut engine = EngineConfig::default();
        if let Some(v) = parse_var::<usize>("CAPWATCH_BATCH_SIZE")? {
            engine.batch_size = v;
        }
        if let Some(v) = parse_var::<u64>("CAPWATCH_BATCH_DELAY_MS")? {
            engine.batch_delay = Duration::from_millis(v);
        }
        if let Some(v) = parse_var::<u64>("CAPWATCH_DEADLINE_MS")? {
            engine.deadline = Some(Duration::from_millis(v));
        }

        Ok(Self {
            bind: optional("CAPWATCH_BIND").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            api_token: optional("CAPWATCH_API_TOKEN").unwrap_or_default(),
            backend_base: required("CAPWATCH_BACKEND_URL")?
                .trim_end_matches('/')
                .to_string(),
            backend_token: required("CAPWATCH_BACKEND_TOKEN")?,
            account_tag: required("CAPWATCH_ACCOUNT_TAG")?,
            zone_tags: optional("CAPWATCH_ZONE_TAGS").map(|raw| {
                raw.split(',')
                    .map(|tag| tag.trim().to_string())
                    .filter(|tag| !tag.is_empty())
                    .collect()
            }),
            contract,
            engine,
            notify_on_warnings: optional("CAPWATCH_NOTIFY_ON_WARNINGS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            slack_webhook: optional("CAPWATCH_SLACK_WEBHOOK"),
            discord_webhook: optional("CAPWATCH_DISCORD_WEBHOOK"),
            alert_webhook: optional("CAPWATCH_ALERT_WEBHOOK"),
        })
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "configuration error");
            std::process::exit(1);
        }
    };
    if config.api_token.is_empty() {
        warn!("CAPWATCH_API_TOKEN not set; API authentication is disabled");
    }

    let tz = match config.contract.billing_timezone() {
        Ok(tz) => tz,
        Err(err) => {
            error!(error = %err, "configuration error");
            std::process::exit(1);
        }
    };

    let client = match AnalyticsClient::new(
        format!("{}/graphql", config.backend_base),
        config.backend_token.clone(),
    ) {
        Ok(client) => Arc::new(client),
        Err(err) => {
            error!(error = %err, "failed to build analytics client");
            std::process::exit(1);
        }
    };
    let engine = UsageEngine::new(client, config.account_tag.clone(), config.engine.clone());

    let zone_tags = match &config.zone_tags {
        Some(tags) => {
            info!(zones = tags.len(), "using pinned zone tags");
            tags.clone()
        }
        None => discover_zones(&config).await,
    };

    let mut dispatcher = notify::Dispatcher::new(config.notify_on_warnings);
    if let Some(url) = &config.slack_webhook {
        match notify::SlackNotifier::new(url.clone()) {
            Ok(provider) => dispatcher.add_provider(Box::new(provider)),
            Err(err) => warn!(error = %err, "skipping slack notifier"),
        }
    }
    if let Some(url) = &config.discord_webhook {
        match notify::DiscordNotifier::new(url.clone()) {
            Ok(provider) => dispatcher.add_provider(Box::new(provider)),
            Err(err) => warn!(error = %err, "skipping discord notifier"),
        }
    }
    if let Some(url) = &config.alert_webhook {
        match notify::WebhookNotifier::new(url.clone()) {
            Ok(provider) => dispatcher.add_provider(Box::new(provider)),
            Err(err) => warn!(error = %err, "skipping alert webhook"),
        }
    }
    info!(
        providers = dispatcher.provider_count(),
        "notification providers ready"
    );

    let state = Arc::new(AppState {
        engine,
        contract: config.contract.clone(),
        tz,
        zone_tags,
        dispatcher,
        api_token: config.api_token.clone(),
        last_summary: RwLock::new(None),
    });
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind).await.unwrap();
    info!("Capwatch API listening on {}", config.bind);
    axum::serve(listener, app).await.unwrap();
}

async fn discover_zones(config: &ServiceConfig) -> Vec<String> {
    let directory = match ZoneDirectory::new(
        config.backend_base.clone(),
        config.backend_token.clone(),
    ) {
        Ok(directory) => directory,
        Err(err) => {
            warn!(error = %err, "failed to build zone directory");
            return Vec::new();
        }
    };
    match directory.list_zone_tags().await {
        Ok(tags) => {
            info!(zones = tags.len(), "discovered zone tags");
            tags
        }
        Err(err) => {
            warn!(error = %err, "zone discovery failed; zone-scoped metrics will report errors");
            Vec::new()
        }
    }
}
