//! # Capwatch API
//!
//! HTTP surface over the usage engine. Every endpoint except `/health`
//! sits behind a static bearer token; each usage request runs a live sweep
//! against the analytics backend for the current billing period.
//!
//! | Route                  | Purpose                                   |
//! |------------------------|-------------------------------------------|
//! | `GET /health`          | Liveness, unauthenticated                 |
//! | `GET /api/v1/usage`    | Per-metric usage records                  |
//! | `GET /api/v1/usage/summary` | Severity buckets, triggers notifications |
//! | `GET /api/v1/usage/last`    | Cached copy of the latest summary    |
//! | `GET /api/v1/catalog`  | Effective metric catalog                  |

#![warn(missing_docs)]
#![allow(dead_code)]

pub mod middleware;
pub mod models;
pub mod notify;
pub mod routes;

use std::sync::Arc;

use axum::{middleware::from_fn_with_state, routing::get, Router};
use capwatch_engine::{ContractConfig, UsageEngine, UsageSummary};
use chrono_tz::Tz;
use parking_lot::RwLock;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Shared state behind every handler.
pub struct AppState {
    /// Usage engine bound to the metered account.
    pub engine: UsageEngine,
    /// Contract thresholds, caps, and billing anchor.
    pub contract: ContractConfig,
    /// Parsed billing timezone.
    pub tz: Tz,
    /// Zone tags zone-scoped metrics fan out over.
    pub zone_tags: Vec<String>,
    /// Notification fan-out for summaries.
    pub dispatcher: notify::Dispatcher,
    /// Static bearer token; empty disables authentication.
    pub api_token: String,
    /// Most recent summary, served by `GET /api/v1/usage/last`.
    pub last_summary: RwLock<Option<UsageSummary>>,
}

/// Assemble the full router: public health probe, authenticated API,
/// permissive CORS for dashboard frontends, and request tracing.
pub fn build_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/usage", get(routes::get_usage))
        .route("/usage/summary", get(routes::get_summary))
        .route("/usage/last", get(routes::get_last))
        .route("/catalog", get(routes::get_catalog))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_bearer));

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use capwatch_engine::{EngineConfig, QueryError, QueryExecute};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    struct StaticBackend {
        count: f64,
    }

    #[async_trait::async_trait]
    impl QueryExecute for StaticBackend {
        async fn execute(&self, _query: &str, variables: Value) -> Result<Value, QueryError> {
            let nodes = if variables.get("zoneTag").is_some() {
                "zones"
            } else {
                "accounts"
            };
            Ok(json!({ "viewer": { nodes: [ { "series": [ { "count": self.count } ] } ] } }))
        }
    }

    fn state(token: &str) -> Arc<AppState> {
        let config = EngineConfig {
            batch_delay: Duration::ZERO,
            ..EngineConfig::default()
        };
        let engine = UsageEngine::new(Arc::new(StaticBackend { count: 500.0 }), "acct-1", config);
        Arc::new(AppState {
            engine,
            contract: ContractConfig::default(),
            tz: chrono_tz::Tz::UTC,
            zone_tags: vec!["z1".to_string()],
            dispatcher: notify::Dispatcher::new(false),
            api_token: token.to_string(),
            last_summary: RwLock::new(None),
        })
    }

    fn get(path: &str) -> Request<Body> {
        Request::get(path).body(Body::empty()).unwrap()
    }

    fn authed(path: &str, token: &str) -> Request<Body> {
        Request::get(path)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_needs_no_token() {
        let app = build_router(state("secret"));
        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn api_routes_require_the_bearer_token() {
        let app = build_router(state("secret"));

        let denied = app.clone().oneshot(get("/api/v1/catalog")).await.unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(denied).await;
        assert_eq!(body["success"], false);

        let wrong = app
            .clone()
            .oneshot(authed("/api/v1/catalog", "nope"))
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

        let allowed = app
            .oneshot(authed("/api/v1/catalog", "secret"))
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn usage_endpoint_returns_records_for_the_whole_catalog() {
        let app = build_router(state(""));
        let response = app
            .oneshot(get("/api/v1/usage?eyeball_only=true"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        let records = body["data"]["records"].as_array().unwrap();
        assert_eq!(records.len(), 12);
        assert!(body["data"]["period"]["start"].is_string());
    }

    #[tokio::test]
    async fn zone_restriction_suppresses_account_twins() {
        let app = build_router(state(""));
        let response = app.oneshot(get("/api/v1/usage?zone=z1")).await.unwrap();
        let body = body_json(response).await;
        let ids: Vec<&str> = body["data"]["records"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|r| r["metric_id"].as_str())
            .collect();
        assert!(ids.contains(&"zone_requests"));
        assert!(!ids.contains(&"account_requests"));
        assert!(!ids.contains(&"account_bandwidth"));
    }

    #[tokio::test]
    async fn summary_is_cached_for_the_last_endpoint() {
        let app = build_router(state(""));

        let before = app.clone().oneshot(get("/api/v1/usage/last")).await.unwrap();
        let body = body_json(before).await;
        assert_eq!(body["success"], false);

        let summary = app
            .clone()
            .oneshot(get("/api/v1/usage/summary"))
            .await
            .unwrap();
        assert_eq!(summary.status(), StatusCode::OK);
        let body = body_json(summary).await;
        assert_eq!(body["success"], true);
        assert!(body["data"]["summary"]["healthy"].as_array().is_some());

        let after = app.oneshot(get("/api/v1/usage/last")).await.unwrap();
        let body = body_json(after).await;
        assert_eq!(body["success"], true);
    }
}
