//! Analytics backend client.
//!
//! [`QueryExecute`] is the engine's only I/O seam: everything above it deals
//! in query text and JSON values, which keeps the whole pipeline testable
//! against a canned executor. [`AnalyticsClient`] is the production
//! implementation speaking the backend's GraphQL protocol over HTTPS.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Failures while executing a query. The display strings end up verbatim in
/// `UsageRecord::error`, so they carry enough to diagnose without a debugger.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Connection, TLS, or timeout failure below the protocol.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx HTTP response.
    #[error("backend returned HTTP {0}")]
    Status(u16),

    /// 2xx response whose body reports query errors.
    #[error("backend error: {0}")]
    Backend(String),

    /// 2xx response that does not look like a query result at all.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Executes one analytics query and returns the `data` payload.
#[async_trait]
pub trait QueryExecute: Send + Sync {
    /// Run `query` with `variables` and return the response `data` value.
    async fn execute(&self, query: &str, variables: Value) -> Result<Value, QueryError>;
}

/// GraphQL client for the analytics backend.
pub struct AnalyticsClient {
    http: reqwest::Client,
    endpoint: String,
    token: String,
}

impl AnalyticsClient {
    /// Build a client for `endpoint` authenticating with a bearer `token`.
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Result<Self, QueryError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            token: token.into(),
        })
    }
}

#[async_trait]
impl QueryExecute for AnalyticsClient {
    async fn execute(&self, query: &str, variables: Value) -> Result<Value, QueryError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(QueryError::Status(status.as_u16()));
        }

        let body: Value = response.json().await?;
        if let Some(errors) = body.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                let joined = errors
                    .iter()
                    .filter_map(|e| e.get("message").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("; ");
                let message = if joined.is_empty() {
                    format!("{} unlabeled errors", errors.len())
                } else {
                    joined
                };
                return Err(QueryError::Backend(message));
            }
        }
        body.get("data")
            .filter(|data| !data.is_null())
            .cloned()
            .ok_or_else(|| QueryError::Malformed("missing data field".to_string()))
    }
}
