//! Zone discovery.
//!
//! Zone-scoped metrics fan out over the account's zone tags. Deployments
//! can pin the list in configuration; otherwise this client walks the
//! backend's paginated zone listing at startup.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::client::QueryError;

const PAGE_SIZE: u32 = 50;

/// One zone as the backend lists it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneEntry {
    /// Opaque zone tag used in analytics queries.
    pub id: String,
    /// Zone name, e.g. `example.com`.
    pub name: String,
    /// Lifecycle status, e.g. `active` or `pending`.
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct ZonePage {
    result: Vec<ZoneEntry>,
    result_info: PageInfo,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    page: u32,
    total_pages: u32,
}

/// REST client for the backend's zone listing.
pub struct ZoneDirectory {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

impl ZoneDirectory {
    /// Build a directory client against `api_base` (no trailing slash
    /// needed) with a bearer `token`.
    pub fn new(api_base: impl Into<String>, token: impl Into<String>) -> Result<Self, QueryError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    /// All zones on the account, walking every page.
    pub async fn list_zones(&self) -> Result<Vec<ZoneEntry>, QueryError> {
        let mut zones = Vec::new();
        let mut page = 1u32;
        loop {
            let url = format!(
                "{}/zones?page={}&per_page={}",
                self.api_base, page, PAGE_SIZE
            );
            let response = self.http.get(&url).bearer_auth(&self.token).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(QueryError::Status(status.as_u16()));
            }
            let body: ZonePage = response.json().await?;
            debug!(
                page = body.result_info.page,
                total_pages = body.result_info.total_pages,
                zones = body.result.len(),
                "fetched zone page"
            );
            zones.extend(body.result);
            if page >= body.result_info.total_pages {
                break;
            }
            page += 1;
        }
        Ok(zones)
    }

    /// Zone tags only, in listing order.
    pub async fn list_zone_tags(&self) -> Result<Vec<String>, QueryError> {
        Ok(self
            .list_zones()
            .await?
            .into_iter()
            .map(|zone| zone.id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_pages_deserialize() {
        let page: ZonePage = serde_json::from_str(
            r#"{
                "result": [
                    { "id": "023e105f4ecef8ad9ca31a8372d0c353", "name": "example.com", "status": "active" },
                    { "id": "9a7806061c88ada191ed06f989cc3dac", "name": "example.org" }
                ],
                "result_info": { "page": 1, "total_pages": 3 }
            }"#,
        )
        .unwrap();
        assert_eq!(page.result.len(), 2);
        assert_eq!(page.result[0].name, "example.com");
        // Status is optional in older API versions.
        assert_eq!(page.result[1].status, "");
        assert_eq!(page.result_info.total_pages, 3);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let dir = ZoneDirectory::new("https://api.example.com/client/v4/", "token").unwrap();
        assert_eq!(dir.api_base, "https://api.example.com/client/v4");
    }
}
