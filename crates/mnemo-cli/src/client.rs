//! HTTP client for the daemon's admin API

use std::collections::BTreeMap;
use std::time::Duration;

use mnemo_retention::memory::protection::ProtectionEntry;
use mnemo_retention::memory::types::{ItemId, ItemSnapshot, StorageTier};
use mnemo_retention::metrics::MetricsSnapshot;
use mnemo_retention::optimizer::OptimizationRunReport;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{CliError, CliResult};

/// Admin address the daemon listens on by default
pub const DEFAULT_URL: &str = "http://127.0.0.1:9898";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Body of `DELETE /items/{id}/protection`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnprotectResponse {
    pub item_id: ItemId,
    pub was_protected: bool,
}

/// Body of `GET /owners/{owner}/protected`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectedItems {
    pub owner_id: String,
    pub items: Vec<ItemId>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

pub struct AdminClient {
    base_url: String,
    http: Client,
}

impl AdminClient {
    pub fn new(base_url: &str) -> CliResult<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn metrics(&self) -> CliResult<MetricsSnapshot> {
        let response = self.http.get(self.url("/metrics")).send().await?;
        decode(response).await
    }

    pub async fn distribution(&self, owner: &str) -> CliResult<BTreeMap<StorageTier, usize>> {
        let path = format!("/owners/{owner}/distribution");
        let response = self.http.get(self.url(&path)).send().await?;
        decode(response).await
    }

    /// Run a pass now; `None` covers every owner
    pub async fn optimize(&self, owner: Option<&str>) -> CliResult<OptimizationRunReport> {
        let response = self
            .http
            .post(self.url("/optimize"))
            .json(&json!({ "owner_id": owner }))
            .send()
            .await?;
        decode(response).await
    }

    pub async fn protect(&self, id: ItemId, reason: &str) -> CliResult<ProtectionEntry> {
        let path = format!("/items/{id}/protection");
        let response = self
            .http
            .post(self.url(&path))
            .json(&json!({ "reason": reason }))
            .send()
            .await?;
        decode(response).await
    }

    pub async fn unprotect(&self, id: ItemId) -> CliResult<UnprotectResponse> {
        let path = format!("/items/{id}/protection");
        let response = self.http.delete(self.url(&path)).send().await?;
        decode(response).await
    }

    pub async fn protected(&self, owner: &str) -> CliResult<ProtectedItems> {
        let path = format!("/owners/{owner}/protected");
        let response = self.http.get(self.url(&path)).send().await?;
        decode(response).await
    }

    pub async fn item(&self, id: ItemId) -> CliResult<ItemSnapshot> {
        let path = format!("/items/{id}");
        let response = self.http.get(self.url(&path)).send().await?;
        decode(response).await
    }
}

/// Parse a success body, or turn the daemon's error envelope into a `CliError`
async fn decode<T: DeserializeOwned>(response: Response) -> CliResult<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => Err(CliError(format!(
            "{} ({}): {}",
            status, body.error.kind, body.error.message
        ))),
        Err(_) if text.is_empty() => Err(CliError(format!("Daemon returned {status}"))),
        Err(_) => Err(CliError(format!("Daemon returned {status}: {text}"))),
    }
}
