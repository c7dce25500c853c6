//! HTTP client for the inventory backend.
//!
//! Every request carries the session's bearer token. There is no token
//! refresh and no retry: an expired token surfaces as
//! [`ClientError::Unauthorized`] and the caller decides what to show.

use std::time::Duration;

use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::BackendConfig;
use crate::model::{CapacityMap, DashboardOverview, KeepAliveStatus, Location, SessionSummaryRow};

fn user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    format!("fridge-inventory/{version} ({os}; {arch})")
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend rejected the session token (401 Unauthorized)")]
    Unauthorized,
    #[error("backend responded with {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("backend response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

/// List payloads arrive bare, as `{items}` or as `{data: {items}}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ListEnvelope<T> {
    Bare(Vec<T>),
    Items { items: Vec<T> },
    Nested { data: ItemsOnly<T> },
}

#[derive(Deserialize)]
struct ItemsOnly<T> {
    items: Vec<T>,
}

impl<T> ListEnvelope<T> {
    fn into_items(self) -> Vec<T> {
        match self {
            ListEnvelope::Bare(items) => items,
            ListEnvelope::Items { items } => items,
            ListEnvelope::Nested { data } => data.items,
        }
    }
}

/// Object payloads arrive bare or wrapped in `{data}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ObjectEnvelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> ObjectEnvelope<T> {
    fn into_inner(self) -> T {
        match self {
            ObjectEnvelope::Wrapped { data } => data,
            ObjectEnvelope::Bare(value) => value,
        }
    }
}

pub(crate) fn decode_list<T: DeserializeOwned>(body: &str) -> Result<Vec<T>, ClientError> {
    Ok(serde_json::from_str::<ListEnvelope<T>>(body)?.into_items())
}

pub(crate) fn decode_object<T: DeserializeOwned>(body: &str) -> Result<T, ClientError> {
    Ok(serde_json::from_str::<ObjectEnvelope<T>>(body)?.into_inner())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StandardProductsBody<'a> {
    products: &'a [String],
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StandardProductsResponse {
    Wrapped { products: Vec<String> },
    Bare(Vec<String>),
}

/// Outcome of `POST /config/sync-fridges`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    #[serde(default)]
    pub updated_fridges: u32,
    #[serde(default)]
    pub added_products: u32,
}

/// Strategy for `GET /capacity/location/:id/suggest`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SuggestMethod {
    Max,
    Average,
    Percentile,
}

impl SuggestMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestMethod::Max => "max",
            SuggestMethod::Average => "average",
            SuggestMethod::Percentile => "percentile",
        }
    }
}

/// Typed access to the backend REST API.
#[derive(Clone, Debug)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .user_agent(user_agent())
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Builds a client with an explicit base URL and timeout.
    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent())
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Returns a copy that authenticates with `token`.
    pub fn with_token(&self, token: Option<String>) -> Self {
        Self {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            token,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, ClientError> {
        let response = self.authorize(request).send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            warn!("Backend rejected the session token");
            return Err(ClientError::Unauthorized);
        }

        let body = response.text().await?;
        if !status.is_success() {
            warn!(%status, "Backend request failed");
            return Err(ClientError::Status { status, body });
        }
        Ok(body)
    }

    async fn get_text(&self, path: &str) -> Result<String, ClientError> {
        debug!(path, "GET");
        self.send(self.http.get(self.url(path))).await
    }

    pub async fn locations(&self) -> Result<Vec<Location>, ClientError> {
        decode_list(&self.get_text("/locations").await?)
    }

    pub async fn location(&self, id: &str) -> Result<Location, ClientError> {
        decode_object(&self.get_text(&format!("/locations/{id}")).await?)
    }

    /// `GET /dashboard/overview?start&end`.
    pub async fn dashboard_overview(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<DashboardOverview, ClientError> {
        let mut query = Vec::new();
        if let Some(start) = start {
            query.push(("start", start.to_string()));
        }
        if let Some(end) = end {
            query.push(("end", end.to_string()));
        }
        debug!(?start, ?end, "GET /dashboard/overview");
        let request = self.http.get(self.url("/dashboard/overview")).query(&query);
        decode_object(&self.send(request).await?)
    }

    pub async fn standard_products(&self) -> Result<Vec<String>, ClientError> {
        let body = self.get_text("/config/standard-products").await?;
        Ok(
            match decode_object::<StandardProductsResponse>(&body)? {
                StandardProductsResponse::Wrapped { products } => products,
                StandardProductsResponse::Bare(products) => products,
            },
        )
    }

    pub async fn save_standard_products(&self, products: &[String]) -> Result<(), ClientError> {
        debug!(count = products.len(), "PUT /config/standard-products");
        let request = self
            .http
            .put(self.url("/config/standard-products"))
            .json(&StandardProductsBody { products });
        self.send(request).await.map(|_| ())
    }

    /// Adds missing standard products to every refrigerator.
    pub async fn sync_fridges(&self) -> Result<SyncReport, ClientError> {
        debug!("POST /config/sync-fridges");
        let body = self
            .send(self.http.post(self.url("/config/sync-fridges")))
            .await?;
        if body.trim().is_empty() {
            return Ok(SyncReport::default());
        }
        decode_object(&body)
    }

    pub async fn location_capacity(&self, location_id: &str) -> Result<CapacityMap, ClientError> {
        decode_object(
            &self
                .get_text(&format!("/capacity/location/{location_id}"))
                .await?,
        )
    }

    pub async fn save_location_capacity(
        &self,
        location_id: &str,
        capacity: &CapacityMap,
    ) -> Result<(), ClientError> {
        let request = self
            .http
            .put(self.url(&format!("/capacity/location/{location_id}")))
            .json(capacity);
        self.send(request).await.map(|_| ())
    }

    pub async fn suggest_capacity(
        &self,
        location_id: &str,
        method: SuggestMethod,
    ) -> Result<CapacityMap, ClientError> {
        let request = self
            .http
            .get(self.url(&format!("/capacity/location/{location_id}/suggest")))
            .query(&[("method", method.as_str())]);
        decode_object(&self.send(request).await?)
    }

    pub async fn active_session_summary(&self) -> Result<Vec<SessionSummaryRow>, ClientError> {
        decode_list(&self.get_text("/sessions/active/summary").await?)
    }

    pub async fn keep_alive_status(&self) -> Result<KeepAliveStatus, ClientError> {
        decode_object(&self.get_text("/keep-alive/status").await?)
    }
}
