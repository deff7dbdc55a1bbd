//! Remote archive API client
//!
//! The engine only ever talks to the archive through the [`RecordFetcher`]
//! trait; [`ArchiveClient`] is the production implementation over `reqwest`.
//! The client is stateless after construction (the auth token is acquired
//! once, up front) and is shared read-only across workers behind an `Arc`.
//!
//! Every transport problem — connection failure, non-2xx status, timeout —
//! surfaces as a single uniform error kind. The engine does not distinguish
//! retryable from fatal HTTP errors; a failed batch simply goes to the ledger.

use std::time::Duration;

use serde_json::Value;
use url::Url;

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::types::{ImageId, Include, MetadataRecord};

/// Listing query for the image index endpoint
#[derive(Clone, Debug)]
pub struct ListQuery {
    /// Field to sort the result set by
    pub sort: String,
    /// Sort descending instead of ascending
    pub descending: bool,
    /// Only list images with this exact name
    pub name: Option<String>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            sort: "name".to_string(),
            descending: false,
            name: None,
        }
    }
}

/// Abstraction over the remote archive, enabling testability
#[async_trait::async_trait]
pub trait RecordFetcher: Send + Sync {
    /// Fetch one batch of images as a single zip archive payload
    async fn fetch_image_archive(&self, ids: &[ImageId], include: Include) -> Result<Vec<u8>>;

    /// Fetch the metadata records for one batch of image ids
    async fn fetch_metadata(&self, ids: &[ImageId]) -> Result<Vec<MetadataRecord>>;

    /// List image ids matching the query, walking the paginated index
    async fn list_image_ids(&self, query: &ListQuery) -> Result<Vec<ImageId>>;
}

/// Production [`RecordFetcher`] over the archive's HTTP API
#[derive(Debug)]
pub struct ArchiveClient {
    http: reqwest::Client,
    base_url: Url,
    token: Option<String>,
    page_size: usize,
}

impl ArchiveClient {
    /// Build a client from API configuration
    ///
    /// When credentials are configured, logs in immediately and keeps the
    /// returned token for all subsequent requests; otherwise requests are
    /// sent anonymously.
    pub async fn new(config: &ApiConfig, request_timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .and_then(|u| u.join("api/v1/"))
            .map_err(|e| Error::config("api.base_url", e.to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        let mut client = Self {
            http,
            base_url,
            token: None,
            page_size: config.page_size,
        };

        if let Some(username) = &config.username {
            let password = config.password.as_deref().unwrap_or_default();
            client.token = Some(client.login(username, password).await?);
            tracing::info!("API token acquired");
        } else {
            tracing::info!("no login credentials configured, sending requests anonymously");
        }

        Ok(client)
    }

    /// Authenticate and return the session token
    async fn login(&self, username: &str, password: &str) -> Result<String> {
        let url = self.endpoint_url("user/authentication")?;
        let response = self
            .http
            .get(url)
            .basic_auth(username, Some(password))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response
                .json::<Value>()
                .await
                .ok()
                .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
                .unwrap_or_else(|| status.to_string());
            return Err(Error::Api(format!("login failed: {message}")));
        }

        let body: Value = response.json().await?;
        body.pointer("/auth_token/token")
            .and_then(|t| t.as_str())
            .map(String::from)
            .ok_or_else(|| Error::Api("login response carried no auth token".to_string()))
    }

    fn endpoint_url(&self, endpoint: &str) -> Result<Url> {
        self.base_url
            .join(endpoint)
            .map_err(|e| Error::Api(format!("invalid endpoint {endpoint}: {e}")))
    }

    /// Issue a GET against an API endpoint, applying token auth when present
    async fn get(&self, endpoint: &str) -> Result<reqwest::Response> {
        let url = self.endpoint_url(endpoint)?;
        tracing::debug!(%url, "GET");

        let mut request = self.http.get(url);
        if let Some(token) = &self.token {
            request = request.header("Girder-Token", token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(Error::Api(format!(
                "{} returned {}",
                endpoint,
                response.status()
            )));
        }
        Ok(response)
    }

    /// Build the `image/download` endpoint for a batch of ids
    ///
    /// The API takes the id list as a JSON array, percent-encoded into a
    /// single query parameter.
    fn download_endpoint(ids: &[ImageId], include: Include) -> String {
        let raw: Vec<&str> = ids.iter().map(ImageId::as_str).collect();
        // Vec<&str> always serializes
        let json = serde_json::to_string(&raw).unwrap_or_default();
        format!(
            "image/download?include={}&imageIds={}",
            include.as_query_value(),
            urlencoding::encode(&json)
        )
    }

    /// Map one image-detail API object onto a flat metadata record
    ///
    /// Handles both the flat shape (`isic_id`, `dataset` as a string) and the
    /// nested shape (`name`, `dataset.name`, `meta.clinical.*`).
    fn record_from_api(value: &Value) -> Option<MetadataRecord> {
        let isic_id = value
            .get("isic_id")
            .or_else(|| value.get("name"))
            .and_then(Value::as_str)?
            .to_string();

        let dataset = match value.get("dataset") {
            Some(Value::String(name)) => Some(name.clone()),
            Some(obj) => obj.get("name").and_then(Value::as_str).map(String::from),
            None => None,
        };

        let clinical = value.pointer("/meta/clinical").unwrap_or(&Value::Null);
        let field = |key: &str| -> Option<String> {
            clinical
                .get(key)
                .or_else(|| value.get(key))
                .and_then(Value::as_str)
                .map(String::from)
        };

        Some(MetadataRecord {
            name: value.get("name").and_then(Value::as_str).map(String::from),
            dataset,
            diagnosis: field("diagnosis"),
            benign_malignant: field("benign_malignant"),
            age_approx: clinical
                .get("age_approx")
                .or_else(|| value.get("age_approx"))
                .and_then(Value::as_f64),
            sex: field("sex"),
            isic_id,
        })
    }
}

#[async_trait::async_trait]
impl RecordFetcher for ArchiveClient {
    async fn fetch_image_archive(&self, ids: &[ImageId], include: Include) -> Result<Vec<u8>> {
        let endpoint = Self::download_endpoint(ids, include);
        let bytes = self.get(&endpoint).await?.bytes().await?;

        if bytes.is_empty() {
            return Err(Error::Api("no data in download response".to_string()));
        }
        Ok(bytes.to_vec())
    }

    async fn fetch_metadata(&self, ids: &[ImageId]) -> Result<Vec<MetadataRecord>> {
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            let body: Value = self.get(&format!("image/{id}")).await?.json().await?;
            let record = Self::record_from_api(&body)
                .ok_or_else(|| Error::Api(format!("malformed image record for {id}")))?;
            records.push(record);
        }
        Ok(records)
    }

    async fn list_image_ids(&self, query: &ListQuery) -> Result<Vec<ImageId>> {
        let mut endpoint = format!(
            "image?sort={}&sortdir={}&detail=false",
            query.sort,
            if query.descending { -1 } else { 1 }
        );
        if let Some(name) = &query.name {
            endpoint.push_str(&format!("&name={name}"));
        }

        let mut ids = Vec::new();
        let mut offset = 0usize;
        loop {
            let page_endpoint =
                format!("{endpoint}&limit={}&offset={offset}", self.page_size);
            let page: Vec<Value> = self.get(&page_endpoint).await?.json().await?;
            if page.is_empty() {
                break;
            }

            for item in &page {
                let id = item
                    .get("_id")
                    .or_else(|| item.get("isic_id"))
                    .or_else(|| item.get("name"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::Api("image listing entry has no id".to_string()))?;
                ids.push(ImageId::from(id));
            }
            offset += self.page_size;
        }
        Ok(ids)
    }
}
