//! Record store backed by the record API
//!
//! - `GET /entries/?skip=..&limit=..` lists records a page at a time
//! - `GET /entries/{id}/` reads one record
//! - `PATCH /entries/{id}` applies a partial update
//!
//! The list endpoint has no status filter, so filtering happens here.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use ztp_common::{ProvisioningRecord, RecordPatch, RecordStatus};

use crate::error::{Result, StoreError};
use crate::store::RecordStore;

/// Records fetched per list request
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Record API connection settings
#[derive(Debug, Clone)]
pub struct ApiStoreConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub page_size: usize,
}

impl ApiStoreConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(30),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size.max(1);
        self
    }
}

/// [`RecordStore`] talking to the record API over HTTP
#[derive(Debug)]
pub struct ApiRecordStore {
    client: Client,
    config: ApiStoreConfig,
}

impl ApiRecordStore {
    pub fn new(config: ApiStoreConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(StoreError::from)?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    async fn decode<T: DeserializeOwned>(response: Response, id: Option<i64>) -> Result<T> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            if let Some(id) = id {
                return Err(StoreError::NotFound(id).into());
            }
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Http {
                status: status.as_u16(),
                body,
            }
            .into());
        }
        Ok(response.json().await.map_err(StoreError::from)?)
    }
}

#[async_trait]
impl RecordStore for ApiRecordStore {
    async fn find_by_status(&self, status: RecordStatus) -> Result<Vec<ProvisioningRecord>> {
        let limit = self.config.page_size;
        let mut matching = Vec::new();
        let mut skip = 0;

        loop {
            let response = self
                .client
                .get(self.url("/entries/"))
                .query(&[("skip", skip), ("limit", limit)])
                .send()
                .await
                .map_err(StoreError::from)?;
            let page: Vec<ProvisioningRecord> = Self::decode(response, None).await?;
            let fetched = page.len();
            matching.extend(page.into_iter().filter(|r| r.status == status));

            if fetched < limit {
                break;
            }
            skip += fetched;
        }

        debug!(status = %status, count = matching.len(), "Listed records");
        Ok(matching)
    }

    async fn get(&self, id: i64) -> Result<ProvisioningRecord> {
        let response = self
            .client
            .get(self.url(&format!("/entries/{id}/")))
            .send()
            .await
            .map_err(StoreError::from)?;
        Self::decode(response, Some(id)).await
    }

    async fn patch(&self, id: i64, patch: &RecordPatch) -> Result<ProvisioningRecord> {
        debug!(id, patch = ?patch, "Patching record");
        let response = self
            .client
            .patch(self.url(&format!("/entries/{id}")))
            .json(patch)
            .send()
            .await
            .map_err(StoreError::from)?;
        Self::decode(response, Some(id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config() {
        let config = ApiStoreConfig::new("http://ztp-api:8000/").with_page_size(0);
        assert_eq!(config.base_url, "http://ztp-api:8000");
        assert_eq!(config.page_size, 1);
    }

    #[test]
    fn test_urls() {
        let store = ApiRecordStore::new(ApiStoreConfig::new("http://ztp-api:8000")).unwrap();
        assert_eq!(store.url("/entries/5/"), "http://ztp-api:8000/entries/5/");
    }
}
