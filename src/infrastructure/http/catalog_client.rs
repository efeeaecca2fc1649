//! Catalog API HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::build_client;
use super::dto::{DramaListResponse, EpisodeListResponse, VideoResponse};
use super::retry::RetryPolicy;
use crate::domain::entities::{DramaPage, EpisodeList};
use crate::domain::errors::{FetchError, FetchResult};
use crate::domain::ports::{CatalogPort, StreamResolver};

/// Default endpoint of the catalog API.
pub const DEFAULT_API_BASE: &str = "https://api.cenguigui.cn/api/duanju/api.php";

/// Default timeout for metadata requests.
pub const DEFAULT_METADATA_TIMEOUT: Duration = Duration::from_secs(10);

const PROVIDER_ID: &str = "cenguigui";

/// Client for the drama catalog API.
///
/// Every operation is a GET against the same endpoint, distinguished by its
/// query parameters.
#[derive(Debug, Clone)]
pub struct CatalogApiClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl CatalogApiClient {
    /// Creates client with default base URL.
    ///
    /// # Errors
    /// Returns error if HTTP client creation fails.
    pub fn new() -> FetchResult<Self> {
        Self::with_base_url(DEFAULT_API_BASE, DEFAULT_METADATA_TIMEOUT, RetryPolicy::default())
    }

    /// Creates client with custom base URL, timeout and retry policy.
    ///
    /// # Errors
    /// Returns error if HTTP client creation fails.
    pub fn with_base_url(
        base_url: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> FetchResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into(),
            retry,
        })
    }

    /// Endpoint in use.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        params: &[(&str, String)],
    ) -> FetchResult<T> {
        let client = &self.client;
        let base_url = self.base_url.as_str();

        self.retry
            .run(operation, move || async move {
                debug!(operation, ?params, "Catalog request");

                let response = client
                    .get(base_url)
                    .query(params)
                    .send()
                    .await
                    .map_err(|e| {
                        warn!(operation, error = %e, "Failed to reach catalog API");
                        FetchError::from_reqwest(&e, operation)
                    })?;

                let status = response.status();
                if !status.is_success() {
                    return Err(FetchError::Http {
                        status: status.as_u16(),
                    });
                }

                let body = response
                    .text()
                    .await
                    .map_err(|e| FetchError::from_reqwest(&e, operation))?;

                serde_json::from_str(&body).map_err(|e| {
                    warn!(operation, error = %e, "Failed to parse catalog response");
                    FetchError::decode(format!("failed to parse {operation} response: {e}"))
                })
            })
            .await
    }
}

#[async_trait]
impl CatalogPort for CatalogApiClient {
    fn provider_id(&self) -> &str {
        PROVIDER_ID
    }

    async fn search(&self, keyword: &str, page: u32) -> FetchResult<DramaPage> {
        let response: DramaListResponse = self
            .get_json(
                "search",
                &[("name", keyword.to_string()), ("page", page.to_string())],
            )
            .await?;
        let page = response.into_page(page)?;
        debug!(keyword, page = page.page, items = page.items.len(), "Search completed");
        Ok(page)
    }

    async fn category(&self, category: &str, page: u32) -> FetchResult<DramaPage> {
        let response: DramaListResponse = self
            .get_json(
                "category",
                &[
                    ("classname", category.to_string()),
                    ("offset", page.to_string()),
                ],
            )
            .await?;
        response.into_page(page)
    }

    async fn episodes(&self, drama_id: &str) -> FetchResult<EpisodeList> {
        let response: EpisodeListResponse = self
            .get_json("episodes", &[("book_id", drama_id.to_string())])
            .await?;
        let list = response.into_episodes(drama_id)?;
        debug!(drama_id, episodes = list.episodes.len(), "Episode list loaded");
        Ok(list)
    }
}

#[async_trait]
impl StreamResolver for CatalogApiClient {
    async fn resolve(&self, item_id: &str, quality: &str) -> FetchResult<String> {
        let response: VideoResponse = self
            .get_json(
                "video",
                &[
                    ("video_id", item_id.to_string()),
                    ("level", quality.to_string()),
                    ("type", "json".to_string()),
                ],
            )
            .await?;
        response.into_stream_url()
    }
}
