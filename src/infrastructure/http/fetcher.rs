//! Whole-body HTTP fetcher used by the image loader.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use tracing::{debug, warn};

use super::{USER_AGENT, build_client};
use crate::domain::errors::{FetchError, FetchResult};
use crate::domain::ports::ByteFetcher;

/// Default timeout for image requests.
pub const DEFAULT_IMAGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches resource bodies over HTTP.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Creates a fetcher with the given request timeout.
    ///
    /// # Errors
    /// Returns error if HTTP client creation fails.
    pub fn new(timeout: Duration) -> FetchResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl ByteFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> FetchResult<Bytes> {
        debug!(url, user_agent = USER_AGENT, "Fetching resource");

        let response = self.client.get(url).send().await.map_err(|e| {
            warn!(url, error = %e, "Resource request failed");
            FetchError::from_reqwest(&e, "resource request")
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
            });
        }

        response
            .bytes()
            .await
            .map_err(|e| FetchError::from_reqwest(&e, "resource body"))
    }
}
