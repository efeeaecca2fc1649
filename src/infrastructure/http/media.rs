//! Chunked media transfers.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use super::build_client;
use crate::domain::errors::{FetchError, FetchResult};
use crate::domain::ports::{MediaSource, MediaStream};

/// Default timeout for a whole media transfer.
pub const DEFAULT_MEDIA_TIMEOUT: Duration = Duration::from_secs(3600);

/// Streams media bodies over HTTP.
#[derive(Debug, Clone)]
pub struct HttpMediaSource {
    client: Client,
}

impl HttpMediaSource {
    /// Creates a source whose transfers time out after `timeout`.
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
impl MediaSource for HttpMediaSource {
    async fn open(&self, url: &str) -> FetchResult<MediaStream> {
        let response = self.client.get(url).send().await.map_err(|e| {
            warn!(url, error = %e, "Media request failed");
            FetchError::from_reqwest(&e, "media request")
        })?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::PARTIAL_CONTENT {
            return Err(FetchError::Http {
                status: status.as_u16(),
            });
        }

        let total_bytes = response.content_length().filter(|len| *len > 0);
        debug!(url, total_bytes, "Media stream opened");

        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| FetchError::from_reqwest(&e, "media stream")))
            .boxed();

        Ok(MediaStream {
            total_bytes,
            chunks,
        })
    }
}
