//! Byte fetch port definition.

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::errors::FetchResult;

/// Port for fetching a whole resource body by URL.
#[async_trait]
pub trait ByteFetcher: Send + Sync {
    /// Fetches the body at `url`.
    async fn fetch(&self, url: &str) -> FetchResult<Bytes>;
}
