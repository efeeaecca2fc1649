//! Ports used by the download pipeline.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

use crate::domain::errors::FetchResult;

/// An open media transfer.
pub struct MediaStream {
    /// Total length, when the response announced one.
    pub total_bytes: Option<u64>,
    /// Body chunks in arrival order.
    pub chunks: BoxStream<'static, FetchResult<Bytes>>,
}

impl std::fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStream")
            .field("total_bytes", &self.total_bytes)
            .finish_non_exhaustive()
    }
}

/// Resolves an episode id into a playable stream URL.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StreamResolver: Send + Sync {
    /// Returns the stream URL of `item_id` at the requested quality.
    async fn resolve(&self, item_id: &str, quality: &str) -> FetchResult<String>;
}

/// Opens chunked transfers.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Starts streaming the body at `url`.
    async fn open(&self, url: &str) -> FetchResult<MediaStream>;
}
