//! Catalog source port definition.

use async_trait::async_trait;

use crate::domain::entities::{DramaPage, EpisodeList};
use crate::domain::errors::FetchResult;

/// Port for metadata lookups against an upstream catalog.
#[async_trait]
pub trait CatalogPort: Send + Sync {
    /// Stable identifier of the upstream, folded into cache keys.
    fn provider_id(&self) -> &str;

    /// Searches dramas by keyword.
    async fn search(&self, keyword: &str, page: u32) -> FetchResult<DramaPage>;

    /// Lists dramas of a category.
    async fn category(&self, category: &str, page: u32) -> FetchResult<DramaPage>;

    /// Lists episodes of a drama.
    async fn episodes(&self, drama_id: &str) -> FetchResult<EpisodeList>;
}
