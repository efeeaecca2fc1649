//! Catalog records returned by the upstream source.

use serde::{Deserialize, Serialize};

/// Number of items a full upstream page carries.
pub const PAGE_SIZE: usize = 20;

/// Summary of a drama as listed by search and category endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DramaSummary {
    /// Upstream id.
    pub book_id: String,
    /// Title.
    pub title: String,
    /// Cover image URL.
    pub cover: String,
    /// Number of episodes.
    pub episode_count: u32,
}

/// One page of dramas.
///
/// The upstream never reports a page count, so `has_more` only means the last
/// fetch returned a full page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DramaPage {
    /// 1-based page number.
    pub page: u32,
    /// Items on this page.
    pub items: Vec<DramaSummary>,
    /// Whether a next page is assumed to exist.
    pub has_more: bool,
}

impl DramaPage {
    /// Builds a page, deriving `has_more` from the item count.
    #[must_use]
    pub fn new(page: u32, items: Vec<DramaSummary>) -> Self {
        let has_more = items.len() >= PAGE_SIZE;
        Self {
            page,
            items,
            has_more,
        }
    }

    /// Highest page number known to exist.
    #[must_use]
    pub const fn known_pages(&self) -> u32 {
        if self.has_more {
            self.page.saturating_add(1)
        } else {
            self.page
        }
    }
}

/// One episode of a drama.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    /// Upstream video id.
    pub video_id: String,
    /// Title.
    pub title: String,
}

/// Episode listing for a drama.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeList {
    /// Upstream drama id.
    pub book_id: String,
    /// Drama title.
    pub book_name: String,
    /// Episodes in upstream order.
    pub episodes: Vec<Episode>,
}

/// Result of a catalog operation, tagged by the operation that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogResponse {
    /// Keyword search.
    Search(DramaPage),
    /// Category listing.
    Category(DramaPage),
    /// Episode listing.
    Episodes(EpisodeList),
}
