//! Cached catalog lookups executed on a background worker.
//!
//! A lookup first consults the TTL cache. On a miss the request is handed to
//! a [`TaskWorker`], superseding whatever request was still running, and the
//! caller later collects the result with [`CatalogService::poll`] or
//! [`CatalogService::next_update`]. Results of superseded requests are
//! dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::domain::entities::CatalogResponse;
use crate::domain::errors::{FetchError, FetchResult};
use crate::domain::ports::CatalogPort;
use crate::infrastructure::cache::{CacheStats, TtlCache};
use crate::infrastructure::worker::{
    ActiveRequest, DEFAULT_GRACE, TaskWorker, Ticket, WorkerEvent, WorkerOutcome,
};

/// A catalog operation and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogRequest {
    /// Keyword search.
    Search {
        /// Search keyword.
        keyword: String,
        /// 1-based page.
        page: u32,
    },
    /// Category listing.
    Category {
        /// Category name.
        name: String,
        /// 1-based page.
        page: u32,
    },
    /// Episodes of a drama.
    Episodes {
        /// Drama id.
        drama_id: String,
    },
}

impl CatalogRequest {
    /// Name used in logs and cache keys.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::Search { .. } => "search",
            Self::Category { .. } => "category",
            Self::Episodes { .. } => "episodes",
        }
    }

    /// Cache key of this request against `provider_id`.
    #[must_use]
    pub fn cache_key(&self, provider_id: &str) -> String {
        match self {
            Self::Search { keyword, page } => TtlCache::<CatalogResponse>::derive_key(&[
                self.operation(),
                provider_id,
                keyword.as_str(),
                page.to_string().as_str(),
            ]),
            Self::Category { name, page } => TtlCache::<CatalogResponse>::derive_key(&[
                self.operation(),
                provider_id,
                name.as_str(),
                page.to_string().as_str(),
            ]),
            Self::Episodes { drama_id } => {
                TtlCache::<CatalogResponse>::derive_key(&[
                    self.operation(),
                    provider_id,
                    drama_id.as_str(),
                ])
            }
        }
    }

    async fn execute(self, port: &dyn CatalogPort) -> FetchResult<CatalogResponse> {
        match self {
            Self::Search { keyword, page } => {
                port.search(&keyword, page).await.map(CatalogResponse::Search)
            }
            Self::Category { name, page } => {
                port.category(&name, page).await.map(CatalogResponse::Category)
            }
            Self::Episodes { drama_id } => {
                port.episodes(&drama_id).await.map(CatalogResponse::Episodes)
            }
        }
    }
}

/// Immediate answer to a lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Served from cache.
    Ready(CatalogResponse),
    /// Fetching; the result arrives as a [`CatalogUpdate`].
    Pending(Ticket),
}

/// Result of the current request.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogUpdate {
    /// The request succeeded; the response is cached.
    Loaded(CatalogResponse),
    /// The request failed.
    Failed(FetchError),
}

/// Catalog front end owning a cache, a worker and the stale-result guard.
pub struct CatalogService {
    port: Arc<dyn CatalogPort>,
    cache: Arc<TtlCache<CatalogResponse>>,
    worker: TaskWorker<CatalogResponse>,
    events: mpsc::UnboundedReceiver<WorkerEvent<CatalogResponse>>,
    active: ActiveRequest,
}

impl CatalogService {
    /// Creates a service over `port`, sharing `cache`.
    #[must_use]
    pub fn new(port: Arc<dyn CatalogPort>, cache: Arc<TtlCache<CatalogResponse>>) -> Self {
        Self::with_grace(port, cache, DEFAULT_GRACE)
    }

    /// Creates a service whose superseded requests get `grace` to stop.
    #[must_use]
    pub fn with_grace(
        port: Arc<dyn CatalogPort>,
        cache: Arc<TtlCache<CatalogResponse>>,
        grace: Duration,
    ) -> Self {
        let (worker, events) = TaskWorker::new("catalog", grace);
        Self {
            port,
            cache,
            worker,
            events,
            active: ActiveRequest::new(),
        }
    }

    /// Searches dramas by keyword.
    pub fn search(&mut self, keyword: impl Into<String>, page: u32) -> Lookup {
        self.request(CatalogRequest::Search {
            keyword: keyword.into(),
            page,
        })
    }

    /// Lists dramas of a category.
    pub fn category(&mut self, name: impl Into<String>, page: u32) -> Lookup {
        self.request(CatalogRequest::Category {
            name: name.into(),
            page,
        })
    }

    /// Lists episodes of a drama.
    pub fn episodes(&mut self, drama_id: impl Into<String>) -> Lookup {
        self.request(CatalogRequest::Episodes {
            drama_id: drama_id.into(),
        })
    }

    /// Serves `request` from cache or starts fetching it.
    pub fn request(&mut self, request: CatalogRequest) -> Lookup {
        let key = request.cache_key(self.port.provider_id());
        if let Some(cached) = self.cache.get(&key) {
            trace!(operation = request.operation(), "Catalog cache hit");
            return Lookup::Ready(cached);
        }

        let port = self.port.clone();
        let cache = self.cache.clone();
        let operation = request.operation();
        let ticket = self.worker.run(move || async move {
            let response = request.execute(port.as_ref()).await?;
            cache.set(key, response.clone());
            Ok(response)
        });
        self.active.begin(ticket);
        debug!(operation, ?ticket, "Catalog request started");

        Lookup::Pending(ticket)
    }

    /// Returns the result of the current request if it has arrived.
    pub fn poll(&mut self) -> Option<CatalogUpdate> {
        while let Ok(event) = self.events.try_recv() {
            if let Some(update) = self.accept(event) {
                return Some(update);
            }
        }
        None
    }

    /// Waits for the result of the current request.
    ///
    /// Returns `None` when no request is pending.
    pub async fn next_update(&mut self) -> Option<CatalogUpdate> {
        while self.active.is_pending() {
            let event = self.events.recv().await?;
            if let Some(update) = self.accept(event) {
                return Some(update);
            }
        }
        None
    }

    fn accept(&mut self, event: WorkerEvent<CatalogResponse>) -> Option<CatalogUpdate> {
        if !self.active.accept(event.ticket) {
            trace!(ticket = ?event.ticket, "Dropping stale catalog result");
            return None;
        }
        Some(match event.outcome {
            WorkerOutcome::Success(response) => CatalogUpdate::Loaded(response),
            WorkerOutcome::Failure(e) => CatalogUpdate::Failed(e),
        })
    }

    /// Cancels the running request; its result will never be delivered.
    pub fn cancel(&mut self) {
        self.active.clear();
        self.worker.cancel();
    }

    /// Returns true while a request is awaiting its result.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.active.is_pending()
    }

    /// Cache statistics.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drops every cached response.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

impl std::fmt::Debug for CatalogService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogService")
            .field("provider", &self.port.provider_id())
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}
