pub mod catalog_service;
pub mod download_coordinator;
pub mod download_executor;

pub use catalog_service::{CatalogRequest, CatalogService, CatalogUpdate, Lookup};
pub use download_coordinator::{
    DEFAULT_CANCEL_GRACE, DownloadCoordinator, DownloadEvent, DownloadSettings,
};
pub use download_executor::{DownloadExecutor, ExecutorEvent, sanitize_filename};
