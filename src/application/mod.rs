//! Application layer orchestrating catalog lookups and downloads.

/// Application services.
pub mod services;

pub use services::{
    CatalogService, CatalogUpdate, DownloadCoordinator, DownloadEvent, DownloadSettings, Lookup,
};
