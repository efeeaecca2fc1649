//! Domain layer with core business entities and port definitions.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;
/// Serde helpers.
pub mod serde_utils;

pub use entities::{DownloadStatus, DownloadTask, LoadedImage, TaskId};
pub use errors::{FetchError, FetchResult};
pub use ports::{ByteFetcher, CatalogPort, MediaSource, StreamResolver};
