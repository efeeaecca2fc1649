//! Domain entity definitions.

mod catalog;
mod download;
mod image;

pub use catalog::{CatalogResponse, DramaPage, DramaSummary, Episode, EpisodeList, PAGE_SIZE};
pub use download::{DownloadStatus, DownloadTask, ParentItem, SubItem, TaskId};
pub use image::{ImageId, ImageSource, LoadedImage};
