mod catalog_port;
mod fetch_port;
mod image_cache_port;
mod media_port;

pub use catalog_port::CatalogPort;
pub use fetch_port::ByteFetcher;
pub use image_cache_port::ImageCachePort;
pub use media_port::{MediaSource, MediaStream, StreamResolver};

#[cfg(test)]
pub use media_port::MockStreamResolver;
