//! HTTP adapters for the catalog API, image fetches and media streams.

pub mod catalog_client;
pub mod dto;
pub mod fetcher;
pub mod media;
pub mod retry;

use std::time::Duration;

use reqwest::Client;

use crate::domain::errors::{FetchError, FetchResult};

pub use catalog_client::{CatalogApiClient, DEFAULT_API_BASE, DEFAULT_METADATA_TIMEOUT};
pub use fetcher::{DEFAULT_IMAGE_TIMEOUT, HttpFetcher};
pub use media::{DEFAULT_MEDIA_TIMEOUT, HttpMediaSource};
pub use retry::RetryPolicy;

/// User agent sent with every request.
pub const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Builds a client with the shared user agent.
///
/// Idle connections are not pooled: clients are shared between worker
/// threads that each run their own runtime.
pub(crate) fn build_client(timeout: Duration) -> FetchResult<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .pool_max_idle_per_host(0)
        .build()
        .map_err(|e| FetchError::internal(format!("failed to create HTTP client: {e}")))
}

/// Minimal one-shot HTTP server for adapter tests.
#[cfg(test)]
pub(crate) mod test_server {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Builds a raw HTTP/1.1 response.
    pub fn response(status: &str, body: &[u8]) -> Vec<u8> {
        let mut out = format!(
            "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        )
        .into_bytes();
        out.extend_from_slice(body);
        out
    }

    /// Serves `responses` in order, one per connection.
    ///
    /// Returns the base URL and a handle yielding the request heads received.
    pub async fn serve(responses: Vec<Vec<u8>>) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let mut heads = Vec::new();
            for reply in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                heads.push(String::from_utf8_lossy(&buf).into_owned());
                socket.write_all(&reply).await.unwrap();
                let _ = socket.shutdown().await;
            }
            heads
        });

        (base, handle)
    }
}
