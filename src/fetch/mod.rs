//! Retrieval of raw snapshot bytes.
//!
//! Sources are either `http(s)` URLs, fetched through an [`HttpClient`], or
//! local paths read from disk.

mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use std::path::Path;

use tracing::debug;

use crate::error::FetchError;

/// GETs `url` and returns the response body.
///
/// # Errors
///
/// Fails on an unparseable URL, a transport error or a non-success status.
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Vec<u8>, FetchError> {
    let req = reqwest::Request::new(
        reqwest::Method::GET,
        url.parse().map_err(|_| FetchError::InvalidUrl(url.to_string()))?,
    );

    let resp = client.execute(req).await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status,
        });
    }

    let bytes = resp.bytes().await?;
    debug!(url, bytes = bytes.len(), "Fetched");
    Ok(bytes.to_vec())
}

pub fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Loads raw bytes from a local file path or fetches them over HTTP.
#[tracing::instrument(skip(client))]
pub async fn load_source<C: HttpClient>(client: &C, source: &str) -> Result<Vec<u8>, FetchError> {
    if is_remote(source) {
        fetch_bytes(client, source).await
    } else {
        Ok(std::fs::read(Path::new(source))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_remote() {
        assert!(is_remote("https://example.org/feed.pb"));
        assert!(is_remote("http://example.org/gtfs.zip"));
        assert!(!is_remote("data/feed.pb"));
        assert!(!is_remote("httpdata/feed.pb"));
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let client = BasicClient::new();
        let err = fetch_bytes(&client, "not a url").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_load_local_source() {
        let path = std::env::temp_dir().join("gtfs_snapshot_test_source.bin");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();

        let client = BasicClient::new();
        let bytes = load_source(&client, path.to_str().unwrap()).await.unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_load_missing_local_source() {
        let client = BasicClient::new();
        let err = load_source(&client, "/nonexistent/gtfs_snapshot/feed.pb")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Io(_)));
    }
}
