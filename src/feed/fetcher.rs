use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

use crate::feed::parser::{parse_feed, FeedItem};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors from a single fetch attempt.
///
/// The fetcher never retries. A failed attempt surfaces here and the
/// scheduler decides when to try again (the next poll cycle).
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// Request exceeded the 30-second timeout
    #[error("request timed out")]
    Timeout,
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    Status(u16),
    /// Response body exceeded the 10MB size limit
    #[error("response too large")]
    TooLarge,
    /// Payload could not be parsed as RSS or Atom
    #[error("parse error: {0}")]
    Parse(String),
}

/// Stateless feed fetcher around an injected HTTP client.
///
/// Injecting the client keeps tests parallel-safe and avoids a hidden
/// process-global handle.
#[derive(Clone)]
pub struct FeedFetcher {
    http: reqwest::Client,
}

impl FeedFetcher {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Perform exactly one GET against `url` and parse the payload into
    /// items in feed order.
    pub async fn fetch(&self, url: &str) -> Result<Vec<FeedItem>, FetchError> {
        let response = tokio::time::timeout(FETCH_TIMEOUT, self.http.get(url).send())
            .await
            .map_err(|_| FetchError::Timeout)??;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let bytes = read_limited_bytes(response, MAX_FEED_SIZE).await?;

        parse_feed(&bytes).map_err(|e| FetchError::Parse(e.to_string()))
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length before reading anything
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::TooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Transport)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::TooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
