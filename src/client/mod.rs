//! Chat-client collaborator.
//!
//! The bot core only needs to put plain notices into rooms; everything
//! else about the chat protocol (authentication, sync, membership) lives
//! behind this seam.

mod matrix;

pub use matrix::MatrixClient;

use async_trait::async_trait;
use thiserror::Error;

/// A single failed send. One call, one message, no retries; the next poll
/// cycle is the natural retry.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("send timed out")]
    Timeout,
    #[error("chat server returned HTTP {0}")]
    Status(u16),
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Deliver a plain-text notice to a room.
    async fn send_notice(&self, room_id: &str, body: &str) -> Result<(), SendError>;
}
