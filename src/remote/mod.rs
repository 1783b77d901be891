//! Remote multimodal classification
//!
//! - `client`: the `RemoteClassifier` seam and its HTTP implementation
//! - `retry`: the retry policy shared by every remote call
//! - `gateway`: payload building, response interpretation and fallback rules

pub mod client;
pub mod gateway;
pub mod retry;

pub use client::{HttpRemoteClassifier, RemoteClassifier, RemoteVerdict};
pub use gateway::{is_native_extension, mime_type_for, RemoteGateway, RemoteOutcome};
pub use retry::RetryPolicy;

use std::time::Duration;

/// Failure of a single remote call
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Rate limited by remote classifier")]
    RateLimited,

    #[error("Server error ({status}): {body}")]
    Server { status: u16, body: String },

    #[error("Unauthorized ({status})")]
    Unauthorized { status: u16 },

    #[error("Request rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Transport error: {message}")]
    Transport { message: String, connect: bool },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Failed to read file for upload: {0}")]
    Io(#[from] std::io::Error),

    #[error("Request failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<RemoteError>,
    },
}

impl RemoteError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::RateLimited | Self::Server { .. } => true,
            Self::Transport { connect, .. } => *connect,
            _ => false,
        }
    }

    /// Whether the failure happened before anything was sent
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Io(_))
    }

    pub(crate) fn from_reqwest(e: reqwest::Error, timeout: Duration) -> Self {
        if e.is_timeout() {
            Self::Timeout(timeout)
        } else if e.is_decode() {
            Self::MalformedResponse(e.to_string())
        } else {
            Self::Transport {
                connect: e.is_connect() || e.is_request(),
                message: e.to_string(),
            }
        }
    }
}
