use std::time::Duration;

use sentinel_core_types::{Hash, HeaderError, Height};

use crate::{StatusCode, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Request exceeds resource limits: {0}")]
    ResourceLimit(String),

    #[error("Not enough consistent responses: needed {needed}, got {received}")]
    Quorum { needed: usize, received: usize },

    #[error("Failed to store headers: {0}")]
    Storage(#[from] sentinel_store::Error),

    #[error("Network error: {0}")]
    Network(#[from] TransportError),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("No peer returned the header with hash {0}")]
    NotFound(Hash),

    #[error("Invalid range: {from}..={to}")]
    InvalidRange { from: Height, to: Height },

    #[error("No peers available")]
    NoPeers,
}

impl Error {
    /// Whether the same call may succeed if retried later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Quorum { .. } | Self::Network(_) | Self::Timeout(_) | Self::NoPeers
        )
    }
}

/// Reasons for discarding a response before it counts towards a quorum.
#[derive(Debug, thiserror::Error)]
pub enum ResponseError {
    #[error("Peer answered with status {0:?}")]
    Status(StatusCode),

    #[error("Expected at most {expected} headers, got {actual}")]
    TooManyHeaders { expected: u64, actual: usize },

    #[error("Expected a header at height {expected}, got {actual}")]
    UnexpectedHeight { expected: Height, actual: Height },

    #[error("Expected header with hash {expected}, got {actual}")]
    UnexpectedHash { expected: Hash, actual: Hash },

    #[error("Invalid header: {0}")]
    InvalidHeader(#[from] HeaderError),

    #[error("Empty response")]
    Empty,
}
