use sentinel_core_types::{BoxError, Height};

use crate::{ProofType, PubSubError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Proof failed validation: {0}")]
    Validation(#[source] BoxError),

    #[error("Unknown proof type: {0}")]
    UnknownType(ProofType),

    #[error("Proof type {0} is already registered")]
    AlreadyRegistered(ProofType),

    #[error("No header at height {0} to validate the proof against")]
    NotFound(Height),

    #[error("Failed to get header: {0}")]
    HeaderAccess(#[source] BoxError),

    #[error("Failed to encode proof: {0}")]
    Encode(#[source] BoxError),

    #[error("Failed to decode proof: {0}")]
    Decode(#[source] BoxError),

    #[error("Storage error: {0}")]
    Storage(#[from] sentinel_datastore::Error),

    #[error("Storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Network error: {0}")]
    Network(#[from] PubSubError),

    #[error("Proof service is stopped")]
    Stopped,
}

impl Error {
    /// Whether the same call may succeed if retried later.
    ///
    /// A missing header is retryable since the header may still be synced.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::NotFound(_) | Self::HeaderAccess(_)
        )
    }
}
