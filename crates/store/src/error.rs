use sentinel_core_types::{Hash, HeaderError, Height};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Header at height {actual} is out of order, expected height {expected}")]
    OutOfOrder { expected: Height, actual: Height },

    #[error("Header at height {height} does not extend the head: expected parent {expected}, got {actual}")]
    NonAdjacent {
        height: Height,
        expected: Hash,
        actual: Hash,
    },

    #[error("Invalid header: {0}")]
    InvalidHeader(#[source] HeaderError),

    #[error("No header found at height {0}")]
    HeightNotFound(Height),

    #[error("No header found with hash {0}")]
    HashNotFound(Hash),

    #[error("Store is already initialized")]
    AlreadyInitialized,

    #[error("Storage error: {0}")]
    Storage(#[from] sentinel_datastore::Error),

    #[error("Storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Corrupted entry at key {key}: {reason}")]
    Corrupted { key: String, reason: String },

    #[error("Store has been stopped")]
    Stopped,
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::HeightNotFound(_) | Self::HashNotFound(_))
    }
}
