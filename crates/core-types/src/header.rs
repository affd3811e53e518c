use core::fmt;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::{Hash, Height};

/// Identifier of the chain a header belongs to.
#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    BorshSerialize,
    BorshDeserialize,
)]
#[serde(transparent)]
pub struct ChainId(String);

impl ChainId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HeaderError {
    #[error("Header hash mismatch at height {height}: expected {expected}, computed {computed}")]
    HashMismatch {
        height: Height,
        expected: Hash,
        computed: Hash,
    },

    #[error("Header at height {height} does not link to its parent: expected {expected}, got {actual}")]
    NotAdjacent {
        height: Height,
        expected: Hash,
        actual: Hash,
    },

    #[error("Header at height {0} is not the successor of height {1}")]
    NotSuccessor(Height, Height),

    #[error("Header height must be non-zero")]
    ZeroHeight,

    #[error("Failed to encode header: {0}")]
    Encode(std::io::Error),

    #[error("Failed to decode header: {0}")]
    Decode(std::io::Error),
}

/// A block header together with the auxiliary data needed to verify it.
///
/// The header hash is computed once, on construction, and carried alongside
/// the fields. [`ExtendedHeader::validate_basic`] recomputes it so that a
/// header received from an untrusted peer cannot lie about its own hash.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ExtendedHeader {
    pub chain_id: ChainId,
    pub height: Height,
    /// Block time, in milliseconds since the unix epoch.
    pub time: u64,
    pub last_hash: Hash,
    pub data_hash: Hash,
    pub validators_hash: Hash,
    /// Opaque commit data used by external verifiers.
    #[serde(with = "hex::serde")]
    pub commit: Vec<u8>,
    hash: Hash,
}

impl ExtendedHeader {
    pub fn new(
        chain_id: ChainId,
        height: Height,
        time: u64,
        last_hash: Hash,
        data_hash: Hash,
        validators_hash: Hash,
        commit: Vec<u8>,
    ) -> Self {
        let mut header = Self {
            chain_id,
            height,
            time,
            last_hash,
            data_hash,
            validators_hash,
            commit,
            hash: Hash::default(),
        };

        header.hash = header.compute_hash();
        header
    }

    pub fn height(&self) -> Height {
        self.height
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn last_hash(&self) -> Hash {
        self.last_hash
    }

    fn compute_hash(&self) -> Hash {
        let fields = (
            &self.chain_id,
            &self.height,
            &self.time,
            &self.last_hash,
            &self.data_hash,
            &self.validators_hash,
            &self.commit,
        );

        // Serializing into a Vec cannot fail
        let bytes = borsh::to_vec(&fields).unwrap_or_default();
        Hash::digest(bytes)
    }

    /// Check the header is self-consistent: non-zero height and correct hash.
    pub fn validate_basic(&self) -> Result<(), HeaderError> {
        if self.height.is_zero() {
            return Err(HeaderError::ZeroHeight);
        }

        let computed = self.compute_hash();
        if computed != self.hash {
            return Err(HeaderError::HashMismatch {
                height: self.height,
                expected: self.hash,
                computed,
            });
        }

        Ok(())
    }

    /// Check that `self` is the direct successor of `parent`.
    pub fn verify_adjacent(&self, parent: &ExtendedHeader) -> Result<(), HeaderError> {
        if self.height != parent.height.increment() {
            return Err(HeaderError::NotSuccessor(self.height, parent.height));
        }

        if self.last_hash != parent.hash {
            return Err(HeaderError::NotAdjacent {
                height: self.height,
                expected: parent.hash,
                actual: self.last_hash,
            });
        }

        Ok(())
    }

    pub fn encode(&self) -> Result<Vec<u8>, HeaderError> {
        borsh::to_vec(self).map_err(HeaderError::Encode)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, HeaderError> {
        borsh::from_slice(bytes).map_err(HeaderError::Decode)
    }

    /// Size of the header once encoded, in bytes.
    pub fn encoded_len(&self) -> usize {
        borsh::object_length(self).unwrap_or(0)
    }
}

impl fmt::Debug for ExtendedHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtendedHeader")
            .field("chain_id", &self.chain_id)
            .field("height", &self.height)
            .field("hash", &self.hash)
            .field("last_hash", &self.last_hash)
            .finish_non_exhaustive()
    }
}
