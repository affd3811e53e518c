use bytes::Bytes;
use serde::{Deserialize, Serialize};

use sentinel_core_types::{BoxError, ExtendedHeader, Height};
use sentinel_fraud::{DecodableProof, Proof, ProofType};

/// A proof whose validity is decided by a flag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockProof {
    pub valid: bool,
    pub height: Height,
    pub header_hash: Vec<u8>,
}

impl MockProof {
    pub const TYPE: ProofType = ProofType::from_static("mockProof");

    /// A proof about the header at height 1.
    pub fn new(valid: bool) -> Self {
        Self {
            valid,
            height: Height::INITIAL,
            header_hash: b"hash".to_vec(),
        }
    }

    /// A proof about the given header.
    pub fn for_header(header: &ExtendedHeader, valid: bool) -> Self {
        Self {
            valid,
            height: header.height(),
            header_hash: header.hash().as_bytes().to_vec(),
        }
    }
}

impl Proof for MockProof {
    fn proof_type(&self) -> ProofType {
        Self::TYPE
    }

    fn header_hash(&self) -> &[u8] {
        &self.header_hash
    }

    fn height(&self) -> Height {
        self.height
    }

    fn validate(&self, _header: &ExtendedHeader) -> Result<(), BoxError> {
        if self.valid {
            Ok(())
        } else {
            Err("mock proof is invalid".into())
        }
    }

    fn encode(&self) -> Result<Bytes, BoxError> {
        Ok(serde_json::to_vec(self)?.into())
    }
}

impl DecodableProof for MockProof {
    const PROOF_TYPE: ProofType = Self::TYPE;

    fn decode(bytes: &[u8]) -> Result<Self, BoxError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
