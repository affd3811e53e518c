use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use sentinel_core_types::BoxError;

use crate::{DecodableProof, Error, Proof, ProofType};

type DecodeFn = fn(&[u8]) -> Result<Arc<dyn Proof>, BoxError>;

fn decode_as<P: DecodableProof>(bytes: &[u8]) -> Result<Arc<dyn Proof>, BoxError> {
    let proof = P::decode(bytes)?;
    Ok(Arc::new(proof))
}

/// Decoders of every known proof type.
///
/// Types may be registered at any time, including while proofs are being decoded.
#[derive(Default)]
pub struct Registry {
    decoders: RwLock<HashMap<ProofType, DecodeFn>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: DecodableProof>(&self) -> Result<(), Error> {
        let mut decoders = self.decoders.write().expect("poisoned lock");

        if decoders.contains_key(&P::PROOF_TYPE) {
            return Err(Error::AlreadyRegistered(P::PROOF_TYPE));
        }

        debug!(proof_type = %P::PROOF_TYPE, "Registered proof type");
        decoders.insert(P::PROOF_TYPE, decode_as::<P>);

        Ok(())
    }

    /// Register `P` unless its type already has a decoder. Returns whether it was registered.
    pub fn register_if_absent<P: DecodableProof>(&self) -> bool {
        self.register::<P>().is_ok()
    }

    pub fn is_registered(&self, proof_type: &ProofType) -> bool {
        self.decoders
            .read()
            .expect("poisoned lock")
            .contains_key(proof_type)
    }

    pub fn proof_types(&self) -> Vec<ProofType> {
        let mut types: Vec<_> = self
            .decoders
            .read()
            .expect("poisoned lock")
            .keys()
            .cloned()
            .collect();

        types.sort();
        types
    }

    pub fn decode(&self, proof_type: &ProofType, bytes: &[u8]) -> Result<Arc<dyn Proof>, Error> {
        let decode = self
            .decoders
            .read()
            .expect("poisoned lock")
            .get(proof_type)
            .copied()
            .ok_or_else(|| Error::UnknownType(proof_type.clone()))?;

        decode(bytes).map_err(Error::Decode)
    }
}

impl core::fmt::Debug for Registry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Registry")
            .field("proof_types", &self.proof_types())
            .finish()
    }
}
