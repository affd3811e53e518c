use core::fmt;
use std::borrow::Cow;

use bytes::Bytes;

use sentinel_core_types::{BoxError, ExtendedHeader, Height};

/// Name of a fraud proof variant.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProofType(Cow<'static, str>);

impl ProofType {
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProofType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ProofType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProofType({})", self.0)
    }
}

/// Evidence that a header is invalid.
pub trait Proof: Send + Sync + fmt::Debug + 'static {
    fn proof_type(&self) -> ProofType;

    /// Hash of the header this proof is about.
    fn header_hash(&self) -> &[u8];

    /// Height of the header this proof is about.
    fn height(&self) -> Height;

    /// Check the proof against the header at [`Proof::height`].
    fn validate(&self, header: &ExtendedHeader) -> Result<(), BoxError>;

    fn encode(&self) -> Result<Bytes, BoxError>;
}

/// A [`Proof`] variant that can be installed in a [`Registry`](crate::Registry).
pub trait DecodableProof: Proof + Sized {
    const PROOF_TYPE: ProofType;

    fn decode(bytes: &[u8]) -> Result<Self, BoxError>;
}
