use borsh::{BorshDeserialize, BorshSerialize};

use sentinel_core_types::{ExtendedHeader, Hash, Height};

pub use libp2p::PeerId;

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum Request {
    /// The current head of the peer
    Head,

    /// `amount` contiguous headers, starting at `start`
    Range { start: Height, amount: u64 },

    /// Headers with the given hashes
    Hashes(Vec<Hash>),
}

impl Request {
    pub fn range(start: Height, amount: u64) -> Self {
        Self::Range { start, amount }
    }

    /// Number of headers requested.
    pub fn count(&self) -> u64 {
        match self {
            Self::Head => 1,
            Self::Range { amount, .. } => *amount,
            Self::Hashes(hashes) => hashes.len() as u64,
        }
    }

    pub fn encode(&self) -> std::io::Result<Vec<u8>> {
        borsh::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> std::io::Result<Self> {
        borsh::from_slice(bytes)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum StatusCode {
    Ok,

    /// The peer has no headers above the given height, which is its head.
    /// The response holds the headers it does have.
    NotFoundAbove(Height),

    /// One of the requested hashes is unknown to the peer
    NotFound,

    /// The request exceeded the limits of the peer
    LimitExceeded,

    Internal,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Response {
    pub status: StatusCode,
    pub headers: Vec<ExtendedHeader>,
}

impl Response {
    pub fn new(status: StatusCode, headers: Vec<ExtendedHeader>) -> Self {
        Self { status, headers }
    }

    pub fn ok(headers: Vec<ExtendedHeader>) -> Self {
        Self::new(StatusCode::Ok, headers)
    }

    pub fn status(status: StatusCode) -> Self {
        Self::new(status, Vec::new())
    }

    pub fn encode(&self) -> std::io::Result<Vec<u8>> {
        borsh::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> std::io::Result<Self> {
        borsh::from_slice(bytes)
    }
}
