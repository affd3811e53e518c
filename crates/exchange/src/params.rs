use std::time::Duration;

use bytesize::ByteSize;

/// Upper bound on the encoded size of a header, used to estimate the size of a
/// response before it is produced.
pub(crate) const ESTIMATED_HEADER_SIZE: u64 = 512;

/// Parameters of the exchange [`Exchange`](crate::Exchange) client.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientParams {
    /// Number of peers that must return identical headers for a range to be accepted.
    /// Default: 2
    pub min_responses: usize,

    /// Upper bound on the size of a single request or response.
    /// Default: 512 KiB
    pub max_request_size: ByteSize,

    /// Upper bound on the number of headers asked for in one request.
    /// Ranges larger than this are split into chunks.
    /// Default: 64
    pub max_headers_per_request: u64,

    /// How long to wait for a peer to respond.
    /// Default: 10s
    pub max_awaiting_time: Duration,

    /// Score given to peers the first time they are seen.
    /// Default: 1.0
    pub default_score: f64,

    /// Maximum number of peers tracked at once.
    /// Default: 100
    pub max_peer_tracker_size: usize,

    /// Number of rounds, each with fresh peers, before giving up on a chunk.
    /// Default: 3
    pub max_attempts: usize,
}

impl Default for ClientParams {
    fn default() -> Self {
        Self {
            min_responses: 2,
            max_request_size: ByteSize::kib(512),
            max_headers_per_request: 64,
            max_awaiting_time: Duration::from_secs(10),
            default_score: 1.0,
            max_peer_tracker_size: 100,
            max_attempts: 3,
        }
    }
}

impl ClientParams {
    /// Number of headers asked for in one request, bounded by both
    /// [`Self::max_headers_per_request`] and [`Self::max_request_size`].
    pub fn headers_per_request(&self) -> u64 {
        let by_size = self.max_request_size.as_u64() / ESTIMATED_HEADER_SIZE;
        self.max_headers_per_request.min(by_size).max(1)
    }
}

/// Parameters of the [`ExchangeServer`](crate::ExchangeServer).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerParams {
    /// Deadline for writing a response to an inbound stream.
    /// Default: 8s
    pub write_deadline: Duration,

    /// Deadline for reading a request from an inbound stream.
    /// Default: 60s
    pub read_deadline: Duration,

    /// Upper bound on the size of a single request or response.
    /// Default: 512 KiB
    pub max_request_size: ByteSize,

    /// Upper bound on the number of headers served for one request.
    /// Default: 64
    pub max_headers_per_request: u64,
}

impl Default for ServerParams {
    fn default() -> Self {
        Self {
            write_deadline: Duration::from_secs(8),
            read_deadline: Duration::from_secs(60),
            max_request_size: ByteSize::kib(512),
            max_headers_per_request: 64,
        }
    }
}
