//! Header exchange protocol.
//!
//! The [`ExchangeServer`] answers header range requests from the local
//! [`Store`](sentinel_store::Store). The [`Exchange`] client fans out each
//! range request to several peers at once and only accepts headers that at
//! least [`ClientParams::min_responses`] peers agree on.

mod behaviour;
pub use behaviour::{Behaviour, Event};

mod client;
pub use client::Exchange;

mod codec;
pub use codec::Codec;

mod error;
pub use error::{Error, ResponseError};

mod metrics;
pub use metrics::Metrics;

mod params;
pub use params::{ClientParams, ServerParams};

mod peer_tracker;
pub use peer_tracker::{Outcome, PeerTracker, ScoringConfig};

mod server;
pub use server::ExchangeServer;

mod transport;
pub use transport::{PeerEvent, Transport, TransportError};

mod types;
pub use types::{PeerId, Request, Response, StatusCode};
