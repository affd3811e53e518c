use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::{PeerId, Request, Response};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PeerEvent {
    Connected(PeerId),
    Disconnected(PeerId),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Request to {peer} failed: {reason}")]
    RequestFailed { peer: PeerId, reason: String },

    #[error("Transport is shut down")]
    Closed,
}

/// Outbound side of the header exchange protocol.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send a request to a peer and wait for its response.
    ///
    /// Implementations are not required to time out,
    /// the client bounds every call by its own deadline.
    async fn request(&self, peer: PeerId, request: Request) -> Result<Response, TransportError>;

    /// Peers currently connected.
    fn connected_peers(&self) -> Vec<PeerId>;

    /// Stream of peer connection events.
    fn peer_events(&self) -> broadcast::Receiver<PeerEvent>;
}
