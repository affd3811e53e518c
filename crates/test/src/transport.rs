use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use tokio::sync::broadcast;

use sentinel_exchange::{
    ExchangeServer, PeerEvent, PeerId, Request, Response, Transport, TransportError,
};

/// How a simulated peer answers requests.
#[derive(Clone)]
pub enum Peer {
    /// Answers from its own store
    Serving(ExchangeServer),

    /// Never answers
    Silent,

    /// Fails every request
    Failing,
}

/// In-memory [`Transport`] to a set of simulated peers.
pub struct MemoryTransport {
    peers: RwLock<HashMap<PeerId, Peer>>,
    events: broadcast::Sender<PeerEvent>,
    requests: AtomicUsize,
}

impl MemoryTransport {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);

        Self {
            peers: RwLock::new(HashMap::new()),
            events,
            requests: AtomicUsize::new(0),
        }
    }

    /// Connect a new peer.
    pub fn add_peer(&self, peer: Peer) -> PeerId {
        let id = PeerId::random();

        self.peers
            .write()
            .expect("poisoned lock")
            .insert(id, peer);

        let _ = self.events.send(PeerEvent::Connected(id));

        id
    }

    pub fn remove_peer(&self, id: &PeerId) {
        if self
            .peers
            .write()
            .expect("poisoned lock")
            .remove(id)
            .is_some()
        {
            let _ = self.events.send(PeerEvent::Disconnected(*id));
        }
    }

    /// Number of requests sent so far.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn request(&self, peer: PeerId, request: Request) -> Result<Response, TransportError> {
        self.requests.fetch_add(1, Ordering::Relaxed);

        let behaviour = self.peers.read().expect("poisoned lock").get(&peer).cloned();

        match behaviour {
            Some(Peer::Serving(server)) => Ok(server.respond(request).await),
            Some(Peer::Silent) => std::future::pending().await,
            Some(Peer::Failing) => Err(TransportError::RequestFailed {
                peer,
                reason: "connection reset".to_string(),
            }),
            None => Err(TransportError::RequestFailed {
                peer,
                reason: "not connected".to_string(),
            }),
        }
    }

    fn connected_peers(&self) -> Vec<PeerId> {
        self.peers
            .read()
            .expect("poisoned lock")
            .keys()
            .copied()
            .collect()
    }

    fn peer_events(&self) -> broadcast::Receiver<PeerEvent> {
        self.events.subscribe()
    }
}
