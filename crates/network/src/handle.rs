use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use sentinel_exchange::{PeerEvent, Request, Response, Transport, TransportError};
use sentinel_fraud::{Message, PubSub, PubSubError};

use crate::{CtrlMsg, Multiaddr, PeerId, Shared};

/// Handle to the swarm task started by [`spawn`](crate::spawn).
#[derive(Clone)]
pub struct Handle {
    peer_id: PeerId,
    tx_ctrl: mpsc::Sender<CtrlMsg>,
    shared: Shared,
    task_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Handle {
    pub(crate) fn new(
        peer_id: PeerId,
        tx_ctrl: mpsc::Sender<CtrlMsg>,
        shared: Shared,
        task_handle: JoinHandle<()>,
    ) -> Self {
        Self {
            peer_id,
            tx_ctrl,
            shared,
            task_handle: Arc::new(Mutex::new(Some(task_handle))),
        }
    }

    pub fn local_peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// Addresses the node currently listens on.
    pub fn listen_addrs(&self) -> Vec<Multiaddr> {
        self.shared.listen_addrs.borrow().clone()
    }

    /// Wait until the node listens on at least one address and return it.
    pub async fn wait_until_listening(&self) -> Option<Multiaddr> {
        let mut rx = self.shared.listen_addrs.subscribe();
        let addrs = rx.wait_for(|addrs| !addrs.is_empty()).await.ok()?;
        addrs.first().cloned()
    }

    pub async fn dial(&self, addr: Multiaddr) -> Result<(), TransportError> {
        self.tx_ctrl
            .send(CtrlMsg::Dial(addr))
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Stop the swarm task and wait for it to finish.
    pub async fn shutdown(&self) {
        let Some(task_handle) = self.task_handle.lock().await.take() else {
            return;
        };

        let _ = self.tx_ctrl.send(CtrlMsg::Shutdown).await;
        let _ = task_handle.await;
    }

    async fn call<T, E>(
        &self,
        msg: impl FnOnce(oneshot::Sender<Result<T, E>>) -> CtrlMsg,
        closed: impl Fn() -> E,
    ) -> Result<T, E> {
        let (reply, rx) = oneshot::channel();

        self.tx_ctrl
            .send(msg(reply))
            .await
            .map_err(|_| closed())?;

        rx.await.map_err(|_| closed())?
    }
}

#[async_trait]
impl Transport for Handle {
    async fn request(&self, peer: PeerId, request: Request) -> Result<Response, TransportError> {
        self.call(
            |reply| CtrlMsg::Request {
                peer,
                request,
                reply,
            },
            || TransportError::Closed,
        )
        .await
    }

    fn connected_peers(&self) -> Vec<PeerId> {
        let peers = self.shared.peers.read().expect("poisoned lock");
        peers.iter().copied().collect()
    }

    fn peer_events(&self) -> broadcast::Receiver<PeerEvent> {
        self.shared.events.subscribe()
    }
}

#[async_trait]
impl PubSub for Handle {
    async fn publish(&self, topic: &str, data: Bytes) -> Result<(), PubSubError> {
        let topic = topic.to_string();

        self.call(
            |reply| CtrlMsg::Publish { topic, data, reply },
            || PubSubError::Closed,
        )
        .await
    }

    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<Message>, PubSubError> {
        let topic = topic.to_string();

        self.call(
            |reply| CtrlMsg::Subscribe { topic, reply },
            || PubSubError::Closed,
        )
        .await
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), PubSubError> {
        let topic = topic.to_string();

        self.call(
            |reply| CtrlMsg::Unsubscribe { topic, reply },
            || PubSubError::Closed,
        )
        .await
    }
}
