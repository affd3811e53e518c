use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use sentinel_fraud::{Acceptance, Message, PubSub, PubSubError};

type NodeId = usize;

/// Topics shared by a set of [`MemoryPubSub`] nodes.
#[derive(Debug, Default)]
pub struct MemoryNetwork {
    topics: Mutex<HashMap<String, Vec<(NodeId, mpsc::Sender<Message>)>>>,
    next_id: AtomicUsize,
}

impl MemoryNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of nodes subscribed to the topic.
    pub fn subscribers(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .expect("poisoned lock")
            .get(topic)
            .map_or(0, |subs| subs.iter().filter(|(_, tx)| !tx.is_closed()).count())
    }

    fn senders(&self, topic: &str) -> Vec<(NodeId, mpsc::Sender<Message>)> {
        self.topics
            .lock()
            .expect("poisoned lock")
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }
}

/// In-memory pub/sub node.
///
/// Every published message is delivered to all subscribers of the topic,
/// on every node of the network, including the publisher.
#[derive(Clone, Debug)]
pub struct MemoryPubSub {
    id: NodeId,
    network: Arc<MemoryNetwork>,
    faults: Arc<Faults>,
}

#[derive(Debug, Default)]
struct Faults {
    publish: AtomicBool,
    unsubscribe: AtomicBool,
}

impl MemoryPubSub {
    /// A node on its own network.
    pub fn new() -> Self {
        Self::join(&MemoryNetwork::new())
    }

    pub fn join(network: &Arc<MemoryNetwork>) -> Self {
        Self {
            id: network.next_id.fetch_add(1, Ordering::Relaxed),
            network: Arc::clone(network),
            faults: Arc::default(),
        }
    }

    pub fn network(&self) -> &Arc<MemoryNetwork> {
        &self.network
    }

    /// Make publishing from this node fail, or succeed again.
    pub fn fail_publish(&self, failing: bool) {
        self.faults.publish.store(failing, Ordering::SeqCst);
    }

    /// Make leaving a topic fail, or succeed again.
    ///
    /// A failed unsubscribe still leaves the topic.
    pub fn fail_unsubscribe(&self, failing: bool) {
        self.faults.unsubscribe.store(failing, Ordering::SeqCst);
    }

    /// Deliver a message to the subscribers of this node as if it came from a remote peer.
    ///
    /// Returns the receiver of the verdict of each local subscriber.
    pub async fn inject(&self, topic: &str, data: Bytes) -> Vec<oneshot::Receiver<Acceptance>> {
        let mut verdicts = Vec::new();

        for (id, tx) in self.network.senders(topic) {
            if id != self.id {
                continue;
            }

            let (message, verdict) = Message::with_reply(data.clone());
            if tx.send(message).await.is_ok() {
                verdicts.push(verdict);
            }
        }

        verdicts
    }
}

impl Default for MemoryPubSub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PubSub for MemoryPubSub {
    async fn publish(&self, topic: &str, data: Bytes) -> Result<(), PubSubError> {
        if self.faults.publish.load(Ordering::SeqCst) {
            return Err(PubSubError::Publish {
                topic: topic.to_string(),
                reason: "injected failure".to_string(),
            });
        }

        for (id, tx) in self.network.senders(topic) {
            let message = if id == self.id {
                Message::new(data.clone())
            } else {
                Message::with_reply(data.clone()).0
            };

            let _ = tx.send(message).await;
        }

        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<Message>, PubSubError> {
        let (tx, rx) = mpsc::channel(64);

        let mut topics = self.network.topics.lock().expect("poisoned lock");
        let subs = topics.entry(topic.to_string()).or_default();

        subs.retain(|(id, _)| *id != self.id);
        subs.push((self.id, tx));

        Ok(rx)
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), PubSubError> {
        let mut topics = self.network.topics.lock().expect("poisoned lock");

        if let Some(subs) = topics.get_mut(topic) {
            subs.retain(|(id, _)| *id != self.id);
        }

        if self.faults.unsubscribe.load(Ordering::SeqCst) {
            return Err(PubSubError::Closed);
        }

        Ok(())
    }
}
