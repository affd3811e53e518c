use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::ProofType;

/// Name of the topic proofs of the given type are published on.
pub fn topic(network_id: &str, proof_type: &ProofType) -> String {
    format!("/{network_id}/fraud-proof/{proof_type}/v0.0.1")
}

/// Verdict on an inbound message, reported back to the pub/sub layer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Acceptance {
    /// The message is valid and may be relayed
    Accept,

    /// The message is invalid, it must not be relayed and its sender may be penalized
    Reject,

    /// The message cannot be judged, it must not be relayed
    Ignore,
}

/// An inbound pub/sub message.
///
/// Messages received from the network carry a reply slot which the
/// recipient uses to report its verdict. Dropping a message without
/// reporting is the same as [`Acceptance::Ignore`].
#[derive(Debug)]
pub struct Message {
    pub data: Bytes,
    reply: Option<oneshot::Sender<Acceptance>>,
}

impl Message {
    /// A message that expects no verdict, such as one published locally.
    pub fn new(data: Bytes) -> Self {
        Self { data, reply: None }
    }

    /// A message along with the receiver of its verdict.
    pub fn with_reply(data: Bytes) -> (Self, oneshot::Receiver<Acceptance>) {
        let (tx, rx) = oneshot::channel();

        let message = Self {
            data,
            reply: Some(tx),
        };

        (message, rx)
    }

    pub fn report(&mut self, acceptance: Acceptance) {
        if let Some(reply) = self.reply.take() {
            let _ = reply.send(acceptance);
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PubSubError {
    #[error("Failed to publish on {topic}: {reason}")]
    Publish { topic: String, reason: String },

    #[error("Failed to subscribe to {topic}: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("Pub/sub is shut down")]
    Closed,
}

/// Topic based publish/subscribe.
///
/// Messages published by this node are also delivered to its own
/// subscribers of the topic.
#[async_trait]
pub trait PubSub: Send + Sync + 'static {
    async fn publish(&self, topic: &str, data: Bytes) -> Result<(), PubSubError>;

    /// Join a topic. The returned channel ends when the topic is left.
    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<Message>, PubSubError>;

    async fn unsubscribe(&self, topic: &str) -> Result<(), PubSubError>;
}
