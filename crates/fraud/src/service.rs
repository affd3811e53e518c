use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use bytes::Bytes;
use lru::LruCache;
use tokio::sync::{broadcast, mpsc, Mutex as AsyncMutex};
use tokio::task::{spawn_blocking, JoinHandle};
use tracing::{debug, error, info, trace, warn};

use sentinel_datastore::{Datastore, Key};

use crate::subscription::Subscription;
use crate::{
    topic, Acceptance, Error, HaltSignal, HeaderGetter, Message, Metrics, Params, Proof,
    ProofType, PubSub, Registry,
};

/// Number of delivered proofs remembered by each delivery loop
const SEEN_CAPACITY: usize = 4096;

/// State of the topic of one proof type, while it is joined.
struct Channel {
    sender: broadcast::Sender<Arc<dyn Proof>>,
    delivery: JoinHandle<()>,
    /// Joined by [`ProofService::start`], kept until [`ProofService::stop`]
    pinned: bool,
}

/// Validates proofs and persists the accepted ones.
#[derive(Clone)]
struct Verifier {
    getter: Arc<dyn HeaderGetter>,
    ds: Arc<dyn Datastore>,
    registry: Arc<Registry>,
    halt: Option<HaltSignal>,
    metrics: Metrics,
}

pub(crate) struct Inner {
    pubsub: Arc<dyn PubSub>,
    verifier: Verifier,
    params: Params,
    channels: AsyncMutex<HashMap<ProofType, Channel>>,
}

/// Publishes, receives and verifies fraud proofs.
#[derive(Clone)]
pub struct ProofService {
    inner: Arc<Inner>,
}

impl ProofService {
    pub fn new(
        pubsub: Arc<dyn PubSub>,
        getter: Arc<dyn HeaderGetter>,
        ds: Arc<dyn Datastore>,
        registry: Arc<Registry>,
        params: Params,
    ) -> Self {
        Self::with_metrics(pubsub, getter, ds, registry, params, Metrics::default())
    }

    pub fn with_metrics(
        pubsub: Arc<dyn PubSub>,
        getter: Arc<dyn HeaderGetter>,
        ds: Arc<dyn Datastore>,
        registry: Arc<Registry>,
        params: Params,
        metrics: Metrics,
    ) -> Self {
        let halt = params.halt_on_fraud.then(HaltSignal::new);

        let inner = Inner {
            pubsub,
            verifier: Verifier {
                getter,
                ds,
                registry,
                halt,
                metrics,
            },
            params,
            channels: AsyncMutex::new(HashMap::new()),
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn params(&self) -> &Params {
        &self.inner.params
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.verifier.registry
    }

    /// The signal raised by the first accepted proof, if halting is enabled.
    pub fn halt_signal(&self) -> Option<&HaltSignal> {
        self.inner.verifier.halt.as_ref()
    }

    /// Join the topics of every registered proof type, so that proofs are
    /// verified and relayed even without local subscribers.
    pub async fn start(&self) -> Result<(), Error> {
        let mut channels = self.inner.channels.lock().await;

        for proof_type in self.inner.verifier.registry.proof_types() {
            let channel = self.inner.join(&mut channels, &proof_type).await?;
            channel.pinned = true;
        }

        info!(topics = channels.len(), "Started fraud proof service");

        Ok(())
    }

    /// Leave every topic and close every subscription.
    ///
    /// Every topic is left even if leaving one of them fails,
    /// in which case the first error is returned.
    pub async fn stop(&self) -> Result<(), Error> {
        let mut channels = self.inner.channels.lock().await;
        let mut result = Ok(());

        for (proof_type, channel) in channels.drain() {
            channel.delivery.abort();

            let topic = topic(&self.inner.params.network_id, &proof_type);

            if let Err(e) = self.inner.pubsub.unsubscribe(&topic).await {
                warn!(%topic, "Failed to leave topic: {e}");

                if result.is_ok() {
                    result = Err(e.into());
                }
            }
        }

        info!("Stopped fraud proof service");

        result
    }

    /// Subscribe to the valid proofs of the given type.
    pub async fn subscribe(&self, proof_type: &ProofType) -> Result<Subscription, Error> {
        if !self.inner.verifier.registry.is_registered(proof_type) {
            return Err(Error::UnknownType(proof_type.clone()));
        }

        let mut channels = self.inner.channels.lock().await;
        let channel = self.inner.join(&mut channels, proof_type).await?;

        Ok(Subscription::new(
            proof_type.clone(),
            channel.sender.subscribe(),
            Arc::downgrade(&self.inner),
        ))
    }

    /// Validate a proof, persist it and publish it to the network.
    #[tracing::instrument(skip_all, fields(proof_type = %proof.proof_type(), height = %proof.height()))]
    pub async fn broadcast(&self, proof: Arc<dyn Proof>) -> Result<(), Error> {
        let proof_type = proof.proof_type();

        if !self.inner.verifier.registry.is_registered(&proof_type) {
            return Err(Error::UnknownType(proof_type));
        }

        self.inner.verifier.validate(proof.as_ref()).await?;

        let bytes = proof.encode().map_err(Error::Encode)?;

        // An already stored proof is published again,
        // so that retrying a broadcast whose publish failed still reaches the network
        self.inner
            .verifier
            .persist(proof.as_ref(), bytes.clone())
            .await?;

        let topic = topic(&self.inner.params.network_id, &proof_type);
        self.inner.pubsub.publish(&topic, bytes).await?;

        self.inner.verifier.metrics.proofs_broadcast.inc();
        info!("Broadcast fraud proof");

        Ok(())
    }

    /// Every persisted proof of the given type.
    pub async fn get(&self, proof_type: &ProofType) -> Result<Vec<Arc<dyn Proof>>, Error> {
        let prefix = proof_prefix(proof_type);
        let ds = Arc::clone(&self.inner.verifier.ds);
        let entries = spawn_blocking(move || ds.query_prefix(&prefix)).await??;

        entries
            .into_iter()
            .map(|(_, bytes)| self.inner.verifier.registry.decode(proof_type, &bytes))
            .collect()
    }
}

impl Inner {
    /// The channel of a proof type, joining its topic if needed.
    async fn join<'a>(
        &self,
        channels: &'a mut HashMap<ProofType, Channel>,
        proof_type: &ProofType,
    ) -> Result<&'a mut Channel, Error> {
        let stale = channels
            .get(proof_type)
            .is_some_and(|channel| channel.delivery.is_finished());

        if stale {
            channels.remove(proof_type);
        }

        if !channels.contains_key(proof_type) {
            let topic = topic(&self.params.network_id, proof_type);
            let messages = self.pubsub.subscribe(&topic).await?;

            debug!(%topic, "Joined fraud proof topic");

            let (sender, _) = broadcast::channel(self.params.subscription_capacity.max(1));

            let delivery = tokio::spawn(deliver(
                proof_type.clone(),
                messages,
                sender.clone(),
                self.verifier.clone(),
            ));

            channels.insert(
                proof_type.clone(),
                Channel {
                    sender,
                    delivery,
                    pinned: false,
                },
            );
        }

        channels
            .get_mut(proof_type)
            .ok_or_else(|| Error::UnknownType(proof_type.clone()))
    }

    /// Leave the topic of a proof type once it has no subscribers left.
    pub(crate) async fn release(&self, proof_type: &ProofType) {
        let mut channels = self.channels.lock().await;

        let idle = channels
            .get(proof_type)
            .is_some_and(|channel| !channel.pinned && channel.sender.receiver_count() == 0);

        if !idle {
            return;
        }

        if let Some(channel) = channels.remove(proof_type) {
            channel.delivery.abort();
        }

        let topic = topic(&self.params.network_id, proof_type);

        match self.pubsub.unsubscribe(&topic).await {
            Ok(()) => debug!(%topic, "Left fraud proof topic"),
            Err(e) => warn!(%topic, "Failed to leave topic: {e}"),
        }
    }
}

impl Verifier {
    async fn validate(&self, proof: &dyn Proof) -> Result<(), Error> {
        if proof.header_hash().is_empty() {
            return Err(Error::Validation("proof has an empty header hash".into()));
        }

        let height = proof.height();

        let header = self
            .getter
            .get_by_height(height)
            .await
            .map_err(Error::HeaderAccess)?
            .ok_or(Error::NotFound(height))?;

        proof.validate(&header).map_err(Error::Validation)
    }

    /// Persist a proof unless it is already stored. Returns whether it was written.
    async fn persist(&self, proof: &dyn Proof, bytes: Bytes) -> Result<bool, Error> {
        let key = proof_key(proof);
        let ds = Arc::clone(&self.ds);

        spawn_blocking(move || -> Result<bool, Error> {
            if ds.has(&key)? {
                return Ok(false);
            }

            ds.put(&key, bytes)?;
            Ok(true)
        })
        .await?
    }
}

/// Header hashes of the most recently delivered proofs.
struct Seen(LruCache<Vec<u8>, ()>);

impl Seen {
    fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self(LruCache::new(capacity))
    }

    fn contains(&mut self, hash: &[u8]) -> bool {
        self.0.get(hash).is_some()
    }

    fn insert(&mut self, hash: &[u8]) {
        self.0.put(hash.to_vec(), ());
    }
}

fn proof_prefix(proof_type: &ProofType) -> Key {
    Key::new("/fraud").child(proof_type.as_str())
}

fn proof_key(proof: &dyn Proof) -> Key {
    proof_prefix(&proof.proof_type()).child(hex::encode(proof.header_hash()))
}

/// Verify inbound proofs of one type and fan out the valid ones to local subscribers.
#[tracing::instrument(skip_all, fields(%proof_type))]
async fn deliver(
    proof_type: ProofType,
    mut messages: mpsc::Receiver<Message>,
    sender: broadcast::Sender<Arc<dyn Proof>>,
    verifier: Verifier,
) {
    let mut seen = Seen::new(SEEN_CAPACITY);

    while let Some(mut message) = messages.recv().await {
        verifier.metrics.proofs_received.inc();

        let proof = match verifier.registry.decode(&proof_type, &message.data) {
            Ok(proof) => proof,
            Err(e) => {
                debug!("Rejecting undecodable proof: {e}");
                verifier.metrics.proofs_rejected.inc();
                message.report(Acceptance::Reject);
                continue;
            }
        };

        match verifier.validate(proof.as_ref()).await {
            Ok(()) => {}
            Err(Error::NotFound(height)) => {
                debug!(%height, "Ignoring proof for unknown header");
                verifier.metrics.proofs_ignored.inc();
                message.report(Acceptance::Ignore);
                continue;
            }
            Err(Error::HeaderAccess(e)) => {
                error!("Failed to get header to validate proof: {e}");
                message.report(Acceptance::Ignore);
                continue;
            }
            Err(e) => {
                warn!(height = %proof.height(), "Rejecting invalid proof: {e}");
                verifier.metrics.proofs_rejected.inc();
                message.report(Acceptance::Reject);
                continue;
            }
        }

        if seen.contains(proof.header_hash()) {
            trace!(height = %proof.height(), "Proof already delivered");
            message.report(Acceptance::Accept);
            continue;
        }

        if let Some(halt) = &verifier.halt {
            halt.trigger(proof_type.clone(), proof.height());
        }

        // Unstored proofs are neither delivered nor remembered, so that the next copy is stored
        match verifier.persist(proof.as_ref(), message.data.clone()).await {
            Ok(true) => debug!(height = %proof.height(), "Stored fraud proof"),
            Ok(false) => {}
            Err(e) => {
                error!(height = %proof.height(), "Failed to store fraud proof: {e}");
                verifier.metrics.persist_failures.inc();
                message.report(Acceptance::Ignore);
                continue;
            }
        }

        seen.insert(proof.header_hash());
        message.report(Acceptance::Accept);
        verifier.metrics.proofs_accepted.inc();

        // No receivers only means that nobody is subscribed right now
        let _ = sender.send(proof);
    }

    debug!("Fraud proof topic closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seen_forgets_the_oldest_hashes() {
        let mut seen = Seen::new(2);

        seen.insert(b"a");
        seen.insert(b"b");
        assert!(seen.contains(b"a"));

        // "b" is now the least recently used
        seen.insert(b"c");

        assert!(seen.contains(b"a"));
        assert!(!seen.contains(b"b"));
        assert!(seen.contains(b"c"));
    }
}
