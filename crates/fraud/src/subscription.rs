use std::sync::{Arc, Weak};

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use crate::service::Inner;
use crate::{Proof, ProofType};

/// Valid proofs of one type, as they are received.
///
/// Ends once the [`ProofService`](crate::ProofService) stops.
/// Dropping the last subscription of a type leaves its topic,
/// unless the service joined it on start.
pub struct Subscription {
    proof_type: ProofType,
    rx: Option<broadcast::Receiver<Arc<dyn Proof>>>,
    service: Weak<Inner>,
}

impl Subscription {
    pub(crate) fn new(
        proof_type: ProofType,
        rx: broadcast::Receiver<Arc<dyn Proof>>,
        service: Weak<Inner>,
    ) -> Self {
        Self {
            proof_type,
            rx: Some(rx),
            service,
        }
    }

    pub fn proof_type(&self) -> &ProofType {
        &self.proof_type
    }

    /// The next valid proof, or `None` once the subscription is closed.
    pub async fn next(&mut self) -> Option<Arc<dyn Proof>> {
        let rx = self.rx.as_mut()?;

        loop {
            match rx.recv().await {
                Ok(proof) => return Some(proof),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(proof_type = %self.proof_type, skipped, "Subscriber is lagging, proofs were dropped");
                }
                Err(RecvError::Closed) => {
                    self.rx = None;
                    return None;
                }
            }
        }
    }

    /// Close the subscription, leaving the topic if it was the last one.
    pub async fn cancel(mut self) {
        drop(self.rx.take());

        if let Some(service) = self.service.upgrade() {
            service.release(&self.proof_type).await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.rx.take().is_none() {
            return;
        }

        let Some(service) = self.service.upgrade() else {
            return;
        };

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let proof_type = self.proof_type.clone();
            runtime.spawn(async move { service.release(&proof_type).await });
        }
    }
}
