use std::sync::Arc;

use tokio::sync::watch;
use tracing::warn;

use sentinel_core_types::Height;

use crate::ProofType;

/// The proof that caused the node to halt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Halt {
    pub proof_type: ProofType,
    pub height: Height,
}

/// Signals the syncer to stop once a valid fraud proof has been accepted.
///
/// Only the first proof triggers the signal.
#[derive(Clone, Debug)]
pub struct HaltSignal {
    tx: Arc<watch::Sender<Option<Halt>>>,
}

impl HaltSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Raise the signal. Returns `false` if it was already raised.
    pub fn trigger(&self, proof_type: ProofType, height: Height) -> bool {
        self.tx.send_if_modified(|halt| {
            if halt.is_some() {
                return false;
            }

            warn!(%proof_type, %height, "Valid fraud proof received, halting");
            *halt = Some(Halt { proof_type, height });
            true
        })
    }

    pub fn get(&self) -> Option<Halt> {
        self.tx.borrow().clone()
    }

    pub fn is_halted(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Wait until the signal is raised.
    pub async fn halted(&self) -> Halt {
        let mut rx = self.tx.subscribe();

        let halt = rx.wait_for(Option::is_some).await.ok().and_then(|h| h.clone());

        // The sender lives as long as `self`, so waiting cannot fail
        match halt {
            Some(halt) => halt,
            None => std::future::pending().await,
        }
    }
}

impl Default for HaltSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn only_the_first_proof_halts() {
        let signal = HaltSignal::new();
        let waiter = signal.clone();

        let handle = tokio::spawn(async move { waiter.halted().await });

        assert!(signal.trigger(ProofType::from_static("badEncoding"), Height::new(5)));
        assert!(!signal.trigger(ProofType::from_static("other"), Height::new(6)));

        let halt = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(halt.proof_type, ProofType::from_static("badEncoding"));
        assert_eq!(halt.height, Height::new(5));
        assert_eq!(signal.get(), Some(halt));
    }
}
