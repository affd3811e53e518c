use sentinel_metrics::{Counter, SharedRegistry};

#[derive(Clone, Debug, Default)]
pub struct Metrics {
    /// Number of proofs broadcast by this node
    pub proofs_broadcast: Counter,

    /// Number of proofs received from the network
    pub proofs_received: Counter,

    /// Number of received proofs that were accepted
    pub proofs_accepted: Counter,

    /// Number of received proofs that failed decoding or validation
    pub proofs_rejected: Counter,

    /// Number of received proofs ignored because their header is unknown
    pub proofs_ignored: Counter,

    /// Number of valid proofs that could not be stored
    pub persist_failures: Counter,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(registry: &SharedRegistry) -> Self {
        let metrics = Self::new();

        registry.with_prefix("fraud", |registry| {
            registry.register(
                "proofs_broadcast",
                "Number of proofs broadcast by this node",
                metrics.proofs_broadcast.clone(),
            );

            registry.register(
                "proofs_received",
                "Number of proofs received from the network",
                metrics.proofs_received.clone(),
            );

            registry.register(
                "proofs_accepted",
                "Number of received proofs that were accepted",
                metrics.proofs_accepted.clone(),
            );

            registry.register(
                "proofs_rejected",
                "Number of received proofs that failed decoding or validation",
                metrics.proofs_rejected.clone(),
            );

            registry.register(
                "proofs_ignored",
                "Number of received proofs ignored because their header is unknown",
                metrics.proofs_ignored.clone(),
            );

            registry.register(
                "persist_failures",
                "Number of valid proofs that could not be stored",
                metrics.persist_failures.clone(),
            );
        });

        metrics
    }
}
