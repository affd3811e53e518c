/// Parameters of the [`ProofService`](crate::ProofService).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Params {
    /// Network the proofs are exchanged on, part of every topic name.
    /// Default: "sentinel"
    pub network_id: String,

    /// Whether the first valid proof raises the [`HaltSignal`](crate::HaltSignal).
    /// Default: true
    pub halt_on_fraud: bool,

    /// Number of proofs buffered per subscription before a slow subscriber misses some.
    /// Default: 64
    pub subscription_capacity: usize,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            network_id: "sentinel".to_string(),
            halt_on_fraud: true,
            subscription_capacity: 64,
        }
    }
}
