//! Fraud proof dissemination and verification.
//!
//! Proof variants are registered in a [`Registry`] by their [`ProofType`].
//! The [`ProofService`] publishes locally produced proofs on a per-type
//! pub/sub topic and validates every inbound proof against the header it
//! refers to before accepting it. Accepted proofs are persisted, delivered
//! to local [`Subscription`]s and, when enabled, raise a [`HaltSignal`].

mod error;
pub use error::Error;

mod getter;
pub use getter::HeaderGetter;

mod halt;
pub use halt::{Halt, HaltSignal};

mod metrics;
pub use metrics::Metrics;

mod params;
pub use params::Params;

mod proof;
pub use proof::{DecodableProof, Proof, ProofType};

mod pubsub;
pub use pubsub::{topic, Acceptance, Message, PubSub, PubSubError};

mod registry;
pub use registry::Registry;

mod service;
pub use service::ProofService;

mod subscription;
pub use subscription::Subscription;
