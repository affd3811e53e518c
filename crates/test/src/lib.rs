//! Test utilities shared by the Sentinel crates.

mod datastore;
pub use datastore::FlakyDatastore;

mod headers;
pub use headers::{memory_store, HeaderSuite};

mod logging;
pub use logging::init_logging;

mod proof;
pub use proof::MockProof;

mod pubsub;
pub use pubsub::{MemoryNetwork, MemoryPubSub};

mod transport;
pub use transport::{MemoryTransport, Peer};
