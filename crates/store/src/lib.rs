//! Cached, height-indexed, append-only header chain.
//!
//! Headers must be appended contiguously: a header is only accepted if it
//! is the direct successor of the current head. Writes are buffered in
//! memory and flushed to the datastore in batches of
//! [`Params::write_batch_size`] headers, periodically by a background task,
//! and on [`Store::stop`].

mod error;
pub use error::Error;

mod keys;

mod metrics;
pub use metrics::Metrics;

mod params;
pub use params::Params;

mod store;
pub use store::Store;
