//! Key-value datastore contract used to persist headers and fraud proofs.
//!
//! Keys are hierarchical, slash-separated paths such as
//! `/fraud/badEncoding/4fa1...`. Backends must return the entries of a
//! prefix query in ascending key order.

use std::sync::Arc;

use bytes::Bytes;

mod key;
pub use key::Key;

mod memory;
pub use memory::MemoryDatastore;

mod persistent;
pub use persistent::RedbDatastore;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Datastore backend error: {0}")]
    Backend(String),

    #[error("Datastore is closed")]
    Closed,
}

/// A set of writes applied atomically by [`Datastore::put_batch`].
#[derive(Clone, Debug, Default)]
pub struct Batch {
    ops: Vec<(Key, Bytes)>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ops: Vec::with_capacity(capacity),
        }
    }

    pub fn put(&mut self, key: Key, value: impl Into<Bytes>) -> &mut Self {
        self.ops.push((key, value.into()));
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<(Key, Bytes)> {
        self.ops
    }
}

pub trait Datastore: Send + Sync + 'static {
    fn put(&self, key: &Key, value: Bytes) -> Result<(), Error>;

    fn get(&self, key: &Key) -> Result<Option<Bytes>, Error>;

    fn has(&self, key: &Key) -> Result<bool, Error> {
        Ok(self.get(key)?.is_some())
    }

    fn delete(&self, key: &Key) -> Result<(), Error>;

    fn put_batch(&self, batch: Batch) -> Result<(), Error>;

    /// All entries whose key is a descendant of `prefix`, in ascending key order.
    fn query_prefix(&self, prefix: &Key) -> Result<Vec<(Key, Bytes)>, Error>;
}

impl<D: Datastore + ?Sized> Datastore for Arc<D> {
    fn put(&self, key: &Key, value: Bytes) -> Result<(), Error> {
        (**self).put(key, value)
    }

    fn get(&self, key: &Key) -> Result<Option<Bytes>, Error> {
        (**self).get(key)
    }

    fn has(&self, key: &Key) -> Result<bool, Error> {
        (**self).has(key)
    }

    fn delete(&self, key: &Key) -> Result<(), Error> {
        (**self).delete(key)
    }

    fn put_batch(&self, batch: Batch) -> Result<(), Error> {
        (**self).put_batch(batch)
    }

    fn query_prefix(&self, prefix: &Key) -> Result<Vec<(Key, Bytes)>, Error> {
        (**self).query_prefix(prefix)
    }
}
