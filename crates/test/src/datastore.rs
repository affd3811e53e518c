use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use sentinel_datastore::{Batch, Datastore, Error, Key, MemoryDatastore};

/// An in-memory datastore whose reads and writes can be made to fail.
///
/// Clones share both the entries and the failure switch.
#[derive(Clone, Debug, Default)]
pub struct FlakyDatastore {
    inner: Arc<MemoryDatastore>,
    failing: Arc<AtomicBool>,
}

impl FlakyDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail, or succeed again.
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of stored entries, whether or not the store is failing.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self) -> Result<(), Error> {
        if self.failing.load(Ordering::SeqCst) {
            Err(Error::Backend("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Datastore for FlakyDatastore {
    fn put(&self, key: &Key, value: Bytes) -> Result<(), Error> {
        self.check()?;
        self.inner.put(key, value)
    }

    fn get(&self, key: &Key) -> Result<Option<Bytes>, Error> {
        self.check()?;
        self.inner.get(key)
    }

    fn has(&self, key: &Key) -> Result<bool, Error> {
        self.check()?;
        self.inner.has(key)
    }

    fn delete(&self, key: &Key) -> Result<(), Error> {
        self.check()?;
        self.inner.delete(key)
    }

    fn put_batch(&self, batch: Batch) -> Result<(), Error> {
        self.check()?;
        self.inner.put_batch(batch)
    }

    fn query_prefix(&self, prefix: &Key) -> Result<Vec<(Key, Bytes)>, Error> {
        self.check()?;
        self.inner.query_prefix(prefix)
    }
}
