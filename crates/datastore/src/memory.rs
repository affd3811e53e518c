use std::collections::BTreeMap;
use std::sync::RwLock;

use bytes::Bytes;

use crate::{Batch, Datastore, Error, Key};

/// A thread-safe in-memory datastore, the default for light nodes and tests.
#[derive(Debug, Default)]
pub struct MemoryDatastore {
    entries: RwLock<BTreeMap<Key, Bytes>>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("poisoned lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Datastore for MemoryDatastore {
    fn put(&self, key: &Key, value: Bytes) -> Result<(), Error> {
        self.entries
            .write()
            .expect("poisoned lock")
            .insert(key.clone(), value);

        Ok(())
    }

    fn get(&self, key: &Key) -> Result<Option<Bytes>, Error> {
        Ok(self.entries.read().expect("poisoned lock").get(key).cloned())
    }

    fn has(&self, key: &Key) -> Result<bool, Error> {
        Ok(self.entries.read().expect("poisoned lock").contains_key(key))
    }

    fn delete(&self, key: &Key) -> Result<(), Error> {
        self.entries.write().expect("poisoned lock").remove(key);
        Ok(())
    }

    fn put_batch(&self, batch: Batch) -> Result<(), Error> {
        let mut entries = self.entries.write().expect("poisoned lock");
        entries.extend(batch.into_ops());
        Ok(())
    }

    fn query_prefix(&self, prefix: &Key) -> Result<Vec<(Key, Bytes)>, Error> {
        let entries = self.entries.read().expect("poisoned lock");

        let result = entries
            .range(prefix.clone()..)
            .skip_while(|(key, _)| *key == prefix)
            .take_while(|(key, _)| key.as_str().starts_with(prefix.as_str()))
            .filter(|(key, _)| key.is_descendant_of(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(result)
    }
}
