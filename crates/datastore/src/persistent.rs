use std::path::Path;

use bytes::Bytes;
use redb::{Database, ReadableTable, TableDefinition};
use tracing::debug;

use crate::{Batch, Datastore, Error, Key};

const ENTRIES: TableDefinition<&str, &[u8]> = TableDefinition::new("entries");

/// A durable datastore backed by a single redb database file.
pub struct RedbDatastore {
    db: Database,
}

fn backend<E: Into<redb::Error>>(e: E) -> Error {
    Error::Backend(e.into().to_string())
}

impl RedbDatastore {
    /// Open the database at `path`, creating it if it does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let db = Database::create(path).map_err(backend)?;

        // Make sure the table exists so that read transactions never fail on a fresh database
        let tx = db.begin_write().map_err(backend)?;
        tx.open_table(ENTRIES).map_err(backend)?;
        tx.commit().map_err(backend)?;

        debug!(path = %path.display(), "Opened datastore");

        Ok(Self { db })
    }
}

impl Datastore for RedbDatastore {
    fn put(&self, key: &Key, value: Bytes) -> Result<(), Error> {
        let tx = self.db.begin_write().map_err(backend)?;
        {
            let mut table = tx.open_table(ENTRIES).map_err(backend)?;
            table
                .insert(key.as_str(), value.as_ref())
                .map_err(backend)?;
        }
        tx.commit().map_err(backend)
    }

    fn get(&self, key: &Key) -> Result<Option<Bytes>, Error> {
        let tx = self.db.begin_read().map_err(backend)?;
        let table = tx.open_table(ENTRIES).map_err(backend)?;
        let value = table.get(key.as_str()).map_err(backend)?;

        Ok(value.map(|v| Bytes::copy_from_slice(v.value())))
    }

    fn delete(&self, key: &Key) -> Result<(), Error> {
        let tx = self.db.begin_write().map_err(backend)?;
        {
            let mut table = tx.open_table(ENTRIES).map_err(backend)?;
            table.remove(key.as_str()).map_err(backend)?;
        }
        tx.commit().map_err(backend)
    }

    fn put_batch(&self, batch: Batch) -> Result<(), Error> {
        if batch.is_empty() {
            return Ok(());
        }

        let tx = self.db.begin_write().map_err(backend)?;
        {
            let mut table = tx.open_table(ENTRIES).map_err(backend)?;
            for (key, value) in batch.into_ops() {
                table
                    .insert(key.as_str(), value.as_ref())
                    .map_err(backend)?;
            }
        }
        tx.commit().map_err(backend)
    }

    fn query_prefix(&self, prefix: &Key) -> Result<Vec<(Key, Bytes)>, Error> {
        let tx = self.db.begin_read().map_err(backend)?;
        let table = tx.open_table(ENTRIES).map_err(backend)?;

        let mut result = Vec::new();

        for entry in table.range(prefix.as_str()..).map_err(backend)? {
            let (key, value) = entry.map_err(backend)?;
            let key = key.value();

            if !key.starts_with(prefix.as_str()) {
                break;
            }

            let key = Key::new(key);
            if key.is_descendant_of(prefix) {
                result.push((key, Bytes::copy_from_slice(value.value())));
            }
        }

        Ok(result)
    }
}
