use std::time::Duration;

/// Parameters of the header [`Store`](crate::Store).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Params {
    /// Capacity of the in-memory cache of recently used headers.
    /// Default: 4096
    pub store_cache_size: usize,

    /// Capacity of the in-memory hash to height index cache.
    /// Default: 16384
    pub index_cache_size: usize,

    /// Number of headers buffered in memory before they are flushed to the datastore.
    /// Default: 2048
    pub write_batch_size: usize,

    /// Interval at which the background task flushes the write buffer.
    /// Default: 5s
    pub flush_interval: Duration,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            store_cache_size: 4096,
            index_cache_size: 16384,
            write_batch_size: 2048,
            flush_interval: Duration::from_secs(5),
        }
    }
}
