use sentinel_metrics::{Counter, Gauge, SharedRegistry};

#[derive(Clone, Debug, Default)]
pub struct Metrics {
    /// Height of the current head
    pub head_height: Gauge,

    /// Number of headers appended to the store
    pub headers_written: Counter,

    /// Number of batched flushes to the datastore
    pub flushes: Counter,

    /// Number of header lookups served from the cache
    pub cache_hits: Counter,

    /// Number of header lookups that missed the cache
    pub cache_misses: Counter,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(registry: &SharedRegistry) -> Self {
        let metrics = Self::new();

        registry.with_prefix("header_store", |registry| {
            registry.register(
                "head_height",
                "Height of the current head",
                metrics.head_height.clone(),
            );

            registry.register(
                "headers_written",
                "Number of headers appended to the store",
                metrics.headers_written.clone(),
            );

            registry.register(
                "flushes",
                "Number of batched flushes to the datastore",
                metrics.flushes.clone(),
            );

            registry.register(
                "cache_hits",
                "Number of header lookups served from the cache",
                metrics.cache_hits.clone(),
            );

            registry.register(
                "cache_misses",
                "Number of header lookups that missed the cache",
                metrics.cache_misses.clone(),
            );
        });

        metrics
    }
}
