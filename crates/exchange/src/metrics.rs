use sentinel_metrics::{exponential_buckets, Counter, Histogram, SharedRegistry};

#[derive(Clone, Debug)]
pub struct Metrics {
    /// Number of requests sent to peers
    pub requests_sent: Counter,

    /// Time taken by peers to respond, in seconds
    pub response_time: Histogram,

    /// Number of requests that timed out
    pub request_timeouts: Counter,

    /// Number of requests that failed or returned an invalid response
    pub request_failures: Counter,

    /// Number of responses that disagreed with the accepted headers
    pub divergent_responses: Counter,

    /// Number of chunks for which no quorum could be reached
    pub quorum_failures: Counter,

    /// Number of headers accepted from peers
    pub headers_received: Counter,

    /// Number of inbound requests served
    pub requests_served: Counter,

    /// Number of inbound requests rejected for exceeding resource limits
    pub requests_rejected: Counter,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            requests_sent: Counter::default(),
            response_time: Histogram::new(exponential_buckets(0.01, 2.0, 12)),
            request_timeouts: Counter::default(),
            request_failures: Counter::default(),
            divergent_responses: Counter::default(),
            quorum_failures: Counter::default(),
            headers_received: Counter::default(),
            requests_served: Counter::default(),
            requests_rejected: Counter::default(),
        }
    }

    pub fn register(registry: &SharedRegistry) -> Self {
        let metrics = Self::new();

        registry.with_prefix("header_exchange", |registry| {
            registry.register(
                "requests_sent",
                "Number of requests sent to peers",
                metrics.requests_sent.clone(),
            );

            registry.register(
                "response_time",
                "Time taken by peers to respond, in seconds",
                metrics.response_time.clone(),
            );

            registry.register(
                "request_timeouts",
                "Number of requests that timed out",
                metrics.request_timeouts.clone(),
            );

            registry.register(
                "request_failures",
                "Number of requests that failed or returned an invalid response",
                metrics.request_failures.clone(),
            );

            registry.register(
                "divergent_responses",
                "Number of responses that disagreed with the accepted headers",
                metrics.divergent_responses.clone(),
            );

            registry.register(
                "quorum_failures",
                "Number of chunks for which no quorum could be reached",
                metrics.quorum_failures.clone(),
            );

            registry.register(
                "headers_received",
                "Number of headers accepted from peers",
                metrics.headers_received.clone(),
            );

            registry.register(
                "requests_served",
                "Number of inbound requests served",
                metrics.requests_served.clone(),
            );

            registry.register(
                "requests_rejected",
                "Number of inbound requests rejected for exceeding resource limits",
                metrics.requests_rejected.clone(),
            );
        });

        metrics
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
