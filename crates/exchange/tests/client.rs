use std::sync::Arc;
use std::time::Duration;

use bytesize::ByteSize;

use sentinel_core_types::{ExtendedHeader, Hash, Height};
use sentinel_exchange::{ClientParams, Error, Exchange, ExchangeServer, Metrics, ServerParams};
use sentinel_metrics::SharedRegistry;
use sentinel_store::{Params as StoreParams, Store};
use sentinel_test::{memory_store, FlakyDatastore, HeaderSuite, MemoryTransport, Peer};

async fn serving(headers: &[ExtendedHeader]) -> Peer {
    let store = memory_store(headers).await;
    Peer::Serving(ExchangeServer::new(store, ServerParams::default()))
}

async fn exchange(
    transport: &Arc<MemoryTransport>,
    params: ClientParams,
) -> Exchange<MemoryTransport> {
    let exchange = Exchange::new(Arc::clone(transport), memory_store(&[]).await, params);
    exchange.start();
    exchange
}

fn params() -> ClientParams {
    ClientParams {
        max_headers_per_request: 4,
        max_awaiting_time: Duration::from_millis(200),
        ..ClientParams::default()
    }
}

#[tokio::test]
async fn fetches_range_in_chunks() {
    sentinel_test::init_logging();

    let mut suite = HeaderSuite::new();
    suite.generate(10);

    let transport = Arc::new(MemoryTransport::new());
    for _ in 0..3 {
        transport.add_peer(serving(suite.headers()).await);
    }

    let exchange = exchange(&transport, params()).await;
    let headers = exchange
        .get_range(Height::new(1), Height::new(10))
        .await
        .unwrap();

    assert_eq!(headers, suite.headers());

    // Chunks of 4, 4 and 2 headers
    assert!(transport.requests() >= 3 * 2);
}

#[tokio::test]
async fn chunks_are_bounded_by_the_request_size() {
    let mut suite = HeaderSuite::new();
    suite.generate(6);

    let transport = Arc::new(MemoryTransport::new());
    for _ in 0..3 {
        transport.add_peer(serving(suite.headers()).await);
    }

    // Room for two headers per request
    let params = ClientParams {
        max_request_size: ByteSize::b(1024),
        ..params()
    };
    assert_eq!(params.headers_per_request(), 2);

    let exchange = exchange(&transport, params).await;
    let headers = exchange
        .get_range(Height::new(1), Height::new(6))
        .await
        .unwrap();

    assert_eq!(headers, suite.headers());
    assert!(transport.requests() >= 3 * 2);
}

#[tokio::test]
async fn writes_accepted_headers_to_store() {
    let mut suite = HeaderSuite::new();
    suite.generate(6);

    let transport = Arc::new(MemoryTransport::new());
    for _ in 0..2 {
        transport.add_peer(serving(suite.headers()).await);
    }

    let store = memory_store(&[]).await;
    let exchange = Exchange::new(Arc::clone(&transport), store.clone(), params());
    exchange.start();

    exchange
        .get_range(Height::new(1), Height::new(6))
        .await
        .unwrap();

    assert_eq!(store.height(), Height::new(6));
    assert_eq!(store.get_by_height(Height::new(4)).await.unwrap(), suite.header(4));
}

#[tokio::test]
async fn stops_at_the_head_of_peers() {
    let mut suite = HeaderSuite::new();
    suite.generate(5);

    let transport = Arc::new(MemoryTransport::new());
    for _ in 0..2 {
        transport.add_peer(serving(suite.headers()).await);
    }

    let exchange = exchange(&transport, params()).await;
    let headers = exchange
        .get_range(Height::new(1), Height::new(20))
        .await
        .unwrap();

    assert_eq!(headers, suite.headers());
}

#[tokio::test]
async fn lying_peer_is_outvoted_and_scored_down() {
    let mut honest = HeaderSuite::new();
    honest.generate(8);

    let mut liar = honest.fork_at(4, 1);
    liar.generate(4);

    let transport = Arc::new(MemoryTransport::new());
    transport.add_peer(serving(honest.headers()).await);
    transport.add_peer(serving(honest.headers()).await);
    let lying = transport.add_peer(serving(liar.headers()).await);

    let store = memory_store(&[]).await;
    let exchange = Exchange::new(Arc::clone(&transport), store.clone(), params());
    exchange.start();

    let headers = exchange
        .get_range(Height::new(1), Height::new(8))
        .await
        .unwrap();

    assert_eq!(headers, honest.headers());
    assert_eq!(store.head(), Some(honest.header(8)));

    let score = exchange.peer_tracker().score(&lying).unwrap();
    assert!(score < ClientParams::default().default_score);
}

#[tokio::test(start_paused = true)]
async fn silent_peer_times_out() {
    let mut suite = HeaderSuite::new();
    suite.generate(4);

    let transport = Arc::new(MemoryTransport::new());
    transport.add_peer(serving(suite.headers()).await);
    let silent = transport.add_peer(Peer::Silent);

    let exchange = exchange(&transport, params()).await;
    let result = exchange.get_range(Height::new(1), Height::new(4)).await;

    assert!(matches!(
        result,
        Err(Error::Quorum {
            needed: 2,
            received: 1
        })
    ));

    let score = exchange.peer_tracker().score(&silent).unwrap();
    assert!(score < ClientParams::default().default_score);
}

#[tokio::test]
async fn too_few_peers() {
    let mut suite = HeaderSuite::new();
    suite.generate(4);

    let transport = Arc::new(MemoryTransport::new());
    transport.add_peer(serving(suite.headers()).await);

    let params = ClientParams {
        min_responses: 2,
        ..params()
    };

    let exchange = exchange(&transport, params).await;
    let err = exchange
        .get_range(Height::new(1), Height::new(4))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Quorum { needed: 2, .. }));
    assert!(err.is_retryable());
}

#[tokio::test(start_paused = true)]
async fn retries_with_fresh_peers() {
    let mut suite = HeaderSuite::new();
    suite.generate(4);

    let transport = Arc::new(MemoryTransport::new());
    transport.add_peer(Peer::Silent);
    transport.add_peer(Peer::Failing);
    transport.add_peer(serving(suite.headers()).await);
    transport.add_peer(serving(suite.headers()).await);

    let exchange = exchange(&transport, params()).await;
    let headers = exchange
        .get_range(Height::new(1), Height::new(4))
        .await
        .unwrap();

    assert_eq!(headers, suite.headers());
}

#[tokio::test]
async fn storage_failure_is_surfaced() {
    let mut suite = HeaderSuite::new();
    suite.generate(6);

    let transport = Arc::new(MemoryTransport::new());
    for _ in 0..2 {
        transport.add_peer(serving(suite.headers()).await);
    }

    // The local store already holds a diverging chain
    let mut fork = HeaderSuite::forked(3);
    let store = memory_store(&fork.generate(2)).await;

    let exchange = Exchange::new(Arc::clone(&transport), store, params());
    exchange.start();

    let result = exchange.get_range(Height::new(1), Height::new(6)).await;
    assert!(matches!(result, Err(Error::Storage(_))));
}

#[tokio::test]
async fn parent_lookup_failure_is_surfaced() {
    let transport = Arc::new(MemoryTransport::new());

    let store_params = StoreParams {
        store_cache_size: 1,
        write_batch_size: 1,
        ..StoreParams::default()
    };

    let ds = FlakyDatastore::new();
    let store = Store::new(Arc::new(ds.clone()), store_params).unwrap();
    store.append(HeaderSuite::new().generate(4)).await.unwrap();

    // Evict the head from the cache, so that it has to be read back
    store.get_by_height(Height::new(2)).await.unwrap();

    let exchange = Exchange::new(Arc::clone(&transport), store, params());
    exchange.start();

    ds.fail(true);

    // Fails before any peer is asked
    let result = exchange.get_range(Height::new(5), Height::new(6)).await;
    assert!(matches!(result, Err(Error::Storage(_))));
    assert_eq!(transport.requests(), 0);
}

#[tokio::test]
async fn registered_metrics_are_exported() {
    let mut suite = HeaderSuite::new();
    suite.generate(10);

    let transport = Arc::new(MemoryTransport::new());
    for _ in 0..2 {
        transport.add_peer(serving(suite.headers()).await);
    }

    let registry = SharedRegistry::default();
    let metrics = Metrics::register(&registry);

    let exchange =
        Exchange::with_metrics(Arc::clone(&transport), memory_store(&[]).await, params(), metrics);
    exchange.start();

    exchange
        .get_range(Height::new(1), Height::new(10))
        .await
        .unwrap();

    let mut out = String::new();
    sentinel_metrics::export(&registry, &mut out).unwrap();

    assert!(out.contains("header_exchange_headers_received_total 10"));
    assert!(out.contains("header_exchange_quorum_failures_total 0"));
    assert!(out.contains("header_exchange_response_time_count"));
}

#[tokio::test]
async fn head_by_majority() {
    let mut suite = HeaderSuite::new();
    suite.generate(12);

    let transport = Arc::new(MemoryTransport::new());
    transport.add_peer(serving(&suite.headers()[..10]).await);
    transport.add_peer(serving(&suite.headers()[..10]).await);
    transport.add_peer(serving(suite.headers()).await);

    let exchange = exchange(&transport, params()).await;
    let head = exchange.head().await.unwrap();

    assert_eq!(head, suite.header(10));
}

#[tokio::test]
async fn head_falls_back_to_highest() {
    let mut suite = HeaderSuite::new();
    suite.generate(12);

    let transport = Arc::new(MemoryTransport::new());
    transport.add_peer(serving(&suite.headers()[..10]).await);
    transport.add_peer(serving(&suite.headers()[..11]).await);
    transport.add_peer(serving(suite.headers()).await);

    let exchange = exchange(&transport, params()).await;
    let head = exchange.head().await.unwrap();

    assert_eq!(head, suite.header(12));
}

#[tokio::test]
async fn get_by_hash() {
    let mut suite = HeaderSuite::new();
    suite.generate(5);

    let transport = Arc::new(MemoryTransport::new());
    transport.add_peer(serving(suite.headers()).await);
    transport.add_peer(Peer::Failing);

    let exchange = exchange(&transport, params()).await;

    let header = exchange.get_by_hash(suite.header(3).hash()).await.unwrap();
    assert_eq!(header, suite.header(3));

    let unknown = Hash::digest(b"unknown");
    assert!(matches!(
        exchange.get_by_hash(unknown).await,
        Err(Error::NotFound(hash)) if hash == unknown
    ));
}

#[tokio::test]
async fn tracks_peer_connections() {
    let transport = Arc::new(MemoryTransport::new());
    transport.add_peer(Peer::Failing);

    let exchange = exchange(&transport, params()).await;
    assert_eq!(exchange.peer_tracker().len(), 1);

    let peer = transport.add_peer(Peer::Failing);
    wait_until(|| exchange.peer_tracker().len() == 2).await;

    transport.remove_peer(&peer);
    wait_until(|| exchange.peer_tracker().len() == 1).await;

    exchange.stop();
}

#[tokio::test]
async fn no_peers() {
    let transport = Arc::new(MemoryTransport::new());
    let exchange = exchange(&transport, params()).await;

    assert!(matches!(exchange.head().await, Err(Error::NoPeers)));
    assert!(matches!(
        exchange.get_range(Height::new(1), Height::new(2)).await,
        Err(Error::Quorum { .. })
    ));
    assert!(matches!(
        exchange.get_range(Height::new(3), Height::new(2)).await,
        Err(Error::InvalidRange { .. })
    ));
}

async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met in time");
}
