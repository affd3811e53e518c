use std::time::Duration;

use bytes::Bytes;
use libp2p::Multiaddr;
use tokio::time::{sleep, timeout};

use sentinel_core_types::Height;
use sentinel_exchange::{ExchangeServer, Request, ServerParams, StatusCode, Transport};
use sentinel_fraud::{Acceptance, PubSub};
use sentinel_network::{spawn, Handle, Keypair, NetworkParams};
use sentinel_test::{memory_store, HeaderSuite};

const TOPIC: &str = "/test/fraud-proof/mockProof/v0.0.1";

fn params(persistent_peers: Vec<Multiaddr>) -> NetworkParams {
    NetworkParams {
        network_id: "test".to_string(),
        listen_addr: "/ip4/127.0.0.1/tcp/0".parse().unwrap(),
        persistent_peers,
        ..NetworkParams::default()
    }
}

async fn node(persistent_peers: Vec<Multiaddr>, server: Option<ExchangeServer>) -> Handle {
    let handle = spawn(Keypair::generate_ed25519(), params(persistent_peers), server)
        .await
        .unwrap();

    timeout(Duration::from_secs(5), handle.wait_until_listening())
        .await
        .unwrap()
        .unwrap();

    handle
}

async fn connected(a: &Handle, b: &Handle) {
    timeout(Duration::from_secs(10), async {
        while !a.connected_peers().contains(&b.local_peer_id())
            || !b.connected_peers().contains(&a.local_peer_id())
        {
            sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("nodes did not connect");
}

#[tokio::test]
async fn own_messages_reach_local_subscribers() {
    sentinel_test::init_logging();

    let handle = node(vec![], None).await;

    let mut rx = handle.subscribe(TOPIC).await.unwrap();
    handle
        .publish(TOPIC, Bytes::from_static(b"proof"))
        .await
        .unwrap();

    let message = timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(message.data, Bytes::from_static(b"proof"));

    handle.shutdown().await;
}

#[tokio::test]
async fn serves_header_ranges() {
    sentinel_test::init_logging();

    let mut suite = HeaderSuite::new();
    suite.generate(5);

    let store = memory_store(suite.headers()).await;
    let server = node(
        vec![],
        Some(ExchangeServer::new(store, ServerParams::default())),
    )
    .await;

    let addr = server.listen_addrs().remove(0);
    let client = node(vec![addr], None).await;
    connected(&client, &server).await;

    let response = client
        .request(server.local_peer_id(), Request::range(Height::new(2), 3))
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::Ok);
    assert_eq!(response.headers, suite.range(2, 4));

    let response = client
        .request(server.local_peer_id(), Request::Head)
        .await
        .unwrap();

    assert_eq!(response.headers, suite.range(5, 5));

    client.shutdown().await;
    server.shutdown().await;
}

#[tokio::test]
async fn reports_peer_connections() {
    let a = node(vec![], None).await;
    let mut events = a.peer_events();

    let b = node(a.listen_addrs(), None).await;
    connected(&a, &b).await;

    let event = timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        event,
        sentinel_exchange::PeerEvent::Connected(b.local_peer_id())
    );

    b.shutdown().await;
    a.shutdown().await;
}

#[tokio::test]
async fn gossips_between_nodes() {
    sentinel_test::init_logging();

    let a = node(vec![], None).await;
    let b = node(a.listen_addrs(), None).await;
    connected(&a, &b).await;

    let _rx_a = a.subscribe(TOPIC).await.unwrap();
    let mut rx_b = b.subscribe(TOPIC).await.unwrap();

    // Publish until the subscription of `b` has propagated to `a`
    let mut message = None;
    for attempt in 0..50u32 {
        let data = Bytes::from(format!("proof-{attempt}"));
        a.publish(TOPIC, data).await.unwrap();

        if let Ok(Some(received)) = timeout(Duration::from_millis(200), rx_b.recv()).await {
            message = Some(received);
            break;
        }
    }

    let mut message = message.expect("message was not delivered");
    assert!(message.data.starts_with(b"proof-"));

    message.report(Acceptance::Accept);

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn requests_fail_after_shutdown() {
    let handle = node(vec![], None).await;
    let peer = handle.local_peer_id();

    handle.shutdown().await;

    assert!(handle.request(peer, Request::Head).await.is_err());
    assert!(handle.publish(TOPIC, Bytes::new()).await.is_err());
}
