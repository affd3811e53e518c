use std::net::Ipv4Addr;
use std::time::Duration;

use bytesize::ByteSize;
use libp2p::multiaddr::Protocol;
use libp2p::Multiaddr;

use sentinel_exchange::{ClientParams, ServerParams};

#[derive(Clone, Debug)]
pub struct NetworkParams {
    /// Network the node takes part in, part of every protocol and topic name.
    /// Default: "sentinel"
    pub network_id: String,

    /// Address to listen on.
    /// Default: /ip4/0.0.0.0/tcp/2121
    pub listen_addr: Multiaddr,

    /// Peers dialed on startup.
    /// Default: none
    pub persistent_peers: Vec<Multiaddr>,

    /// How long a connection without any active stream is kept open.
    /// Default: 30s
    pub idle_connection_timeout: Duration,

    /// Largest gossip message accepted.
    /// Default: 1 MiB
    pub max_message_size: ByteSize,

    /// Number of inbound gossip messages buffered per topic.
    /// Default: 128
    pub channel_size: usize,

    /// Limits and deadlines of inbound exchange streams.
    pub server: ServerParams,

    /// Limits of outbound exchange requests.
    pub client: ClientParams,
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self {
            network_id: "sentinel".to_string(),
            listen_addr: Multiaddr::empty()
                .with(Protocol::Ip4(Ipv4Addr::UNSPECIFIED))
                .with(Protocol::Tcp(2121)),
            persistent_peers: Vec::new(),
            idle_connection_timeout: Duration::from_secs(30),
            max_message_size: ByteSize::mib(1),
            channel_size: 128,
            server: ServerParams::default(),
            client: ClientParams::default(),
        }
    }
}
