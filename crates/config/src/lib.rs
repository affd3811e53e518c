//! Configuration of a Sentinel node.
//!
//! Every section maps onto the parameters of one component. Options left out
//! of the configuration file take the component's defaults.

use std::path::Path;
use std::time::Duration;

use bytesize::ByteSize;
use serde::{Deserialize, Serialize};

use sentinel_exchange::{ClientParams, ServerParams};
use sentinel_network::{Multiaddr, NetworkParams};

/// Prefix of the environment variables overriding the configuration file,
/// eg. `SENTINEL__CLIENT__MIN_RESPONSES=3`.
pub const ENV_PREFIX: &str = "SENTINEL";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Sentinel configuration options
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Header store options
    pub store: StoreConfig,

    /// Header exchange client options
    pub client: ClientConfig,

    /// Header exchange server options
    pub server: ServerConfig,

    /// Fraud proof service options
    pub fraud: FraudConfig,

    /// Peer-to-peer network options
    pub network: NetworkConfig,
}

impl Config {
    /// Load the configuration file at `path`, with overrides taken from the environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let config: Self = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("network.persistent_peers"),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.client.min_responses == 0 {
            return Err(Error::Invalid("client.min_responses must be at least 1".into()));
        }

        if self.client.max_headers_per_request == 0 || self.server.max_headers_per_request == 0 {
            return Err(Error::Invalid("max_headers_per_request must be at least 1".into()));
        }

        if self.store.write_batch_size == 0 {
            return Err(Error::Invalid("store.write_batch_size must be at least 1".into()));
        }

        if self.network.network_id.is_empty() {
            return Err(Error::Invalid("network.network_id must not be empty".into()));
        }

        Ok(())
    }

    pub fn fraud_params(&self) -> sentinel_fraud::Params {
        sentinel_fraud::Params {
            network_id: self.network.network_id.clone(),
            halt_on_fraud: self.fraud.halt_on_fraud,
            subscription_capacity: self.fraud.subscription_capacity,
        }
    }

    pub fn network_params(&self) -> NetworkParams {
        NetworkParams {
            network_id: self.network.network_id.clone(),
            listen_addr: self.network.listen_addr.clone(),
            persistent_peers: self.network.persistent_peers.clone(),
            idle_connection_timeout: self.network.idle_connection_timeout,
            max_message_size: self.network.max_message_size,
            channel_size: self.network.channel_size,
            server: ServerParams::from(&self.server),
            client: ClientParams::from(&self.client),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub store_cache_size: usize,
    pub index_cache_size: usize,
    pub write_batch_size: usize,
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let params = sentinel_store::Params::default();

        Self {
            store_cache_size: params.store_cache_size,
            index_cache_size: params.index_cache_size,
            write_batch_size: params.write_batch_size,
            flush_interval: params.flush_interval,
        }
    }
}

impl From<&StoreConfig> for sentinel_store::Params {
    fn from(config: &StoreConfig) -> Self {
        Self {
            store_cache_size: config.store_cache_size,
            index_cache_size: config.index_cache_size,
            write_batch_size: config.write_batch_size,
            flush_interval: config.flush_interval,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub min_responses: usize,
    pub max_request_size: ByteSize,
    pub max_headers_per_request: u64,
    #[serde(with = "humantime_serde")]
    pub max_awaiting_time: Duration,
    pub default_score: f64,
    pub max_peer_tracker_size: usize,
    pub max_attempts: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let params = ClientParams::default();

        Self {
            min_responses: params.min_responses,
            max_request_size: params.max_request_size,
            max_headers_per_request: params.max_headers_per_request,
            max_awaiting_time: params.max_awaiting_time,
            default_score: params.default_score,
            max_peer_tracker_size: params.max_peer_tracker_size,
            max_attempts: params.max_attempts,
        }
    }
}

impl From<&ClientConfig> for ClientParams {
    fn from(config: &ClientConfig) -> Self {
        Self {
            min_responses: config.min_responses,
            max_request_size: config.max_request_size,
            max_headers_per_request: config.max_headers_per_request,
            max_awaiting_time: config.max_awaiting_time,
            default_score: config.default_score,
            max_peer_tracker_size: config.max_peer_tracker_size,
            max_attempts: config.max_attempts,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    #[serde(with = "humantime_serde")]
    pub write_deadline: Duration,
    #[serde(with = "humantime_serde")]
    pub read_deadline: Duration,
    pub max_request_size: ByteSize,
    pub max_headers_per_request: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let params = ServerParams::default();

        Self {
            write_deadline: params.write_deadline,
            read_deadline: params.read_deadline,
            max_request_size: params.max_request_size,
            max_headers_per_request: params.max_headers_per_request,
        }
    }
}

impl From<&ServerConfig> for ServerParams {
    fn from(config: &ServerConfig) -> Self {
        Self {
            write_deadline: config.write_deadline,
            read_deadline: config.read_deadline,
            max_request_size: config.max_request_size,
            max_headers_per_request: config.max_headers_per_request,
        }
    }
}

/// The network id of the fraud proof topics is taken from [`NetworkConfig`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FraudConfig {
    pub halt_on_fraud: bool,
    pub subscription_capacity: usize,
}

impl Default for FraudConfig {
    fn default() -> Self {
        let params = sentinel_fraud::Params::default();

        Self {
            halt_on_fraud: params.halt_on_fraud,
            subscription_capacity: params.subscription_capacity,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub network_id: String,
    pub listen_addr: Multiaddr,
    pub persistent_peers: Vec<Multiaddr>,
    #[serde(with = "humantime_serde")]
    pub idle_connection_timeout: Duration,
    pub max_message_size: ByteSize,
    pub channel_size: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        let params = NetworkParams::default();

        Self {
            network_id: params.network_id,
            listen_addr: params.listen_addr,
            persistent_peers: params.persistent_peers,
            idle_connection_timeout: params.idle_connection_timeout,
            max_message_size: params.max_message_size,
            channel_size: params.channel_size,
        }
    }
}
