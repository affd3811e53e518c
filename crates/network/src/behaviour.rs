use libp2p::identity::Keypair;
use libp2p::swarm::NetworkBehaviour;
use libp2p::{gossipsub, identify};

use crate::{BoxError, NetworkParams};

#[derive(NetworkBehaviour)]
#[behaviour(to_swarm = "NetworkEvent")]
pub struct Behaviour {
    pub identify: identify::Behaviour,
    pub gossipsub: gossipsub::Behaviour,
    pub exchange: sentinel_exchange::Behaviour,
}

#[derive(Debug)]
pub enum NetworkEvent {
    Identify(Box<identify::Event>),
    GossipSub(gossipsub::Event),
    Exchange(sentinel_exchange::Event),
}

impl From<identify::Event> for NetworkEvent {
    fn from(event: identify::Event) -> Self {
        Self::Identify(Box::new(event))
    }
}

impl From<gossipsub::Event> for NetworkEvent {
    fn from(event: gossipsub::Event) -> Self {
        Self::GossipSub(event)
    }
}

impl From<sentinel_exchange::Event> for NetworkEvent {
    fn from(event: sentinel_exchange::Event) -> Self {
        Self::Exchange(event)
    }
}

/// Gossip messages are unsigned, so they are identified by their content.
fn message_id(message: &gossipsub::Message) -> gossipsub::MessageId {
    let hash = seahash::hash(&message.data);
    gossipsub::MessageId::from(hash.to_be_bytes().to_vec())
}

impl Behaviour {
    pub fn new(keypair: &Keypair, params: &NetworkParams) -> Result<Self, BoxError> {
        let identify = identify::Behaviour::new(identify::Config::new(
            format!("/{}/sentinel/0.1.0", params.network_id),
            keypair.public(),
        ));

        let config = gossipsub::ConfigBuilder::default()
            .validation_mode(gossipsub::ValidationMode::Anonymous)
            .validate_messages()
            .message_id_fn(message_id)
            .max_transmit_size(params.max_message_size.as_u64() as usize)
            .build()?;

        let gossipsub = gossipsub::Behaviour::new(gossipsub::MessageAuthenticity::Anonymous, config)?;

        let protocol = sentinel_exchange::Behaviour::protocol(&params.network_id)?;
        let exchange =
            sentinel_exchange::Behaviour::new(protocol, &params.server, &params.client);

        Ok(Self {
            identify,
            gossipsub,
            exchange,
        })
    }
}
