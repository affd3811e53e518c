use libp2p::request_response::{self as rpc, OutboundRequestId, ProtocolSupport, ResponseChannel};
use libp2p::swarm::NetworkBehaviour;
use libp2p::{PeerId, StreamProtocol};

use crate::{ClientParams, Codec, Request, Response, ServerParams};

#[derive(NetworkBehaviour)]
#[behaviour(to_swarm = "Event")]
pub struct Behaviour {
    rpc: rpc::Behaviour<Codec>,
}

pub type Event = rpc::Event<Request, Response>;

impl Behaviour {
    /// Protocol name of the header exchange on the given network.
    pub fn protocol(network_id: &str) -> Result<StreamProtocol, libp2p::swarm::InvalidProtocol> {
        StreamProtocol::try_from_owned(format!("/{network_id}/header-ex/v0.0.3"))
    }

    pub fn new(protocol: StreamProtocol, server: &ServerParams, client: &ClientParams) -> Self {
        let config = rpc::Config::default().with_request_timeout(server.read_deadline);

        Self {
            rpc: rpc::Behaviour::with_codec(
                Codec::new(server, client),
                [(protocol, ProtocolSupport::Full)],
                config,
            ),
        }
    }

    pub fn send_request(&mut self, peer: PeerId, request: Request) -> OutboundRequestId {
        self.rpc.send_request(&peer, request)
    }

    pub fn send_response(
        &mut self,
        channel: ResponseChannel<Response>,
        response: Response,
    ) -> Result<(), Response> {
        self.rpc.send_response(channel, response)
    }
}
