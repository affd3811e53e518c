//! libp2p driver for the Sentinel protocols.
//!
//! A single swarm runs gossipsub for fraud proofs and the request-response
//! header exchange. The swarm is owned by a background task, driven through
//! the [`Handle`] returned by [`spawn`], which implements both
//! [`PubSub`](sentinel_fraud::PubSub) and [`Transport`](sentinel_exchange::Transport).

use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use futures::StreamExt;
use libp2p::request_response::{self as rpc, OutboundRequestId, ResponseChannel};
use libp2p::swarm::{self, SwarmEvent};
use libp2p::{gossipsub, identify, noise, tcp, yamux, SwarmBuilder};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, error, error_span, info, trace, warn, Instrument};

use sentinel_exchange::{ExchangeServer, PeerEvent, Request, Response, StatusCode, TransportError};
use sentinel_fraud::{Acceptance, Message, PubSubError};

pub use libp2p::identity::Keypair;
pub use libp2p::{Multiaddr, PeerId};

mod behaviour;
use behaviour::{Behaviour, NetworkEvent};

mod handle;
pub use handle::Handle;

mod params;
pub use params::NetworkParams;

pub type BoxError = Box<dyn core::error::Error + Send + Sync + 'static>;

#[derive(Debug)]
pub(crate) enum CtrlMsg {
    Publish {
        topic: String,
        data: Bytes,
        reply: oneshot::Sender<Result<(), PubSubError>>,
    },
    Subscribe {
        topic: String,
        reply: oneshot::Sender<Result<mpsc::Receiver<Message>, PubSubError>>,
    },
    Unsubscribe {
        topic: String,
        reply: oneshot::Sender<Result<(), PubSubError>>,
    },
    Request {
        peer: PeerId,
        request: Request,
        reply: oneshot::Sender<Result<Response, TransportError>>,
    },
    Respond {
        channel: ResponseChannel<Response>,
        response: Response,
    },
    Report {
        message_id: gossipsub::MessageId,
        source: PeerId,
        acceptance: Acceptance,
    },
    Dial(Multiaddr),
    Shutdown,
}

/// State shared between the swarm task and its [`Handle`]s.
#[derive(Clone)]
pub(crate) struct Shared {
    pub(crate) peers: Arc<RwLock<HashSet<PeerId>>>,
    pub(crate) events: broadcast::Sender<PeerEvent>,
    pub(crate) listen_addrs: Arc<watch::Sender<Vec<Multiaddr>>>,
}

struct State {
    params: NetworkParams,
    shared: Shared,
    tx_ctrl: mpsc::Sender<CtrlMsg>,
    server: Option<ExchangeServer>,
    topics: HashMap<gossipsub::TopicHash, mpsc::Sender<Message>>,
    pending: HashMap<OutboundRequestId, oneshot::Sender<Result<Response, TransportError>>>,
}

/// Start the swarm, serving header requests with `server` if given.
pub async fn spawn(
    keypair: Keypair,
    params: NetworkParams,
    server: Option<ExchangeServer>,
) -> eyre::Result<Handle> {
    let idle_connection_timeout = params.idle_connection_timeout;

    let mut swarm = SwarmBuilder::with_existing_identity(keypair)
        .with_tokio()
        .with_tcp(
            tcp::Config::default(),
            noise::Config::new,
            yamux::Config::default,
        )?
        .with_quic()
        .with_behaviour(|keypair| Behaviour::new(keypair, &params))?
        .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(idle_connection_timeout))
        .build();

    swarm.listen_on(params.listen_addr.clone())?;

    for addr in &params.persistent_peers {
        if let Err(e) = swarm.dial(addr.clone()) {
            warn!(%addr, "Failed to dial persistent peer: {e}");
        }
    }

    let (tx_ctrl, rx_ctrl) = mpsc::channel(params.channel_size.max(1));
    let (events, _) = broadcast::channel(params.channel_size.max(1));
    let (listen_addrs, _) = watch::channel(Vec::new());

    let shared = Shared {
        peers: Arc::new(RwLock::new(HashSet::new())),
        events,
        listen_addrs: Arc::new(listen_addrs),
    };

    let state = State {
        params,
        shared: shared.clone(),
        tx_ctrl: tx_ctrl.clone(),
        server,
        topics: HashMap::new(),
        pending: HashMap::new(),
    };

    let peer_id = *swarm.local_peer_id();
    let span = error_span!("network", peer = %peer_id);
    let task_handle = tokio::task::spawn(run(swarm, state, rx_ctrl).instrument(span));

    Ok(Handle::new(peer_id, tx_ctrl, shared, task_handle))
}

async fn run(
    mut swarm: swarm::Swarm<Behaviour>,
    mut state: State,
    mut rx_ctrl: mpsc::Receiver<CtrlMsg>,
) {
    loop {
        let result = tokio::select! {
            event = swarm.select_next_some() => {
                handle_swarm_event(event, &mut swarm, &mut state).await
            }

            Some(ctrl) = rx_ctrl.recv() => {
                handle_ctrl_msg(ctrl, &mut swarm, &mut state).await
            }
        };

        match result {
            ControlFlow::Continue(()) => continue,
            ControlFlow::Break(()) => break,
        }
    }

    info!("Network task stopped");
}

async fn handle_ctrl_msg(
    msg: CtrlMsg,
    swarm: &mut swarm::Swarm<Behaviour>,
    state: &mut State,
) -> ControlFlow<()> {
    match msg {
        CtrlMsg::Publish { topic, data, reply } => {
            let _ = reply.send(publish(swarm, state, topic, data));
        }

        CtrlMsg::Subscribe { topic, reply } => {
            let _ = reply.send(subscribe(swarm, state, topic));
        }

        CtrlMsg::Unsubscribe { topic, reply } => {
            let topic = gossipsub::IdentTopic::new(topic);
            let _ = swarm.behaviour_mut().gossipsub.unsubscribe(&topic);
            state.topics.remove(&topic.hash());

            debug!(%topic, "Left topic");
            let _ = reply.send(Ok(()));
        }

        CtrlMsg::Request {
            peer,
            request,
            reply,
        } => {
            let request_id = swarm.behaviour_mut().exchange.send_request(peer, request);
            state.pending.insert(request_id, reply);
        }

        CtrlMsg::Respond { channel, response } => {
            if swarm
                .behaviour_mut()
                .exchange
                .send_response(channel, response)
                .is_err()
            {
                debug!("Failed to send response, the stream is closed");
            }
        }

        CtrlMsg::Report {
            message_id,
            source,
            acceptance,
        } => {
            let acceptance = match acceptance {
                Acceptance::Accept => gossipsub::MessageAcceptance::Accept,
                Acceptance::Reject => gossipsub::MessageAcceptance::Reject,
                Acceptance::Ignore => gossipsub::MessageAcceptance::Ignore,
            };

            let _ = swarm
                .behaviour_mut()
                .gossipsub
                .report_message_validation_result(&message_id, &source, acceptance);
        }

        CtrlMsg::Dial(addr) => {
            if let Err(e) = swarm.dial(addr.clone()) {
                error!(%addr, "Error dialing peer: {e}");
            }
        }

        CtrlMsg::Shutdown => return ControlFlow::Break(()),
    }

    ControlFlow::Continue(())
}

fn publish(
    swarm: &mut swarm::Swarm<Behaviour>,
    state: &mut State,
    topic: String,
    data: Bytes,
) -> Result<(), PubSubError> {
    let ident = gossipsub::IdentTopic::new(topic.clone());

    match swarm
        .behaviour_mut()
        .gossipsub
        .publish(ident.clone(), data.to_vec())
    {
        Ok(message_id) => debug!(%topic, %message_id, "Published message"),
        Err(gossipsub::PublishError::NoPeersSubscribedToTopic) => {
            debug!(%topic, "Published message, but no peer is subscribed to the topic");
        }
        Err(gossipsub::PublishError::Duplicate) => {
            debug!(%topic, "Message was already published");
        }
        Err(e) => {
            return Err(PubSubError::Publish {
                topic,
                reason: e.to_string(),
            })
        }
    }

    // Gossipsub does not deliver our own messages back to us
    if let Some(tx) = state.topics.get(&ident.hash()) {
        if tx.try_send(Message::new(data)).is_err() {
            warn!(%topic, "Local subscriber is full, dropping own message");
        }
    }

    Ok(())
}

fn subscribe(
    swarm: &mut swarm::Swarm<Behaviour>,
    state: &mut State,
    topic: String,
) -> Result<mpsc::Receiver<Message>, PubSubError> {
    let ident = gossipsub::IdentTopic::new(topic.clone());

    swarm
        .behaviour_mut()
        .gossipsub
        .subscribe(&ident)
        .map_err(|e| PubSubError::Subscribe {
            topic: topic.clone(),
            reason: e.to_string(),
        })?;

    let (tx, rx) = mpsc::channel(state.params.channel_size.max(1));
    state.topics.insert(ident.hash(), tx);

    debug!(%topic, "Joined topic");

    Ok(rx)
}

async fn handle_swarm_event(
    event: SwarmEvent<NetworkEvent>,
    swarm: &mut swarm::Swarm<Behaviour>,
    state: &mut State,
) -> ControlFlow<()> {
    match event {
        SwarmEvent::NewListenAddr { address, .. } => {
            info!(%address, "Node is listening");

            state
                .shared
                .listen_addrs
                .send_modify(|addrs| addrs.push(address));
        }

        SwarmEvent::ConnectionEstablished {
            peer_id,
            num_established,
            ..
        } => {
            if num_established.get() == 1 {
                debug!(%peer_id, "Connected to peer");

                state
                    .shared
                    .peers
                    .write()
                    .expect("poisoned lock")
                    .insert(peer_id);

                let _ = state.shared.events.send(PeerEvent::Connected(peer_id));
            }
        }

        SwarmEvent::ConnectionClosed {
            peer_id,
            num_established,
            ..
        } => {
            if num_established == 0 {
                debug!(%peer_id, "Disconnected from peer");

                state
                    .shared
                    .peers
                    .write()
                    .expect("poisoned lock")
                    .remove(&peer_id);

                let _ = state.shared.events.send(PeerEvent::Disconnected(peer_id));
            }
        }

        SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
            warn!(?peer_id, "Failed to connect: {error}");
        }

        SwarmEvent::Behaviour(NetworkEvent::Identify(event)) => {
            if let identify::Event::Received { peer_id, info, .. } = *event {
                trace!(%peer_id, agent = %info.agent_version, "Received identity");
            }
        }

        SwarmEvent::Behaviour(NetworkEvent::GossipSub(gossipsub::Event::Message {
            propagation_source,
            message_id,
            message,
        })) => {
            on_gossip_message(swarm, state, propagation_source, message_id, message);
        }

        SwarmEvent::Behaviour(NetworkEvent::GossipSub(gossipsub::Event::Subscribed {
            peer_id,
            topic,
        })) => {
            trace!(%peer_id, %topic, "Peer subscribed");
        }

        SwarmEvent::Behaviour(NetworkEvent::Exchange(event)) => {
            on_exchange_event(state, event);
        }

        _ => {}
    }

    ControlFlow::Continue(())
}

/// Hand an inbound gossip message to the local subscriber, and report its
/// verdict back to gossipsub once it is known.
fn on_gossip_message(
    swarm: &mut swarm::Swarm<Behaviour>,
    state: &mut State,
    source: PeerId,
    message_id: gossipsub::MessageId,
    message: gossipsub::Message,
) {
    let Some(tx) = state.topics.get(&message.topic) else {
        trace!(topic = %message.topic, "Ignoring message on unknown topic");

        let _ = swarm.behaviour_mut().gossipsub.report_message_validation_result(
            &message_id,
            &source,
            gossipsub::MessageAcceptance::Ignore,
        );

        return;
    };

    trace!(%source, topic = %message.topic, size = message.data.len(), "Received message");

    let (inbound, verdict) = Message::with_reply(Bytes::from(message.data));

    if tx.try_send(inbound).is_err() {
        warn!(topic = %message.topic, "Subscriber is full, ignoring message");

        let _ = swarm.behaviour_mut().gossipsub.report_message_validation_result(
            &message_id,
            &source,
            gossipsub::MessageAcceptance::Ignore,
        );

        return;
    }

    let tx_ctrl = state.tx_ctrl.clone();

    tokio::spawn(async move {
        let acceptance = verdict.await.unwrap_or(Acceptance::Ignore);

        let _ = tx_ctrl
            .send(CtrlMsg::Report {
                message_id,
                source,
                acceptance,
            })
            .await;
    });
}

fn on_exchange_event(state: &mut State, event: sentinel_exchange::Event) {
    match event {
        rpc::Event::Message { peer, message, .. } => match message {
            rpc::Message::Request {
                request, channel, ..
            } => {
                trace!(%peer, count = request.count(), "Received header request");

                let tx_ctrl = state.tx_ctrl.clone();
                let server = state.server.clone();

                tokio::spawn(async move {
                    let response = match server {
                        Some(server) => server.respond(request).await,
                        None => Response::status(StatusCode::Internal),
                    };

                    let _ = tx_ctrl.send(CtrlMsg::Respond { channel, response }).await;
                });
            }

            rpc::Message::Response {
                request_id,
                response,
            } => {
                if let Some(reply) = state.pending.remove(&request_id) {
                    let _ = reply.send(Ok(response));
                }
            }
        },

        rpc::Event::OutboundFailure {
            peer,
            request_id,
            error,
            ..
        } => {
            debug!(%peer, "Header request failed: {error}");

            if let Some(reply) = state.pending.remove(&request_id) {
                let _ = reply.send(Err(TransportError::RequestFailed {
                    peer,
                    reason: error.to_string(),
                }));
            }
        }

        rpc::Event::InboundFailure { peer, error, .. } => {
            debug!(%peer, "Failed to serve header request: {error}");
        }

        rpc::Event::ResponseSent { peer, .. } => {
            trace!(%peer, "Sent header response");
        }
    }
}
