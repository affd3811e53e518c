use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::error::Elapsed;
use tracing::{debug, info, trace, warn};

use sentinel_core_types::{ExtendedHeader, Hash, Height};
use sentinel_store::Store;

use crate::error::ResponseError;
use crate::{
    ClientParams, Error, Metrics, Outcome, PeerEvent, PeerId, PeerTracker, Request, Response,
    StatusCode, Transport, TransportError,
};

/// Result of a request bounded by a timeout.
type Delivery = Result<Result<Response, TransportError>, Elapsed>;

/// A response that passed the structural checks.
#[derive(Debug)]
struct Candidate {
    peer: PeerId,
    elapsed: Duration,
    headers: Vec<ExtendedHeader>,
}

/// A range of headers requested in one round.
#[derive(Copy, Clone, Debug)]
struct Chunk<'a> {
    start: Height,
    amount: u64,
    /// The stored header right below `start`, if any
    parent: Option<&'a ExtendedHeader>,
}

/// Headers agreed upon by enough peers.
#[derive(Debug)]
struct Quorum {
    headers: Vec<ExtendedHeader>,
    agreeing: usize,
}

/// Client side of the header exchange protocol.
///
/// Every chunk of a range is requested from several peers at once, and only
/// accepted once [`ClientParams::min_responses`] of them agree on it.
/// Accepted headers are written to the store.
pub struct Exchange<T> {
    transport: Arc<T>,
    store: Store,
    tracker: Arc<PeerTracker>,
    params: ClientParams,
    metrics: Metrics,
    tracking: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Transport> Exchange<T> {
    pub fn new(transport: Arc<T>, store: Store, params: ClientParams) -> Self {
        Self::with_metrics(transport, store, params, Metrics::default())
    }

    pub fn with_metrics(
        transport: Arc<T>,
        store: Store,
        params: ClientParams,
        metrics: Metrics,
    ) -> Self {
        Self {
            tracker: Arc::new(PeerTracker::from_params(&params)),
            transport,
            store,
            params,
            metrics,
            tracking: Mutex::new(None),
        }
    }

    pub fn params(&self) -> &ClientParams {
        &self.params
    }

    pub fn peer_tracker(&self) -> &PeerTracker {
        &self.tracker
    }

    /// Track the peers of the transport, following connection events until [`Exchange::stop`].
    pub fn start(&self) {
        let mut tracking = self.tracking.lock().expect("poisoned lock");
        if tracking.is_some() {
            return;
        }

        let mut events = self.transport.peer_events();

        for peer in self.transport.connected_peers() {
            self.tracker.track(peer);
        }

        let tracker = Arc::clone(&self.tracker);

        *tracking = Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(PeerEvent::Connected(peer)) => tracker.track(peer),
                    Ok(PeerEvent::Disconnected(peer)) => {
                        tracker.remove(&peer);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Peer event stream lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }));

        info!(peers = self.tracker.len(), "Started header exchange");
    }

    pub fn stop(&self) {
        if let Some(handle) = self.tracking.lock().expect("poisoned lock").take() {
            handle.abort();
        }
    }

    /// Number of peers each chunk is requested from in one round.
    fn fanout(&self) -> usize {
        self.params.min_responses.max(1) + 1
    }

    /// Fetch the headers in `from..=to` from peers and write them to the store.
    ///
    /// Returns the accepted headers, which may stop short of `to`
    /// if peers do not have the whole range yet.
    #[tracing::instrument(skip_all, fields(%from, %to))]
    pub async fn get_range(&self, from: Height, to: Height) -> Result<Vec<ExtendedHeader>, Error> {
        if from.is_zero() || from > to {
            return Err(Error::InvalidRange { from, to });
        }

        let mut accepted = Vec::new();
        let mut start = from;

        while start <= to {
            let remaining = to.as_u64() - start.as_u64() + 1;
            let amount = remaining.min(self.params.headers_per_request());

            let headers = self.fetch_chunk(start, amount).await?;
            let count = headers.len() as u64;

            for header in &headers {
                self.store.put(header.clone()).await?;
            }

            self.metrics.headers_received.inc_by(count);
            accepted.extend(headers);

            if count < amount {
                debug!(%start, count, amount, "Peers do not have the full range yet");
                break;
            }

            start = start.increment_by(count);
        }

        Ok(accepted)
    }

    async fn fetch_chunk(&self, start: Height, amount: u64) -> Result<Vec<ExtendedHeader>, Error> {
        let parent = match start.decrement().filter(|h| !h.is_zero()) {
            Some(height) => match self.store.get_by_height(height).await {
                Ok(header) => Some(header),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e.into()),
            },
            None => None,
        };

        let chunk = Chunk {
            start,
            amount,
            parent: parent.as_ref(),
        };

        let request = Request::range(start, amount);
        let min_responses = self.params.min_responses.max(1);

        let mut tried = HashSet::new();
        let mut candidates = Vec::new();

        for attempt in 1..=self.params.max_attempts.max(1) {
            let peers = self.tracker.select_except(self.fanout(), &tried);
            if peers.is_empty() {
                debug!(attempt, "No more peers to ask");
                break;
            }

            tried.extend(peers.iter().copied());
            trace!(attempt, ?peers, %start, amount, "Requesting headers");

            let mut pending = self.send_all(&peers, &request);

            while let Some((peer, elapsed, result)) = pending.next().await {
                self.add_candidate(&mut candidates, &chunk, peer, elapsed, result);

                let complete = find_quorum(&candidates, min_responses)
                    .is_some_and(|q| q.headers.len() as u64 == amount);

                if complete {
                    // Score the responses that already arrived, drop the others
                    while let Some(Some((peer, elapsed, result))) = pending.next().now_or_never() {
                        self.add_candidate(&mut candidates, &chunk, peer, elapsed, result);
                    }

                    break;
                }
            }

            if let Some(quorum) = find_quorum(&candidates, min_responses) {
                debug!(
                    attempt,
                    headers = quorum.headers.len(),
                    agreeing = quorum.agreeing,
                    "Reached quorum"
                );

                self.score_candidates(&candidates, &quorum.headers);
                return Ok(quorum.headers);
            }

            debug!(attempt, responses = candidates.len(), "No quorum yet");
        }

        self.metrics.quorum_failures.inc();

        for peer in outvoted(&candidates) {
            warn!(%peer, "Peer sent headers diverging from most responses");
            self.metrics.divergent_responses.inc();
            self.tracker.record(&peer, Outcome::Divergent);
        }

        Err(Error::Quorum {
            needed: min_responses,
            received: best_agreement(&candidates),
        })
    }

    fn add_candidate(
        &self,
        candidates: &mut Vec<Candidate>,
        chunk: &Chunk<'_>,
        peer: PeerId,
        elapsed: Duration,
        result: Delivery,
    ) {
        let Some(response) = self.check_delivery(peer, elapsed, result) else {
            return;
        };

        match check_range(&response, chunk) {
            Ok(headers) => candidates.push(Candidate {
                peer,
                elapsed,
                headers,
            }),
            Err(e) => {
                debug!(%peer, "Discarding invalid response: {e}");
                self.metrics.request_failures.inc();
                self.tracker.record(&peer, Outcome::Failure);
            }
        }
    }

    /// Send a request to every peer concurrently, each bounded by [`ClientParams::max_awaiting_time`].
    fn send_all(
        &self,
        peers: &[PeerId],
        request: &Request,
    ) -> FuturesUnordered<impl Future<Output = (PeerId, Duration, Delivery)>> {
        let timeout = self.params.max_awaiting_time;

        peers
            .iter()
            .map(|&peer| {
                let transport = Arc::clone(&self.transport);
                let request = request.clone();
                self.metrics.requests_sent.inc();

                async move {
                    let started = Instant::now();
                    let result = tokio::time::timeout(timeout, transport.request(peer, request)).await;
                    (peer, started.elapsed(), result)
                }
            })
            .collect()
    }

    /// Score timeouts and failed requests, returning the response of a successful one.
    fn check_delivery(
        &self,
        peer: PeerId,
        elapsed: Duration,
        result: Delivery,
    ) -> Option<Response> {
        match result {
            Ok(Ok(response)) => {
                trace!(%peer, ?elapsed, status = ?response.status, "Received response");
                self.metrics.response_time.observe(elapsed.as_secs_f64());
                Some(response)
            }
            Ok(Err(e)) => {
                debug!(%peer, "Request failed: {e}");
                self.metrics.request_failures.inc();
                self.tracker.record(&peer, Outcome::Failure);
                None
            }
            Err(_) => {
                debug!(%peer, timeout = ?self.params.max_awaiting_time, "Request timed out");
                self.metrics.request_timeouts.inc();
                self.tracker.record(&peer, Outcome::Timeout);
                None
            }
        }
    }

    fn score_candidates(&self, candidates: &[Candidate], accepted: &[ExtendedHeader]) {
        for candidate in candidates {
            if agree(&candidate.headers, accepted) {
                self.tracker
                    .record(&candidate.peer, Outcome::Success(candidate.elapsed));
            } else {
                warn!(peer = %candidate.peer, "Peer sent headers diverging from quorum");
                self.metrics.divergent_responses.inc();
                self.tracker.record(&candidate.peer, Outcome::Divergent);
            }
        }
    }

    /// Ask peers for their head.
    ///
    /// Picks the header with the most votes if it reaches [`ClientParams::min_responses`],
    /// otherwise the highest header received.
    #[tracing::instrument(skip_all)]
    pub async fn head(&self) -> Result<ExtendedHeader, Error> {
        let peers = self.tracker.select(self.fanout());
        if peers.is_empty() {
            return Err(Error::NoPeers);
        }

        let mut pending = self.send_all(&peers, &Request::Head);
        let mut heads = Vec::new();

        while let Some((peer, elapsed, result)) = pending.next().await {
            let Some(response) = self.check_delivery(peer, elapsed, result) else {
                continue;
            };

            match check_head(response) {
                Ok(head) => {
                    self.tracker.record(&peer, Outcome::Success(elapsed));
                    heads.push(head);
                }
                Err(e) => {
                    debug!(%peer, "Discarding invalid head: {e}");
                    self.tracker.record(&peer, Outcome::Failure);
                }
            }
        }

        let mut votes: HashMap<Hash, (usize, &ExtendedHeader)> = HashMap::new();
        for head in &heads {
            votes.entry(head.hash()).or_insert((0, head)).0 += 1;
        }

        let most_voted = votes
            .values()
            .max_by_key(|(count, head)| (*count, head.height()))
            .filter(|(count, _)| *count >= self.params.min_responses)
            .map(|(_, head)| (*head).clone());

        if let Some(head) = most_voted {
            return Ok(head);
        }

        heads
            .into_iter()
            .max_by_key(|head| head.height())
            .ok_or(Error::Quorum {
                needed: 1,
                received: 0,
            })
    }

    /// Ask peers for the header with the given hash, accepting the first valid answer.
    #[tracing::instrument(skip_all, fields(%hash))]
    pub async fn get_by_hash(&self, hash: Hash) -> Result<ExtendedHeader, Error> {
        let peers = self.tracker.select(self.fanout());
        if peers.is_empty() {
            return Err(Error::NoPeers);
        }

        let mut pending = self.send_all(&peers, &Request::Hashes(vec![hash]));

        while let Some((peer, elapsed, result)) = pending.next().await {
            let Some(response) = self.check_delivery(peer, elapsed, result) else {
                continue;
            };

            match check_hash(response, hash) {
                Ok(header) => {
                    self.tracker.record(&peer, Outcome::Success(elapsed));
                    return Ok(header);
                }
                Err(e) => {
                    debug!(%peer, "Discarding invalid response: {e}");
                    self.tracker.record(&peer, Outcome::Failure);
                }
            }
        }

        Err(Error::NotFound(hash))
    }
}

impl<T> Drop for Exchange<T> {
    fn drop(&mut self) {
        if let Ok(mut tracking) = self.tracking.lock() {
            if let Some(handle) = tracking.take() {
                handle.abort();
            }
        }
    }
}

/// Check that a response holds a contiguous, self-consistent chain starting at the start
/// of the chunk, linked to the parent of the chunk when it is known.
fn check_range(response: &Response, chunk: &Chunk<'_>) -> Result<Vec<ExtendedHeader>, ResponseError> {
    match response.status {
        StatusCode::Ok | StatusCode::NotFoundAbove(_) => {}
        status => return Err(ResponseError::Status(status)),
    }

    let headers = &response.headers;

    if headers.len() as u64 > chunk.amount {
        return Err(ResponseError::TooManyHeaders {
            expected: chunk.amount,
            actual: headers.len(),
        });
    }

    let mut expected = chunk.start;
    let mut previous = chunk.parent;

    for header in headers {
        if header.height() != expected {
            return Err(ResponseError::UnexpectedHeight {
                expected,
                actual: header.height(),
            });
        }

        header.validate_basic()?;

        if let Some(previous) = previous {
            header.verify_adjacent(previous)?;
        }

        previous = Some(header);
        expected = expected.increment();
    }

    Ok(headers.clone())
}

fn check_head(response: Response) -> Result<ExtendedHeader, ResponseError> {
    let head = response
        .headers
        .into_iter()
        .next()
        .ok_or(ResponseError::Empty)?;

    head.validate_basic()?;
    Ok(head)
}

fn check_hash(response: Response, hash: Hash) -> Result<ExtendedHeader, ResponseError> {
    if response.status != StatusCode::Ok {
        return Err(ResponseError::Status(response.status));
    }

    let header = response
        .headers
        .into_iter()
        .next()
        .ok_or(ResponseError::Empty)?;

    header.validate_basic()?;

    if header.hash() != hash {
        return Err(ResponseError::UnexpectedHash {
            expected: hash,
            actual: header.hash(),
        });
    }

    Ok(header)
}

/// Whether two header sequences are identical on their common prefix.
fn agree(a: &[ExtendedHeader], b: &[ExtendedHeader]) -> bool {
    a.iter().zip(b).all(|(a, b)| a.hash() == b.hash())
}

/// Find the longest prefix of headers that at least `min_responses` candidates agree on.
///
/// Each candidate is tried as an anchor. The candidates consistent with the
/// anchor are ranked by length, and the accepted length is the one reached by
/// `min_responses` of them, capped by the length of the anchor itself.
fn find_quorum(candidates: &[Candidate], min_responses: usize) -> Option<Quorum> {
    let mut best: Option<(usize, usize, usize)> = None;

    for (index, anchor) in candidates.iter().enumerate() {
        let mut lengths: Vec<usize> = candidates
            .iter()
            .filter(|c| agree(&anchor.headers, &c.headers))
            .map(|c| c.headers.len())
            .collect();

        if lengths.len() < min_responses {
            continue;
        }

        lengths.sort_unstable_by(|a, b| b.cmp(a));

        let len = lengths[min_responses - 1].min(anchor.headers.len());
        let agreeing = lengths.iter().filter(|&&l| l >= len).count();

        if best.is_none_or(|(best_len, _, _)| len > best_len) {
            best = Some((len, index, agreeing));
        }
    }

    best.map(|(len, index, agreeing)| Quorum {
        headers: candidates[index].headers[..len].to_vec(),
        agreeing,
    })
}

/// Number of candidates consistent with each candidate, itself included.
fn support(candidates: &[Candidate]) -> Vec<usize> {
    candidates
        .iter()
        .map(|anchor| {
            candidates
                .iter()
                .filter(|c| agree(&anchor.headers, &c.headers))
                .count()
        })
        .collect()
}

/// Size of the largest group of mutually consistent candidates.
fn best_agreement(candidates: &[Candidate]) -> usize {
    support(candidates).into_iter().max().unwrap_or(0)
}

/// Peers contradicting a candidate that more peers agree with than with their own response.
fn outvoted(candidates: &[Candidate]) -> Vec<PeerId> {
    let support = support(candidates);

    candidates
        .iter()
        .zip(&support)
        .filter(|&(candidate, &own)| {
            candidates.iter().zip(&support).any(|(other, &theirs)| {
                theirs > own && !agree(&candidate.headers, &other.headers)
            })
        })
        .map(|(candidate, _)| candidate.peer)
        .collect()
}
