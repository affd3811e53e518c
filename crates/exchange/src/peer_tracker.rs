use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::{ClientParams, PeerId};

/// Outcome of a request to a peer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The peer answered with data that was accepted, in the given time
    Success(Duration),

    /// The request failed or the response was invalid
    Failure,

    /// The peer did not answer in time
    Timeout,

    /// The peer answered with data that contradicts the accepted headers
    Divergent,
}

#[derive(Copy, Clone, Debug)]
pub struct ScoringConfig {
    /// Threshold for what is considered "fast enough".
    pub slow_threshold: Duration,
    /// Score delta for a success faster than the slow_threshold.
    pub fast_success: f64,
    /// Score delta for a success that's slower than the slow_threshold.
    pub slow_success: f64,
    /// Score delta for a failure.
    pub failure: f64,
    /// Score delta for a timeout.
    pub timeout: f64,
    /// Score delta for a divergent response.
    pub divergent: f64,
    /// Minimum score.
    pub min_score: f64,
    /// Maximum score.
    pub max_score: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            slow_threshold: Duration::from_millis(500),
            fast_success: 2.0,
            slow_success: 0.5,
            failure: -2.0,
            timeout: -4.0,
            divergent: -8.0,
            min_score: -20.0,
            max_score: 20.0,
        }
    }
}

impl ScoringConfig {
    pub fn delta(&self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::Success(elapsed) if elapsed <= self.slow_threshold => self.fast_success,
            Outcome::Success(_) => self.slow_success,
            Outcome::Failure => self.failure,
            Outcome::Timeout => self.timeout,
            Outcome::Divergent => self.divergent,
        }
    }

    fn clamp(&self, score: f64) -> f64 {
        score.clamp(self.min_score, self.max_score)
    }
}

#[derive(Copy, Clone, Debug)]
struct PeerStat {
    score: f64,
    last_seen: Instant,
    last_success: Option<Instant>,
}

/// Bounded set of peers and their trust scores.
///
/// When full, tracking a new peer evicts the lowest scoring peer,
/// or the least recently seen one among equally scored peers.
#[derive(Debug)]
pub struct PeerTracker {
    peers: Mutex<HashMap<PeerId, PeerStat>>,
    default_score: f64,
    max_size: usize,
    scoring: ScoringConfig,
}

impl PeerTracker {
    pub fn new(default_score: f64, max_size: usize, scoring: ScoringConfig) -> Self {
        Self {
            peers: Mutex::new(HashMap::new()),
            default_score,
            max_size,
            scoring,
        }
    }

    pub fn from_params(params: &ClientParams) -> Self {
        Self::new(
            params.default_score,
            params.max_peer_tracker_size,
            ScoringConfig::default(),
        )
    }

    /// Start tracking a peer, or refresh when it was last seen.
    pub fn track(&self, peer: PeerId) {
        if self.max_size == 0 {
            return;
        }

        let mut peers = self.peers.lock().expect("poisoned lock");
        let now = Instant::now();

        if let Some(stat) = peers.get_mut(&peer) {
            stat.last_seen = now;
            return;
        }

        if peers.len() >= self.max_size {
            if let Some(evicted) = lowest(&peers) {
                debug!(%evicted, "Peer tracker is full, evicting peer");
                peers.remove(&evicted);
            }
        }

        trace!(%peer, score = self.default_score, "Tracking peer");

        peers.insert(
            peer,
            PeerStat {
                score: self.scoring.clamp(self.default_score),
                last_seen: now,
                last_success: None,
            },
        );
    }

    pub fn remove(&self, peer: &PeerId) -> bool {
        self.peers
            .lock()
            .expect("poisoned lock")
            .remove(peer)
            .is_some()
    }

    /// Add `delta` to the score of a tracked peer.
    pub fn adjust(&self, peer: &PeerId, delta: f64) {
        let mut peers = self.peers.lock().expect("poisoned lock");

        if let Some(stat) = peers.get_mut(peer) {
            stat.score = self.scoring.clamp(stat.score + delta);
            stat.last_seen = Instant::now();
        }
    }

    /// Update the score of a peer after a request.
    pub fn record(&self, peer: &PeerId, outcome: Outcome) {
        let delta = self.scoring.delta(outcome);
        let mut peers = self.peers.lock().expect("poisoned lock");

        let Some(stat) = peers.get_mut(peer) else {
            return;
        };

        let now = Instant::now();
        stat.score = self.scoring.clamp(stat.score + delta);
        stat.last_seen = now;

        if let Outcome::Success(_) = outcome {
            stat.last_success = Some(now);
        }

        trace!(%peer, ?outcome, score = stat.score, "Updated peer score");
    }

    pub fn score(&self, peer: &PeerId) -> Option<f64> {
        self.peers
            .lock()
            .expect("poisoned lock")
            .get(peer)
            .map(|stat| stat.score)
    }

    /// Up to `n` peers, best first.
    pub fn select(&self, n: usize) -> Vec<PeerId> {
        self.select_except(n, &HashSet::new())
    }

    /// Up to `n` peers not in `excluded`, best first.
    ///
    /// Peers are ordered by descending score, then by most recent success.
    pub fn select_except(&self, n: usize, excluded: &HashSet<PeerId>) -> Vec<PeerId> {
        let peers = self.peers.lock().expect("poisoned lock");

        let mut candidates: Vec<_> = peers
            .iter()
            .filter(|(peer, _)| !excluded.contains(peer))
            .collect();

        candidates.sort_by(|(a_id, a), (b_id, b)| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.last_success.cmp(&a.last_success))
                .then_with(|| a_id.cmp(b_id))
        });

        candidates
            .into_iter()
            .take(n)
            .map(|(peer, _)| *peer)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.lock().expect("poisoned lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lowest(peers: &HashMap<PeerId, PeerStat>) -> Option<PeerId> {
    peers
        .iter()
        .min_by(|(_, a), (_, b)| match a.score.total_cmp(&b.score) {
            Ordering::Equal => a.last_seen.cmp(&b.last_seen),
            ordering => ordering,
        })
        .map(|(peer, _)| *peer)
}
