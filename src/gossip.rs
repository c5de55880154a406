//! Periodic query broadcast
//!
//! Every `broadcast_interval` the scheduler asks the transport for its
//! current peers and fires one `FIND_URLS` query at each of them. Each send
//! runs in its own task and is never joined, so one slow or failing peer
//! cannot hold back the others or the next tick.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::GossipDnsError;
use crate::logging::{CorrelationId, PerformanceTimer};
use crate::message::{codes, ProtocolInfo};
use crate::peer::PeerContext;
use crate::transport::Transport;

/// Configuration for the gossip protocol
#[derive(Debug, Clone)]
pub struct GossipConfig {
    /// Interval between query broadcasts
    pub broadcast_interval: Duration,
    /// URLs this node knows at startup
    pub seed_urls: Vec<String>,
    /// Protocol identity
    pub protocol: ProtocolInfo,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            broadcast_interval: Duration::from_secs(10),
            seed_urls: Vec::new(),
            protocol: ProtocolInfo::default(),
        }
    }
}

impl GossipConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_broadcast_interval(mut self, interval: Duration) -> Self {
        self.broadcast_interval = interval;
        self
    }

    pub fn with_seed_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.seed_urls = urls.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_protocol(mut self, protocol: ProtocolInfo) -> Self {
        self.protocol = protocol;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), GossipDnsError> {
        if self.broadcast_interval.is_zero() {
            return Err(GossipDnsError::config("broadcast_interval cannot be zero"));
        }
        if self.protocol.name.is_empty() {
            return Err(GossipDnsError::config("protocol name cannot be empty"));
        }
        Ok(())
    }
}

/// Gossip protocol statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GossipStats {
    /// Broadcast rounds started
    pub rounds: u64,
    /// FIND_URLS queries delivered to the transport
    pub queries_sent: u64,
    /// FIND_URLS queries answered
    pub queries_answered: u64,
    /// URLs sent in answers
    pub urls_sent: u64,
    /// URLs received in NEW_URLS messages
    pub urls_received: u64,
    /// URLs that were new to the store
    pub urls_merged: u64,
    pub decode_errors: u64,
    pub unknown_codes: u64,
    pub send_failures: u64,
    /// Size of the record store
    pub known_urls: usize,
}

/// Observable protocol activity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GossipEvent {
    /// Protocol started its broadcast timer
    Initialized { node_id: String, protocol: ProtocolInfo },
    PeerConnected { peer_id: String },
    PeerDisconnected { peer_id: String },
    /// A broadcast round fired
    RoundStarted { round: u64, peers: usize },
    /// A FIND_URLS query reached the transport
    QuerySent { peer_id: String },
    /// A FIND_URLS query was answered
    UrlsSent { peer_id: String, count: usize },
    /// A NEW_URLS message was merged
    UrlsMerged {
        peer_id: String,
        received: usize,
        added: usize,
    },
    DecodeFailed { peer_id: String, error: String },
    UnknownCode { peer_id: String, code: u64 },
    SendFailed {
        peer_id: String,
        code: u64,
        error: String,
    },
}

pub(crate) fn emit(events: &mpsc::UnboundedSender<GossipEvent>, event: GossipEvent) {
    if let Err(e) = events.send(event) {
        debug!("Dropping gossip event, receiver closed: {:?}", e.0);
    }
}

/// Drives the periodic FIND_URLS fan-out
pub struct GossipScheduler {
    interval: Duration,
    transport: Arc<dyn Transport>,
    stats: Arc<RwLock<GossipStats>>,
    events: mpsc::UnboundedSender<GossipEvent>,
}

impl GossipScheduler {
    pub fn new(
        interval: Duration,
        transport: Arc<dyn Transport>,
        stats: Arc<RwLock<GossipStats>>,
        events: mpsc::UnboundedSender<GossipEvent>,
    ) -> Self {
        Self {
            interval,
            transport,
            stats,
            events,
        }
    }

    /// Run the timer on its own task. The first tick is due one full
    /// interval after this call.
    pub fn spawn(self) -> JoinHandle<()> {
        let first_tick = Instant::now() + self.interval;
        tokio::spawn(self.run(first_tick))
    }

    async fn run(self, first_tick: Instant) {
        info!(
            node_id = %self.transport.local_node_id(),
            interval_ms = self.interval.as_millis() as u64,
            "Starting gossip broadcast timer"
        );

        let mut ticker = interval_at(first_tick, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.run_round().await;
        }
    }

    /// Fire one FIND_URLS at every connected peer. Returns the number of
    /// sends started; their completion is not awaited.
    pub async fn run_round(&self) -> usize {
        let correlation_id = CorrelationId::new();
        let timer = PerformanceTimer::new("gossip_round")
            .with_metadata("node_id", self.transport.local_node_id());

        let peers = self.transport.peers().await;
        let round = {
            let mut stats = self.stats.write().await;
            stats.rounds += 1;
            stats.rounds
        };

        emit(
            &self.events,
            GossipEvent::RoundStarted {
                round,
                peers: peers.len(),
            },
        );

        if peers.is_empty() {
            debug!(
                correlation_id = %correlation_id.short(),
                round,
                "No connected peers, nothing to broadcast"
            );
            return 0;
        }

        let peer_count = peers.len();
        for peer in peers {
            let transport = Arc::clone(&self.transport);
            let stats = Arc::clone(&self.stats);
            let events = self.events.clone();
            let correlation_id = correlation_id.clone();

            tokio::spawn(async move {
                send_query(transport, peer, stats, events, correlation_id).await;
            });
        }

        let metrics = timer.with_metadata("peer_count", peer_count).finish();
        crate::performance_metric!(metrics, correlation_id, round = round);

        peer_count
    }
}

async fn send_query(
    transport: Arc<dyn Transport>,
    peer: PeerContext,
    stats: Arc<RwLock<GossipStats>>,
    events: mpsc::UnboundedSender<GossipEvent>,
    correlation_id: CorrelationId,
) {
    match transport.send(codes::FIND_URLS, Vec::new(), &peer).await {
        Ok(()) => {
            stats.write().await.queries_sent += 1;
            debug!(
                correlation_id = %correlation_id.short(),
                peer = %peer.short_id(),
                "Sent FIND_URLS"
            );
            emit(&events, GossipEvent::QuerySent { peer_id: peer.id });
        }
        Err(e) => {
            stats.write().await.send_failures += 1;
            warn!(
                correlation_id = %correlation_id.short(),
                peer = %peer.short_id(),
                "Failed to send FIND_URLS: {}",
                e
            );
            emit(
                &events,
                GossipEvent::SendFailed {
                    peer_id: peer.id,
                    code: codes::FIND_URLS,
                    error: e.to_string(),
                },
            );
        }
    }
}
