//! The gossipdns protocol state machine
//!
//! [`Protocol`] is the hook set a transport drives: one `on_initialized`
//! when the protocol is registered, then `on_connected`, `on_message` and
//! `on_disconnected` as peer traffic arrives. [`GossipDns`] answers URL
//! queries from its record store, merges URL lists it receives and, once
//! initialized, broadcasts its own queries on a fixed interval.
//!
//! None of the hooks fail. Malformed payloads, unknown codes and failed
//! sends are logged, counted in [`GossipStats`] and reported as
//! [`GossipEvent`]s, then dropped.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Level};

use crate::error::GossipDnsError;
use crate::gossip::{emit, GossipConfig, GossipEvent, GossipScheduler, GossipStats};
use crate::message::{codes, decode_urls, encode_urls, Message, MessageKind, ProtocolInfo};
use crate::peer::PeerContext;
use crate::records::RecordStore;
use crate::transport::Transport;

/// Hooks a transport calls on a registered protocol
#[async_trait]
pub trait Protocol: Send + Sync {
    /// Protocol identity
    fn info(&self) -> &ProtocolInfo;

    /// Called once, after registration, before peer traffic is processed
    async fn on_initialized(&self, transport: Arc<dyn Transport>);

    /// Called once per received wire message
    async fn on_message(&self, transport: &dyn Transport, peer: &PeerContext, message: Message);

    /// Called once per new peer session
    async fn on_connected(&self, transport: &dyn Transport, peer: &PeerContext);

    /// Called once per closed peer session
    async fn on_disconnected(&self, transport: &dyn Transport, peer: &PeerContext);
}

/// Lifecycle of a protocol instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolState {
    Uninitialized,
    Initialized,
}

struct Lifecycle {
    state: ProtocolState,
    scheduler: Option<JoinHandle<()>>,
}

/// Gossip protocol converging a set of DNS record URLs
pub struct GossipDns {
    config: GossipConfig,
    records: RwLock<RecordStore>,
    stats: Arc<RwLock<GossipStats>>,
    events: mpsc::UnboundedSender<GossipEvent>,
    lifecycle: Mutex<Lifecycle>,
}

impl GossipDns {
    /// Create a protocol instance and the receiver for its events
    pub fn new(
        config: GossipConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<GossipEvent>), GossipDnsError> {
        config.validate()?;

        let (events, events_rx) = mpsc::unbounded_channel();
        let records = RecordStore::with_seed(config.seed_urls.iter().cloned());

        let protocol = Self {
            config,
            records: RwLock::new(records),
            stats: Arc::new(RwLock::new(GossipStats::default())),
            events,
            lifecycle: Mutex::new(Lifecycle {
                state: ProtocolState::Uninitialized,
                scheduler: None,
            }),
        };

        Ok((protocol, events_rx))
    }

    pub fn builder() -> GossipDnsBuilder {
        GossipDnsBuilder::new()
    }

    pub fn config(&self) -> &GossipConfig {
        &self.config
    }

    /// Snapshot of the known URLs in first-seen order
    pub async fn records(&self) -> Vec<String> {
        self.records.read().await.current()
    }

    /// Protocol statistics
    pub async fn stats(&self) -> GossipStats {
        let mut stats = self.stats.read().await.clone();
        stats.known_urls = self.records.read().await.len();
        stats
    }

    pub fn state(&self) -> ProtocolState {
        self.lifecycle().state
    }

    pub fn is_initialized(&self) -> bool {
        self.state() == ProtocolState::Initialized
    }

    /// Stop the broadcast timer. In-flight sends are left to finish.
    pub fn shutdown(&self) {
        if let Some(handle) = self.lifecycle().scheduler.take() {
            handle.abort();
            info!("Stopped gossip broadcast timer");
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Move to `Initialized` and start the timer. False if already initialized.
    fn start_scheduler(&self, transport: Arc<dyn Transport>) -> bool {
        let mut lifecycle = self.lifecycle();
        if lifecycle.state == ProtocolState::Initialized {
            return false;
        }

        let scheduler = GossipScheduler::new(
            self.config.broadcast_interval,
            transport,
            Arc::clone(&self.stats),
            self.events.clone(),
        );

        lifecycle.state = ProtocolState::Initialized;
        lifecycle.scheduler = Some(scheduler.spawn());
        true
    }

    async fn handle_new_urls(&self, peer: &PeerContext, payload: &[u8]) {
        let urls = match decode_urls(payload) {
            Ok(urls) => urls,
            Err(e) => {
                self.stats.write().await.decode_errors += 1;
                warn!(peer = %peer, "Dropping NEW_URLS with malformed payload: {}", e);
                emit(
                    &self.events,
                    GossipEvent::DecodeFailed {
                        peer_id: peer.id.clone(),
                        error: e.to_string(),
                    },
                );
                return;
            }
        };

        let added = self.records.write().await.merge(&urls);
        {
            let mut stats = self.stats.write().await;
            stats.urls_received += urls.len() as u64;
            stats.urls_merged += added as u64;
        }

        info!(
            peer = %peer,
            added,
            "Received {} urls from {}",
            urls.len(),
            peer.short_id()
        );
        emit(
            &self.events,
            GossipEvent::UrlsMerged {
                peer_id: peer.id.clone(),
                received: urls.len(),
                added,
            },
        );
    }

    async fn handle_find_urls(&self, transport: &dyn Transport, peer: &PeerContext) {
        let urls = self.records.read().await.current();
        let payload = match encode_urls(&urls) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(peer = %peer, "Failed to encode record store: {}", e);
                return;
            }
        };

        info!(peer = %peer, "Sending {} urls to {}", urls.len(), peer.short_id());

        match transport.send(codes::NEW_URLS, payload, peer).await {
            Ok(()) => {
                {
                    let mut stats = self.stats.write().await;
                    stats.queries_answered += 1;
                    stats.urls_sent += urls.len() as u64;
                }
                emit(
                    &self.events,
                    GossipEvent::UrlsSent {
                        peer_id: peer.id.clone(),
                        count: urls.len(),
                    },
                );
            }
            Err(e) => {
                self.stats.write().await.send_failures += 1;
                warn!(peer = %peer, "Failed to answer FIND_URLS: {}", e);
                emit(
                    &self.events,
                    GossipEvent::SendFailed {
                        peer_id: peer.id.clone(),
                        code: codes::NEW_URLS,
                        error: e.to_string(),
                    },
                );
            }
        }
    }

    async fn handle_unknown(&self, peer: &PeerContext, code: u64) {
        self.stats.write().await.unknown_codes += 1;
        warn!(
            peer = %peer,
            "{}, ignoring",
            GossipDnsError::unknown_code(code)
        );
        emit(
            &self.events,
            GossipEvent::UnknownCode {
                peer_id: peer.id.clone(),
                code,
            },
        );
    }
}

#[async_trait]
impl Protocol for GossipDns {
    fn info(&self) -> &ProtocolInfo {
        &self.config.protocol
    }

    async fn on_initialized(&self, transport: Arc<dyn Transport>) {
        let node_id = transport.local_node_id().to_string();

        if !self.start_scheduler(transport) {
            warn!(node_id = %node_id, "Protocol already initialized, ignoring");
            return;
        }

        let known = self.records.read().await.len();
        info!(
            node_id = %node_id,
            protocol = %self.config.protocol,
            urls = known,
            "Service started"
        );
        emit(
            &self.events,
            GossipEvent::Initialized {
                node_id,
                protocol: self.config.protocol.clone(),
            },
        );
    }

    async fn on_message(&self, transport: &dyn Transport, peer: &PeerContext, message: Message) {
        match message.kind() {
            MessageKind::NewUrls => self.handle_new_urls(peer, &message.payload).await,
            MessageKind::FindUrls => self.handle_find_urls(transport, peer).await,
            MessageKind::Unknown(code) => self.handle_unknown(peer, code).await,
        }

        if tracing::enabled!(Level::DEBUG) {
            let records = self.records.read().await;
            debug!(
                node = %peer.local_short_id(),
                urls = ?records.as_slice(),
                "Current urls"
            );
        }
    }

    async fn on_connected(&self, _transport: &dyn Transport, peer: &PeerContext) {
        info!("Connected new peer {}", peer);
        emit(
            &self.events,
            GossipEvent::PeerConnected {
                peer_id: peer.id.clone(),
            },
        );
    }

    async fn on_disconnected(&self, _transport: &dyn Transport, peer: &PeerContext) {
        info!("Disconnected peer {}", peer);
        emit(
            &self.events,
            GossipEvent::PeerDisconnected {
                peer_id: peer.id.clone(),
            },
        );
    }
}

impl Drop for GossipDns {
    fn drop(&mut self) {
        if let Some(handle) = self.lifecycle().scheduler.take() {
            handle.abort();
        }
    }
}

/// Builder for [`GossipDns`]
#[derive(Debug, Clone, Default)]
pub struct GossipDnsBuilder {
    config: GossipConfig,
}

impl GossipDnsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: GossipConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_seed_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.seed_urls = urls.into_iter().map(Into::into).collect();
        self
    }

    pub fn add_seed_url(mut self, url: impl Into<String>) -> Self {
        self.config.seed_urls.push(url.into());
        self
    }

    pub fn with_broadcast_interval(mut self, interval: Duration) -> Self {
        self.config.broadcast_interval = interval;
        self
    }

    pub fn with_protocol(mut self, protocol: ProtocolInfo) -> Self {
        self.config.protocol = protocol;
        self
    }

    pub fn build(
        self,
    ) -> Result<(GossipDns, mpsc::UnboundedReceiver<GossipEvent>), GossipDnsError> {
        GossipDns::new(self.config)
    }
}
