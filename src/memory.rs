//! In-process transport for tests and the demo binary
//!
//! A [`MemoryNetwork`] is a hub shared by every node of a simulated mesh.
//! Nodes register to get a [`MemoryTransport`] plus the receiving end of
//! their inbound event channel; links between nodes are created and torn
//! down explicitly. Delivery is immediate and lossless.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

use crate::error::GossipDnsError;
use crate::message::Message;
use crate::peer::PeerContext;
use crate::transport::{Transport, TransportEvent};

#[derive(Default)]
struct NetworkState {
    /// Inbound channel of every registered node
    endpoints: HashMap<String, mpsc::UnboundedSender<TransportEvent>>,
    /// node -> linked peer -> that peer as seen from node
    links: HashMap<String, BTreeMap<String, PeerContext>>,
}

impl NetworkState {
    fn ensure_registered(&self, node_id: &str) -> Result<(), GossipDnsError> {
        if self.endpoints.contains_key(node_id) {
            Ok(())
        } else {
            Err(GossipDnsError::transport(format!(
                "node {} is not registered",
                node_id
            )))
        }
    }

    fn is_linked(&self, a: &str, b: &str) -> bool {
        self.links.get(a).is_some_and(|peers| peers.contains_key(b))
    }

    fn notify(&self, node_id: &str, event: TransportEvent) {
        if let Some(endpoint) = self.endpoints.get(node_id) {
            if endpoint.send(event).is_err() {
                debug!(node_id, "Inbound channel closed, dropping event");
            }
        }
    }
}

/// Shared hub connecting in-process nodes
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<RwLock<NetworkState>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the network
    pub async fn register(
        &self,
        node_id: impl Into<String>,
    ) -> Result<(MemoryTransport, mpsc::UnboundedReceiver<TransportEvent>), GossipDnsError> {
        let node_id = node_id.into();
        let mut state = self.state.write().await;

        if state.endpoints.contains_key(&node_id) {
            return Err(GossipDnsError::transport(format!(
                "node {} is already registered",
                node_id
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.endpoints.insert(node_id.clone(), tx);
        state.links.insert(node_id.clone(), BTreeMap::new());

        debug!(node_id = %node_id, "Registered in-memory node");

        let transport = MemoryTransport {
            node_id,
            network: self.clone(),
        };
        Ok((transport, rx))
    }

    /// Remove a node, closing every link it has
    pub async fn unregister(&self, node_id: &str) -> Result<(), GossipDnsError> {
        let mut state = self.state.write().await;
        state.ensure_registered(node_id)?;

        state.endpoints.remove(node_id);
        let peers = state.links.remove(node_id).unwrap_or_default();

        for peer_id in peers.keys() {
            let seen_by_peer = state
                .links
                .get_mut(peer_id)
                .and_then(|links| links.remove(node_id));
            if let Some(seen_by_peer) = seen_by_peer {
                state.notify(peer_id, TransportEvent::Disconnected(seen_by_peer));
            }
        }

        info!(node_id, links = peers.len(), "Unregistered in-memory node");
        Ok(())
    }

    /// Link two registered nodes and tell both sides
    pub async fn connect(&self, a: &str, b: &str) -> Result<(), GossipDnsError> {
        let mut state = self.state.write().await;
        state.ensure_registered(a)?;
        state.ensure_registered(b)?;

        if a == b {
            return Err(GossipDnsError::transport(format!(
                "node {} cannot connect to itself",
                a
            )));
        }
        if state.is_linked(a, b) {
            return Err(GossipDnsError::transport(format!(
                "nodes {} and {} are already connected",
                a, b
            )));
        }

        let b_seen_by_a = PeerContext::new(b, a);
        let a_seen_by_b = PeerContext::new(a, b);

        state
            .links
            .entry(a.to_string())
            .or_default()
            .insert(b.to_string(), b_seen_by_a.clone());
        state
            .links
            .entry(b.to_string())
            .or_default()
            .insert(a.to_string(), a_seen_by_b.clone());

        state.notify(a, TransportEvent::Connected(b_seen_by_a));
        state.notify(b, TransportEvent::Connected(a_seen_by_b));

        debug!(a, b, "Linked in-memory nodes");
        Ok(())
    }

    /// Unlink two nodes and tell both sides
    pub async fn disconnect(&self, a: &str, b: &str) -> Result<(), GossipDnsError> {
        let mut state = self.state.write().await;
        state.ensure_registered(a)?;
        state.ensure_registered(b)?;

        let b_seen_by_a = state.links.get_mut(a).and_then(|links| links.remove(b));
        let a_seen_by_b = state.links.get_mut(b).and_then(|links| links.remove(a));

        match (b_seen_by_a, a_seen_by_b) {
            (Some(b_seen_by_a), Some(a_seen_by_b)) => {
                state.notify(a, TransportEvent::Disconnected(b_seen_by_a));
                state.notify(b, TransportEvent::Disconnected(a_seen_by_b));
                debug!(a, b, "Unlinked in-memory nodes");
                Ok(())
            }
            _ => Err(GossipDnsError::transport(format!(
                "nodes {} and {} are not connected",
                a, b
            ))),
        }
    }

    /// Link every pair of `node_ids`
    pub async fn connect_all(&self, node_ids: &[&str]) -> Result<(), GossipDnsError> {
        for (i, a) in node_ids.iter().enumerate() {
            for b in &node_ids[i + 1..] {
                self.connect(a, b).await?;
            }
        }
        Ok(())
    }

    /// Registered node ids, sorted
    pub async fn nodes(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut nodes: Vec<String> = state.endpoints.keys().cloned().collect();
        nodes.sort();
        nodes
    }
}

/// One node's handle on a [`MemoryNetwork`]
#[derive(Clone)]
pub struct MemoryTransport {
    node_id: String,
    network: MemoryNetwork,
}

#[async_trait]
impl Transport for MemoryTransport {
    fn local_node_id(&self) -> &str {
        &self.node_id
    }

    /// Linked peers in id order
    async fn peers(&self) -> Vec<PeerContext> {
        let state = self.network.state.read().await;
        state
            .links
            .get(&self.node_id)
            .map(|peers| peers.values().cloned().collect())
            .unwrap_or_default()
    }

    async fn send(
        &self,
        code: u64,
        payload: Vec<u8>,
        peer: &PeerContext,
    ) -> Result<(), GossipDnsError> {
        let state = self.network.state.read().await;

        let sender_seen_by_peer = state
            .links
            .get(&peer.id)
            .and_then(|links| links.get(&self.node_id))
            .cloned()
            .ok_or_else(|| GossipDnsError::send("peer is not connected", peer.id.clone()))?;

        let endpoint = state
            .endpoints
            .get(&peer.id)
            .ok_or_else(|| GossipDnsError::send("peer is not registered", peer.id.clone()))?;

        endpoint
            .send(TransportEvent::Message {
                peer: sender_seen_by_peer,
                message: Message::new(code, payload),
            })
            .map_err(|_| GossipDnsError::send("peer has gone away", peer.id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::codes;

    #[tokio::test]
    async fn test_register_rejects_duplicates() {
        let network = MemoryNetwork::new();
        let _a = network.register("a").await.unwrap();

        let result = network.register("a").await;
        assert!(matches!(result, Err(GossipDnsError::Transport { .. })));
        assert_eq!(network.nodes().await, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_connect_notifies_both_sides() {
        let network = MemoryNetwork::new();
        let (_a, mut a_rx) = network.register("a").await.unwrap();
        let (_b, mut b_rx) = network.register("b").await.unwrap();

        network.connect("a", "b").await.unwrap();

        match a_rx.recv().await.unwrap() {
            TransportEvent::Connected(peer) => {
                assert_eq!(peer.id, "b");
                assert_eq!(peer.local_node_id, "a");
            }
            other => panic!("unexpected event {:?}", other),
        }
        match b_rx.recv().await.unwrap() {
            TransportEvent::Connected(peer) => assert_eq!(peer.id, "a"),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connect_errors() {
        let network = MemoryNetwork::new();
        let _a = network.register("a").await.unwrap();
        let _b = network.register("b").await.unwrap();

        assert!(network.connect("a", "missing").await.is_err());
        assert!(network.connect("a", "a").await.is_err());
        network.connect("a", "b").await.unwrap();
        assert!(network.connect("b", "a").await.is_err());
        assert!(network.disconnect("a", "missing").await.is_err());
    }

    #[tokio::test]
    async fn test_connect_all_links_every_pair() {
        let network = MemoryNetwork::new();
        let (a, _a_rx) = network.register("a").await.unwrap();
        let (b, _b_rx) = network.register("b").await.unwrap();
        let (c, _c_rx) = network.register("c").await.unwrap();

        network.connect_all(&["a", "b", "c"]).await.unwrap();

        for (transport, expected) in [(&a, ["b", "c"]), (&b, ["a", "c"]), (&c, ["a", "b"])] {
            let ids: Vec<String> = transport.peers().await.into_iter().map(|p| p.id).collect();
            assert_eq!(ids, expected);
        }
    }

    #[tokio::test]
    async fn test_peers_sorted_by_id() {
        let network = MemoryNetwork::new();
        let (hub, _hub_rx) = network.register("hub").await.unwrap();
        let mut receivers = Vec::new();
        for id in ["zeta", "alpha", "mu"] {
            receivers.push(network.register(id).await.unwrap());
            network.connect("hub", id).await.unwrap();
        }

        let ids: Vec<String> = hub.peers().await.into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["alpha", "mu", "zeta"]);
    }

    #[tokio::test]
    async fn test_send_delivers_message_with_sender_context() {
        let network = MemoryNetwork::new();
        let (a, _a_rx) = network.register("a").await.unwrap();
        let (_b, mut b_rx) = network.register("b").await.unwrap();
        network.connect("a", "b").await.unwrap();
        let _connected = b_rx.recv().await.unwrap();

        let peer_b = a.peers().await.remove(0);
        a.send(codes::FIND_URLS, Vec::new(), &peer_b).await.unwrap();

        match b_rx.recv().await.unwrap() {
            TransportEvent::Message { peer, message } => {
                assert_eq!(peer.id, "a");
                assert_eq!(peer.local_node_id, "b");
                assert_eq!(message, Message::find_urls());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_after_disconnect_fails() {
        let network = MemoryNetwork::new();
        let (a, _a_rx) = network.register("a").await.unwrap();
        let (_b, _b_rx) = network.register("b").await.unwrap();
        network.connect("a", "b").await.unwrap();
        let peer_b = a.peers().await.remove(0);

        network.disconnect("a", "b").await.unwrap();

        assert!(a.peers().await.is_empty());
        let result = a.send(codes::FIND_URLS, Vec::new(), &peer_b).await;
        assert!(matches!(result, Err(GossipDnsError::Send { ref peer_id, .. }) if peer_id == "b"));
    }

    #[tokio::test]
    async fn test_send_to_dropped_receiver_fails() {
        let network = MemoryNetwork::new();
        let (a, _a_rx) = network.register("a").await.unwrap();
        let (_b, b_rx) = network.register("b").await.unwrap();
        network.connect("a", "b").await.unwrap();
        drop(b_rx);

        let peer_b = a.peers().await.remove(0);
        let result = a.send(codes::FIND_URLS, Vec::new(), &peer_b).await;
        assert!(matches!(result, Err(GossipDnsError::Send { .. })));
    }

    #[tokio::test]
    async fn test_unregister_disconnects_peers() {
        let network = MemoryNetwork::new();
        let (_a, _a_rx) = network.register("a").await.unwrap();
        let (b, mut b_rx) = network.register("b").await.unwrap();
        network.connect("a", "b").await.unwrap();
        let _connected = b_rx.recv().await.unwrap();

        network.unregister("a").await.unwrap();

        assert!(matches!(
            b_rx.recv().await.unwrap(),
            TransportEvent::Disconnected(peer) if peer.id == "a"
        ));
        assert!(b.peers().await.is_empty());
        assert_eq!(network.nodes().await, vec!["b".to_string()]);
    }
}
