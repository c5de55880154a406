//! Node host driving a protocol from transport events
//!
//! `GossipNode` sits between a transport's inbound event channel and a
//! [`Protocol`]. Connection events are handled inline; wire messages are
//! queued to one worker task per peer so that each peer's messages are
//! handled in arrival order while different peers proceed independently.
//!
//! `on_disconnected` is called as soon as the `Disconnected` event is read.
//! Messages from that peer still queued on its worker are handled after it,
//! so observers may see `PeerDisconnected` before that peer's last
//! `UrlsMerged`.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::GossipDnsError;
use crate::message::Message;
use crate::peer::PeerContext;
use crate::protocol::Protocol;
use crate::transport::{Transport, TransportEvent};

/// Inbound queue of one peer worker
struct PeerWorker {
    queue: mpsc::UnboundedSender<(PeerContext, Message)>,
    handle: JoinHandle<()>,
}

/// Runs one protocol instance on top of one transport
pub struct GossipNode {
    protocol: Arc<dyn Protocol>,
    transport: Arc<dyn Transport>,
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
    workers: HashMap<String, PeerWorker>,
    retired: Vec<JoinHandle<()>>,
}

impl GossipNode {
    pub fn new(
        protocol: Arc<dyn Protocol>,
        transport: Arc<dyn Transport>,
        inbound: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        Self {
            protocol,
            transport,
            inbound,
            workers: HashMap::new(),
            retired: Vec::new(),
        }
    }

    /// Run the node on its own task
    pub fn spawn(self) -> JoinHandle<Result<(), GossipDnsError>> {
        tokio::spawn(self.run())
    }

    /// Initialize the protocol, then dispatch transport events until the
    /// inbound channel closes. Queued messages are drained before returning.
    pub async fn run(mut self) -> Result<(), GossipDnsError> {
        info!(
            node_id = %self.transport.local_node_id(),
            protocol = %self.protocol.info(),
            "Starting gossip node"
        );

        self.protocol
            .on_initialized(Arc::clone(&self.transport))
            .await;

        while let Some(event) = self.inbound.recv().await {
            match event {
                TransportEvent::Connected(peer) => {
                    self.protocol
                        .on_connected(self.transport.as_ref(), &peer)
                        .await;
                }
                TransportEvent::Disconnected(peer) => {
                    self.retire_worker(&peer.id);
                    self.reap_retired().await?;
                    self.protocol
                        .on_disconnected(self.transport.as_ref(), &peer)
                        .await;
                }
                TransportEvent::Message { peer, message } => {
                    self.dispatch(peer, message);
                }
            }
        }

        info!(
            node_id = %self.transport.local_node_id(),
            "Inbound channel closed, stopping gossip node"
        );

        let mut handles = std::mem::take(&mut self.retired);
        handles.extend(self.workers.drain().map(|(_, worker)| worker.handle));

        // Join every worker; the first failure is reported
        let mut result = Ok(());
        for handle in handles {
            if let Err(e) = handle.await {
                if result.is_ok() {
                    result = Err(GossipDnsError::from(e));
                }
            }
        }

        result
    }

    fn dispatch(&mut self, peer: PeerContext, message: Message) {
        let worker = match self.workers.remove(&peer.id) {
            Some(worker) if !worker.queue.is_closed() => worker,
            Some(dead) => {
                // Joined later so a panic still reaches run()
                self.retired.push(dead.handle);
                self.spawn_worker(&peer)
            }
            None => self.spawn_worker(&peer),
        };

        if worker.queue.send((peer.clone(), message)).is_err() {
            debug!(peer = %peer, "Dropping message for stopped worker");
        }

        self.workers.insert(peer.id, worker);
    }

    fn spawn_worker(&self, peer: &PeerContext) -> PeerWorker {
        debug!(peer = %peer, "Starting peer worker");

        let (queue, mut rx) = mpsc::unbounded_channel::<(PeerContext, Message)>();
        let protocol = Arc::clone(&self.protocol);
        let transport = Arc::clone(&self.transport);

        let handle = tokio::spawn(async move {
            while let Some((peer, message)) = rx.recv().await {
                protocol
                    .on_message(transport.as_ref(), &peer, message)
                    .await;
            }
        });

        PeerWorker { queue, handle }
    }

    /// Close a peer's queue. Already-queued messages are still handled.
    fn retire_worker(&mut self, peer_id: &str) {
        if let Some(worker) = self.workers.remove(peer_id) {
            debug!(peer_id, "Retiring peer worker");
            self.retired.push(worker.handle);
        }
    }

    /// Join retired workers that have already finished
    async fn reap_retired(&mut self) -> Result<(), GossipDnsError> {
        let (finished, running): (Vec<_>, Vec<_>) = std::mem::take(&mut self.retired)
            .into_iter()
            .partition(|handle| handle.is_finished());
        self.retired = running;

        for handle in finished {
            handle.await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ProtocolInfo;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Initialized,
        Connected(String),
        Disconnected(String),
        Message(String, u64),
    }

    struct RecordingProtocol {
        info: ProtocolInfo,
        calls: Mutex<Vec<Call>>,
        panic_on: Option<u64>,
    }

    impl RecordingProtocol {
        fn new() -> Self {
            Self {
                info: ProtocolInfo::default(),
                calls: Mutex::new(Vec::new()),
                panic_on: None,
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl Protocol for RecordingProtocol {
        fn info(&self) -> &ProtocolInfo {
            &self.info
        }

        async fn on_initialized(&self, _transport: Arc<dyn Transport>) {
            self.record(Call::Initialized);
        }

        async fn on_message(&self, _transport: &dyn Transport, peer: &PeerContext, message: Message) {
            if self.panic_on == Some(message.code) {
                panic!("handler failure on code {}", message.code);
            }
            // Let other peers' workers interleave
            tokio::task::yield_now().await;
            self.record(Call::Message(peer.id.clone(), message.code));
        }

        async fn on_connected(&self, _transport: &dyn Transport, peer: &PeerContext) {
            self.record(Call::Connected(peer.id.clone()));
        }

        async fn on_disconnected(&self, _transport: &dyn Transport, peer: &PeerContext) {
            self.record(Call::Disconnected(peer.id.clone()));
        }
    }

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        fn local_node_id(&self) -> &str {
            "local"
        }

        async fn peers(&self) -> Vec<PeerContext> {
            Vec::new()
        }

        async fn send(
            &self,
            _code: u64,
            _payload: Vec<u8>,
            _peer: &PeerContext,
        ) -> Result<(), GossipDnsError> {
            Ok(())
        }
    }

    fn message_event(peer: &str, code: u64) -> TransportEvent {
        TransportEvent::Message {
            peer: PeerContext::new(peer, "local"),
            message: Message::new(code, Vec::new()),
        }
    }

    #[tokio::test]
    async fn test_initialized_before_any_event() {
        let protocol = Arc::new(RecordingProtocol::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let node = GossipNode::new(protocol.clone(), Arc::new(NullTransport), rx);

        tx.send(TransportEvent::Connected(PeerContext::new("a", "local")))
            .unwrap();
        drop(tx);

        node.run().await.unwrap();

        assert_eq!(
            protocol.calls(),
            vec![Call::Initialized, Call::Connected("a".to_string())]
        );
    }

    #[tokio::test]
    async fn test_messages_keep_per_peer_order() {
        let protocol = Arc::new(RecordingProtocol::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let node = GossipNode::new(protocol.clone(), Arc::new(NullTransport), rx);

        for code in 1..=5 {
            tx.send(message_event("a", code)).unwrap();
            tx.send(message_event("b", code + 100)).unwrap();
        }
        drop(tx);

        node.run().await.unwrap();

        let calls = protocol.calls();
        let from = |peer: &str| -> Vec<u64> {
            calls
                .iter()
                .filter_map(|call| match call {
                    Call::Message(id, code) if id == peer => Some(*code),
                    _ => None,
                })
                .collect()
        };

        assert_eq!(from("a"), vec![1, 2, 3, 4, 5]);
        assert_eq!(from("b"), vec![101, 102, 103, 104, 105]);
    }

    #[tokio::test]
    async fn test_disconnect_retires_worker_after_draining() {
        let protocol = Arc::new(RecordingProtocol::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let node = GossipNode::new(protocol.clone(), Arc::new(NullTransport), rx);

        tx.send(message_event("a", 1)).unwrap();
        tx.send(message_event("a", 2)).unwrap();
        tx.send(TransportEvent::Disconnected(PeerContext::new("a", "local")))
            .unwrap();
        tx.send(message_event("a", 3)).unwrap();
        drop(tx);

        node.run().await.unwrap();

        let calls = protocol.calls();
        assert!(calls.contains(&Call::Disconnected("a".to_string())));
        let codes: Vec<u64> = calls
            .iter()
            .filter_map(|call| match call {
                Call::Message(_, code) => Some(*code),
                _ => None,
            })
            .collect();
        assert_eq!(codes.len(), 3);
        assert_eq!(codes.iter().filter(|c| **c == 3).count(), 1);
    }

    #[tokio::test]
    async fn test_worker_panic_surfaces_as_join_error() {
        let mut protocol = RecordingProtocol::new();
        protocol.panic_on = Some(13);
        let (tx, rx) = mpsc::unbounded_channel();
        let node = GossipNode::new(Arc::new(protocol), Arc::new(NullTransport), rx);

        tx.send(message_event("a", 13)).unwrap();
        drop(tx);

        let result = node.run().await;
        assert!(matches!(result, Err(GossipDnsError::Join(_))));
    }

    #[tokio::test]
    async fn test_worker_panic_is_reported_after_peer_sends_again() {
        let mut protocol = RecordingProtocol::new();
        protocol.panic_on = Some(13);
        let protocol = Arc::new(protocol);
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = GossipNode::new(protocol.clone(), Arc::new(NullTransport), rx).spawn();

        tx.send(message_event("a", 13)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(message_event("a", 1)).unwrap();
        drop(tx);

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(GossipDnsError::Join(_))));
        assert!(protocol.calls().contains(&Call::Message("a".to_string(), 1)));
    }

    #[tokio::test]
    async fn test_worker_panic_is_reported_on_disconnect() {
        let mut protocol = RecordingProtocol::new();
        protocol.panic_on = Some(13);
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = GossipNode::new(Arc::new(protocol), Arc::new(NullTransport), rx).spawn();

        tx.send(message_event("a", 13)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(TransportEvent::Disconnected(PeerContext::new("a", "local")))
            .unwrap();

        // Reported without waiting for the inbound channel to close
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(GossipDnsError::Join(_))));
        drop(tx);
    }

    #[tokio::test]
    async fn test_spawned_node_stops_when_inbound_closes() {
        let protocol = Arc::new(RecordingProtocol::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = GossipNode::new(protocol.clone(), Arc::new(NullTransport), rx).spawn();

        tx.send(message_event("a", 1)).unwrap();
        drop(tx);

        handle.await.unwrap().unwrap();
        assert_eq!(
            protocol.calls(),
            vec![Call::Initialized, Call::Message("a".to_string(), 1)]
        );
    }
}
