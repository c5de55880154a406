//! Boundary between the protocol and the peer-to-peer session layer
//!
//! The protocol never touches sockets. A transport hands it the current peer
//! list and a send primitive, and feeds inbound traffic back as
//! [`TransportEvent`]s.

use async_trait::async_trait;

use crate::error::GossipDnsError;
use crate::message::Message;
use crate::peer::PeerContext;

/// Session layer capabilities consumed by the protocol
#[async_trait]
pub trait Transport: Send + Sync {
    /// Identifier of the local node
    fn local_node_id(&self) -> &str;

    /// Peers connected at call time
    async fn peers(&self) -> Vec<PeerContext>;

    /// Send one message to `peer`
    async fn send(
        &self,
        code: u64,
        payload: Vec<u8>,
        peer: &PeerContext,
    ) -> Result<(), GossipDnsError>;
}

/// Inbound traffic surfaced by a transport
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A new peer session opened
    Connected(PeerContext),
    /// A peer session closed
    Disconnected(PeerContext),
    /// A wire message arrived from `peer`
    Message { peer: PeerContext, message: Message },
}
