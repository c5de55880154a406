//! # gossipdns - Gossip-Replicated DNS Record Sets
//!
//! gossipdns keeps a set of DNS record URLs converged across a peer-to-peer
//! network. Every node periodically asks each connected peer for all the
//! URLs it knows and merges whatever comes back into its own deduplicated,
//! order-preserving record store.
//!
//! ## Core Pieces
//!
//! - **Protocol**: [`GossipDns`] answers `FIND_URLS` queries and merges
//!   `NEW_URLS` answers
//! - **Scheduler**: a fixed-interval timer firing one query per peer, each
//!   send on its own task
//! - **Transport boundary**: the [`Transport`] trait; sockets and sessions
//!   stay outside this crate
//! - **Node host**: [`GossipNode`] feeds transport events into a protocol
//! - **In-memory mesh**: [`MemoryNetwork`] for tests and local simulation
//!
//! ## Example
//!
//! ```rust,no_run
//! use gossipdns::{GossipDns, GossipNode, MemoryNetwork};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let network = MemoryNetwork::new();
//!
//!     // Event receivers are dropped; events are then discarded
//!     let (a_protocol, _) = GossipDns::builder()
//!         .with_seed_urls(["baidu.com"])
//!         .build()?;
//!     let (b_protocol, _) = GossipDns::builder()
//!         .with_seed_urls(["google.com"])
//!         .build()?;
//!     let a_protocol = Arc::new(a_protocol);
//!     let b_protocol = Arc::new(b_protocol);
//!
//!     let (a_transport, a_inbound) = network.register("node-a").await?;
//!     let (b_transport, b_inbound) = network.register("node-b").await?;
//!
//!     GossipNode::new(a_protocol.clone(), Arc::new(a_transport), a_inbound).spawn();
//!     GossipNode::new(b_protocol.clone(), Arc::new(b_transport), b_inbound).spawn();
//!
//!     network.connect("node-a", "node-b").await?;
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(11)).await;
//!     println!("node-b knows {:?}", b_protocol.records().await);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod gossip;
pub mod logging;
pub mod memory;
pub mod message;
pub mod node;
pub mod peer;
pub mod protocol;
pub mod records;
pub mod transport;

pub use error::GossipDnsError;
pub use gossip::{GossipConfig, GossipEvent, GossipScheduler, GossipStats};
pub use logging::{
    development_config, init_logging, production_config, CorrelationId, LogConfig,
    PerformanceMetrics, PerformanceTimer,
};
pub use memory::{MemoryNetwork, MemoryTransport};
pub use message::{codes, decode_urls, encode_urls, Message, MessageKind, ProtocolInfo};
pub use node::GossipNode;
pub use peer::{generate_node_id, PeerContext};
pub use protocol::{GossipDns, GossipDnsBuilder, Protocol, ProtocolState};
pub use records::RecordStore;
pub use transport::{Transport, TransportEvent};

/// Result type alias for gossipdns operations
pub type Result<T> = std::result::Result<T, GossipDnsError>;
