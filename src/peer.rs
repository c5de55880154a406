//! Peer context handed to the protocol by the transport
//!
//! A `PeerContext` describes one connected remote node from the local
//! node's point of view. The transport creates and retires these; the
//! protocol only reads them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Number of characters shown by [`PeerContext::short_id`]
const SHORT_ID_LEN: usize = 8;

/// One connected remote node as seen by the transport
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerContext {
    /// Remote peer identifier
    pub id: String,
    /// Identifier of the local node
    pub local_node_id: String,
    /// Session start (Unix epoch seconds)
    pub connected_at: u64,
}

impl PeerContext {
    /// Create a new peer context
    pub fn new(id: impl Into<String>, local_node_id: impl Into<String>) -> Self {
        let connected_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        Self {
            id: id.into(),
            local_node_id: local_node_id.into(),
            connected_at,
        }
    }

    /// Abbreviated peer id for log lines
    pub fn short_id(&self) -> &str {
        short(&self.id)
    }

    /// Abbreviated local node id for log lines
    pub fn local_short_id(&self) -> &str {
        short(&self.local_node_id)
    }
}

impl fmt::Display for PeerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Generate a random node identifier
pub fn generate_node_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn short(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}
