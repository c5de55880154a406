//! Error types for the gossipdns protocol

use thiserror::Error;

/// Main error type for gossipdns operations
#[derive(Error, Debug)]
pub enum GossipDnsError {
    /// Payload did not parse as a serialized URL list
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// Message code outside the protocol's vocabulary
    #[error("Unknown message code: {code}")]
    UnknownMessageCode { code: u64 },

    /// A transport send failed
    #[error("Send failure: {message} (peer: {peer_id})")]
    Send { message: String, peer_id: String },

    /// Transport misuse (unknown or duplicate node, closed endpoint)
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Join handle errors
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl GossipDnsError {
    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create an unknown message code error
    pub fn unknown_code(code: u64) -> Self {
        Self::UnknownMessageCode { code }
    }

    /// Create a send failure
    pub fn send(message: impl Into<String>, peer_id: impl Into<String>) -> Self {
        Self::Send {
            message: message.into(),
            peer_id: peer_id.into(),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GossipDnsError::send("channel closed", "node-2");
        assert_eq!(
            err.to_string(),
            "Send failure: channel closed (peer: node-2)"
        );

        let err = GossipDnsError::unknown_code(42);
        assert_eq!(err.to_string(), "Unknown message code: 42");
    }

    #[test]
    fn test_serde_json_conversion() {
        let json_err = serde_json::from_str::<Vec<String>>("not json").unwrap_err();
        let err: GossipDnsError = json_err.into();
        assert!(matches!(err, GossipDnsError::Serialization(_)));
    }
}
