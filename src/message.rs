//! Message vocabulary and payload codec for the gossipdns protocol
//!
//! Two message codes exist on the wire: a query asking a peer for every URL
//! it knows, and an answer carrying a URL list. Payloads of `NEW_URLS` are a
//! JSON array of strings; `FIND_URLS` carries nothing.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::GossipDnsError;

/// Wire codes of the protocol's messages
pub mod codes {
    /// Ask a peer for all URLs it knows
    pub const FIND_URLS: u64 = 1;
    /// Carry a list of URLs
    pub const NEW_URLS: u64 = 2;
}

/// Identity of the protocol as announced to the session layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolInfo {
    /// Protocol name
    pub name: String,
    /// Protocol version
    pub version: u32,
    /// Size of the message-code space reserved by the protocol
    pub length: u64,
}

impl Default for ProtocolInfo {
    fn default() -> Self {
        Self {
            name: "2048DNS".to_string(),
            version: 1,
            length: 8096,
        }
    }
}

impl fmt::Display for ProtocolInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.version)
    }
}

/// Message code classified once at the boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    FindUrls,
    NewUrls,
    Unknown(u64),
}

impl MessageKind {
    pub fn from_code(code: u64) -> Self {
        match code {
            codes::FIND_URLS => Self::FindUrls,
            codes::NEW_URLS => Self::NewUrls,
            other => Self::Unknown(other),
        }
    }

    pub fn code(&self) -> u64 {
        match self {
            Self::FindUrls => codes::FIND_URLS,
            Self::NewUrls => codes::NEW_URLS,
            Self::Unknown(code) => *code,
        }
    }
}

/// A message as carried by the transport: a code and an opaque payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub code: u64,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(code: u64, payload: Vec<u8>) -> Self {
        Self { code, payload }
    }

    /// Query message with its always-empty payload
    pub fn find_urls() -> Self {
        Self::new(codes::FIND_URLS, Vec::new())
    }

    /// Answer message carrying `urls`
    pub fn new_urls(urls: &[String]) -> Result<Self, GossipDnsError> {
        Ok(Self::new(codes::NEW_URLS, encode_urls(urls)?))
    }

    pub fn kind(&self) -> MessageKind {
        MessageKind::from_code(self.code)
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Serialize an ordered URL list into a `NEW_URLS` payload
pub fn encode_urls(urls: &[String]) -> Result<Vec<u8>, GossipDnsError> {
    Ok(serde_json::to_vec(urls)?)
}

/// Parse a `NEW_URLS` payload back into its ordered URL list
pub fn decode_urls(payload: &[u8]) -> Result<Vec<String>, GossipDnsError> {
    serde_json::from_slice(payload).map_err(|e| GossipDnsError::decode(e.to_string()))
}
