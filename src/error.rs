//! Error types for vpnsync

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VpnSyncError {
    /// An IP literal could not be parsed
    #[error("Invalid IP address format: '{address}'")]
    AddressFormat { address: String },

    /// The service has no external IP of the peer's address family
    #[error("VPN service {service_id} has no external IPv{version} address to pair with peer {peer_address}")]
    MissingResolvedAddress {
        service_id: String,
        peer_address: String,
        version: u8,
    },

    /// Entity lookup failed in the registry
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Invalid state (e.g. a write-once field written twice)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The transport dropped the receiving end of the agent queue
    #[error("Agent notification channel closed for topic {topic}")]
    ChannelClosed { topic: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Parse error
    #[error("Parse error: {0}")]
    ParseError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl VpnSyncError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        VpnSyncError::NotFound { kind, id: id.into() }
    }
}

impl From<serde_json::Error> for VpnSyncError {
    fn from(error: serde_json::Error) -> Self {
        VpnSyncError::ParseError(error.to_string())
    }
}

pub type VpnSyncResult<T> = Result<T, VpnSyncError>;
