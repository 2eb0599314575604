//! Configuration management for the VPN service driver

use serde::{Deserialize, Serialize};
use std::path::Path;
use crate::error::{VpnSyncError, VpnSyncResult};
use crate::model::Flavor;

/// Main driver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Also notify the agent when a VPN service is first created.
    /// Connection creation always notifies.
    #[serde(default)]
    pub notify_on_vpnservice_create: bool,
    /// Reject IPsec site connections whose peer address family has no
    /// resolved external IP on the owning service
    #[serde(default)]
    pub validate_peer_address_family: bool,
    /// Reject IPsec site connections with a non-IP peer address, an MTU
    /// outside 68..=9000, an empty peer_id or a DPD timeout not above the
    /// DPD interval
    #[serde(default)]
    pub validate_ipsec_site_connections: bool,
    /// Agent RPC API version stamped on every notification
    #[serde(default = "default_rpc_version")]
    pub rpc_version: String,
    /// Depth of the bounded outbound notification queue
    #[serde(default = "default_queue_depth")]
    pub notification_queue_depth: usize,
    /// Agent topics, one per flavor
    #[serde(default)]
    pub topics: AgentTopics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTopics {
    #[serde(default = "default_ipsec_topic")]
    pub ipsec: String,
    #[serde(default = "default_pptp_topic")]
    pub pptp: String,
    #[serde(default = "default_openvpn_topic")]
    pub openvpn: String,
}

fn default_rpc_version() -> String {
    "1.0".to_string()
}

fn default_queue_depth() -> usize {
    256
}

fn default_ipsec_topic() -> String {
    "ipsec_agent".to_string()
}

fn default_pptp_topic() -> String {
    "pptp_agent".to_string()
}

fn default_openvpn_topic() -> String {
    "openvpn_agent".to_string()
}

impl Default for AgentTopics {
    fn default() -> Self {
        Self {
            ipsec: default_ipsec_topic(),
            pptp: default_pptp_topic(),
            openvpn: default_openvpn_topic(),
        }
    }
}

impl AgentTopics {
    /// Topic the agents of `flavor` listen on
    pub fn for_flavor(&self, flavor: Flavor) -> &str {
        match flavor {
            Flavor::Ipsec => &self.ipsec,
            Flavor::Pptp => &self.pptp,
            Flavor::OpenVpn => &self.openvpn,
        }
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            notify_on_vpnservice_create: false,
            validate_peer_address_family: false,
            validate_ipsec_site_connections: false,
            rpc_version: default_rpc_version(),
            notification_queue_depth: default_queue_depth(),
            topics: AgentTopics::default(),
        }
    }
}

impl DriverConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> VpnSyncResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| VpnSyncError::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML document
    pub fn from_toml(content: &str) -> VpnSyncResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| VpnSyncError::ConfigError(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> VpnSyncResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| VpnSyncError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| VpnSyncError::ConfigError(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    fn validate(&self) -> VpnSyncResult<()> {
        if self.notification_queue_depth == 0 {
            return Err(VpnSyncError::ConfigError(
                "notification_queue_depth must be at least 1".to_string()
            ));
        }
        for flavor in Flavor::ALL {
            if self.topics.for_flavor(flavor).trim().is_empty() {
                return Err(VpnSyncError::ConfigError(format!("Empty agent topic for {}", flavor)));
            }
        }
        Ok(())
    }
}
