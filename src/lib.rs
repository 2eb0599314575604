//! vpnsync - VPN Service Lifecycle Driver
//!
//! Async library keeping VPN agents in sync with the VPN resources stored by
//! the plugin layer:
//! - Gateway IP resolution for new VPN services
//! - Peer-version matching of local tunnel endpoints
//! - Agent-facing service snapshots (IPsec, PPTP, OpenVPN)
//! - Lifecycle notifications to the agent hosting each router
//!
//! The persistence layer is reached through the [`ServiceRegistry`] trait;
//! [`InMemoryRegistry`] implements it over a JSON fixture.

pub mod config;
pub mod context;
pub mod error;
pub mod model;
pub mod registry;
pub mod validation;
pub mod vpn;

// Re-export commonly used types
pub use config::{AgentTopics, DriverConfig};
pub use context::RequestContext;
pub use error::{VpnSyncError, VpnSyncResult};
pub use model::{Flavor, Router, Status, VpnService, VpnServiceStatus, VpnServiceTree};
pub use registry::{InMemoryRegistry, RegistryFixture, ServiceRegistry};
pub use vpn::{
    dispatch, AgentNotification, IpsecVpnDriver, LifecycleEvent, ServiceSnapshot,
    VpnDriverCallbacks, VpnServiceDriver,
};
