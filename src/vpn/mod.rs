//! VPN service lifecycle driver
//!
//! Sits between the plugin layer, which persists VPN resources, and the agents
//! running on network nodes, which realize tunnels.
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │   Plugin layer (LifecycleEvent)     │
//! └──────────────┬──────────────────────┘
//!                │ dispatch
//!                ▼
//! ┌─────────────────────────────────────┐      ┌──────────────────┐
//! │   VpnServiceDriver (IpsecVpnDriver) │─────▶│ ServiceRegistry  │
//! └──────────────┬──────────────────────┘      └────────▲─────────┘
//!                │ vpnservice_updated                   │
//!    ┌───────────┼───────────┐                          │
//!    ▼           ▼           ▼                          │
//! ┌──────┐   ┌──────┐   ┌───────┐   get_vpn_services    │
//! │IPsec │   │ PPTP │   │OpenVPN│ ──────────────────────┘
//! └──────┘   └──────┘   └───────┘   <- Agents (via VpnDriverCallbacks)
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use libvpnsync::{DriverConfig, InMemoryRegistry, RequestContext};
//! use libvpnsync::vpn::{dispatch, IpsecVpnDriver, LifecycleEvent};
//!
//! # async fn example(event: LifecycleEvent) -> libvpnsync::VpnSyncResult<()> {
//! let registry = Arc::new(InMemoryRegistry::new());
//! let (driver, mut notifications) = IpsecVpnDriver::new(registry, DriverConfig::default());
//!
//! dispatch(&driver, &RequestContext::admin(), event).await?;
//! while let Ok(n) = notifications.try_recv() {
//!     println!("{} -> {}", n.topic, n.router_id);
//! }
//! # Ok(())
//! # }
//! ```

pub mod callbacks;
pub mod driver;
pub mod events;
pub mod gateway;
pub mod notifier;
pub mod snapshot;

pub use callbacks::VpnDriverCallbacks;
pub use driver::{IpsecVpnDriver, VpnServiceDriver};
pub use events::{dispatch, Change, LifecycleEvent, Operation, ResourceKind};
pub use gateway::{resolve_gateway_ips, select_external_ip, GatewayIps};
pub use notifier::{AgentChannels, AgentNotification, AgentRpcApi, NotificationPayload, VPNSERVICE_UPDATED};
pub use snapshot::{build_snapshot, normalize_peer_id, ServiceSnapshot};
