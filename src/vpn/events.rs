//! Lifecycle events and the dispatch table onto [`VpnServiceDriver`] hooks

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

use crate::context::RequestContext;
use crate::error::VpnSyncResult;
use crate::model::{
    IkePolicy, IpsecPolicy, IpsecSiteConnection, OpenVpnConnection, PptpConnection,
    PptpCredential, VpnService,
};
use super::driver::VpnServiceDriver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    #[serde(rename = "vpnservice")]
    VpnService,
    IpsecSiteConnection,
    #[serde(rename = "ikepolicy")]
    IkePolicy,
    #[serde(rename = "ipsecpolicy")]
    IpsecPolicy,
    #[serde(rename = "pptpconnection")]
    PptpConnection,
    #[serde(rename = "pptpcredential")]
    PptpCredential,
    #[serde(rename = "openvpnconnection")]
    OpenVpnConnection,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::VpnService => "vpnservice",
            ResourceKind::IpsecSiteConnection => "ipsec_site_connection",
            ResourceKind::IkePolicy => "ikepolicy",
            ResourceKind::IpsecPolicy => "ipsecpolicy",
            ResourceKind::PptpConnection => "pptpconnection",
            ResourceKind::PptpCredential => "pptpcredential",
            ResourceKind::OpenVpnConnection => "openvpnconnection",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        })
    }
}

/// A resource delta as delivered by the plugin layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Change<T> {
    Create { current: T },
    Update { old: T, current: T },
    Delete { current: T },
}

impl<T> Change<T> {
    pub fn operation(&self) -> Operation {
        match self {
            Change::Create { .. } => Operation::Create,
            Change::Update { .. } => Operation::Update,
            Change::Delete { .. } => Operation::Delete,
        }
    }

    /// The resource as it is after the change (or was, for deletes)
    pub fn current(&self) -> &T {
        match self {
            Change::Create { current } | Change::Update { current, .. } | Change::Delete { current } => current,
        }
    }
}

/// Every mutation the driver reacts to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "resource")]
pub enum LifecycleEvent {
    #[serde(rename = "vpnservice")]
    VpnService(Change<VpnService>),
    #[serde(rename = "ipsec_site_connection")]
    IpsecSiteConnection(Change<IpsecSiteConnection>),
    #[serde(rename = "ikepolicy")]
    IkePolicy(Change<IkePolicy>),
    #[serde(rename = "ipsecpolicy")]
    IpsecPolicy(Change<IpsecPolicy>),
    #[serde(rename = "pptpconnection")]
    PptpConnection(Change<PptpConnection>),
    /// Credential changes also carry the connection they belong to
    #[serde(rename = "pptpcredential")]
    PptpCredential {
        change: Change<PptpCredential>,
        pptpconnection: PptpConnection,
    },
    #[serde(rename = "openvpnconnection")]
    OpenVpnConnection(Change<OpenVpnConnection>),
}

impl LifecycleEvent {
    pub fn kind(&self) -> (ResourceKind, Operation) {
        match self {
            LifecycleEvent::VpnService(c) => (ResourceKind::VpnService, c.operation()),
            LifecycleEvent::IpsecSiteConnection(c) => (ResourceKind::IpsecSiteConnection, c.operation()),
            LifecycleEvent::IkePolicy(c) => (ResourceKind::IkePolicy, c.operation()),
            LifecycleEvent::IpsecPolicy(c) => (ResourceKind::IpsecPolicy, c.operation()),
            LifecycleEvent::PptpConnection(c) => (ResourceKind::PptpConnection, c.operation()),
            LifecycleEvent::PptpCredential { change, .. } => (ResourceKind::PptpCredential, change.operation()),
            LifecycleEvent::OpenVpnConnection(c) => (ResourceKind::OpenVpnConnection, c.operation()),
        }
    }
}

/// Route one lifecycle event to the matching driver hook
pub async fn dispatch(
    driver: &dyn VpnServiceDriver,
    ctx: &RequestContext,
    event: LifecycleEvent,
) -> VpnSyncResult<()> {
    let (kind, operation) = event.kind();
    info!("Dispatching {} {} to {} driver", operation, kind, driver.service_type());

    match event {
        LifecycleEvent::VpnService(change) => match change {
            Change::Create { mut current } => driver.create_vpnservice(ctx, &mut current).await,
            Change::Update { old, current } => driver.update_vpnservice(ctx, &old, &current).await,
            Change::Delete { current } => driver.delete_vpnservice(ctx, &current).await,
        },
        LifecycleEvent::IpsecSiteConnection(change) => match change {
            Change::Create { current } => driver.create_ipsec_site_connection(ctx, &current).await,
            Change::Update { old, current } => driver.update_ipsec_site_connection(ctx, &old, &current).await,
            Change::Delete { current } => driver.delete_ipsec_site_connection(ctx, &current).await,
        },
        LifecycleEvent::IkePolicy(change) => match change {
            Change::Create { current } => driver.create_ikepolicy(ctx, &current).await,
            Change::Update { old, current } => driver.update_ikepolicy(ctx, &old, &current).await,
            Change::Delete { current } => driver.delete_ikepolicy(ctx, &current).await,
        },
        LifecycleEvent::IpsecPolicy(change) => match change {
            Change::Create { current } => driver.create_ipsecpolicy(ctx, &current).await,
            Change::Update { old, current } => driver.update_ipsecpolicy(ctx, &old, &current).await,
            Change::Delete { current } => driver.delete_ipsecpolicy(ctx, &current).await,
        },
        LifecycleEvent::PptpConnection(change) => match change {
            Change::Create { current } => driver.create_pptpconnection(ctx, &current).await,
            Change::Update { old, current } => driver.update_pptpconnection(ctx, &old, &current).await,
            Change::Delete { current } => driver.delete_pptpconnection(ctx, &current).await,
        },
        LifecycleEvent::PptpCredential { change, pptpconnection } => match change {
            Change::Create { current } => driver.create_pptpcredential(ctx, &current, &pptpconnection).await,
            Change::Update { current, .. } => driver.update_pptpcredential(ctx, &current, &pptpconnection).await,
            Change::Delete { current } => driver.delete_pptpcredential(ctx, &current, &pptpconnection).await,
        },
        LifecycleEvent::OpenVpnConnection(change) => match change {
            Change::Create { current } => driver.create_openvpnconnection(ctx, &current).await,
            Change::Update { current, .. } => driver.update_openvpnconnection(ctx, &current).await,
            Change::Delete { current } => driver.delete_openvpnconnection(ctx, &current).await,
        },
    }
}
