//! Agent-ready snapshots of a VPN service
//!
//! A snapshot is the whole nested configuration of one service flattened into
//! a self-contained record: policies expanded, peer CIDRs reduced to strings,
//! the local tunnel IP picked per connection. Snapshots are built on every
//! agent request and never cached.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use tracing::{debug, warn};

use crate::error::VpnSyncResult;
use crate::model::{
    Flavor, IkePolicy, IpsecPolicy, IpsecSiteConnection, IpsecSiteConnectionTree,
    PptpConnection, PptpConnectionTree, PptpCredential, Subnet, VpnService, VpnServiceTree,
};
use crate::validation::parse_ip_address;
use super::gateway::select_external_ip;

/// Snapshot of a service of any flavor, serialized as one flat record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServiceSnapshot {
    Ipsec(IpsecServiceSnapshot),
    Pptp(PptpServiceSnapshot),
    /// Already shaped upstream, passed through as stored
    OpenVpn(VpnServiceTree),
}

impl ServiceSnapshot {
    pub fn flavor(&self) -> Flavor {
        match self {
            ServiceSnapshot::Ipsec(_) => Flavor::Ipsec,
            ServiceSnapshot::Pptp(_) => Flavor::Pptp,
            ServiceSnapshot::OpenVpn(_) => Flavor::OpenVpn,
        }
    }

    pub fn service_id(&self) -> &str {
        match self {
            ServiceSnapshot::Ipsec(s) => &s.service.id,
            ServiceSnapshot::Pptp(s) => &s.service.id,
            ServiceSnapshot::OpenVpn(s) => s.id(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpsecServiceSnapshot {
    #[serde(flatten)]
    pub service: VpnService,
    pub subnet: Option<Subnet>,
    /// Legacy single endpoint: the v4 address if present, else the v6 one.
    /// Kept next to the dual-stack fields for older agent drivers.
    pub external_ip: Option<IpAddr>,
    pub ipsec_site_connections: Vec<IpsecSiteConnectionSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpsecSiteConnectionSnapshot {
    /// Connection attributes, `peer_id` already normalized
    #[serde(flatten)]
    pub connection: IpsecSiteConnection,
    pub ikepolicy: IkePolicy,
    pub ipsecpolicy: IpsecPolicy,
    pub peer_cidrs: Vec<String>,
    /// Local endpoint of the peer's address family, `None` if the service
    /// has no address of that family
    pub external_ip: Option<IpAddr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PptpServiceSnapshot {
    #[serde(flatten)]
    pub service: VpnService,
    pub pptpconnections: Vec<PptpConnectionSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PptpConnectionSnapshot {
    #[serde(flatten)]
    pub connection: PptpConnection,
    /// Enabled credentials only
    pub credentials: Vec<PptpCredential>,
}

/// Build the snapshot of `service` for agents of `flavor`
pub fn build_snapshot(service: &VpnServiceTree, flavor: Flavor) -> VpnSyncResult<ServiceSnapshot> {
    debug!("Building {} snapshot of VPN service {}", flavor, service.id());
    Ok(match flavor {
        Flavor::Ipsec => ServiceSnapshot::Ipsec(build_ipsec_snapshot(service)?),
        Flavor::Pptp => ServiceSnapshot::Pptp(build_pptp_snapshot(service)),
        Flavor::OpenVpn => ServiceSnapshot::OpenVpn(service.clone()),
    })
}

/// IKE identity as handed to the agent.
///
/// IP literals are left as they are; anything else is an FQDN-style identity
/// and gets the `@` prefix (`ID_FQDN` / `DER_ASN1_GN` in IKE terms).
pub fn normalize_peer_id(peer_id: &str) -> String {
    match parse_ip_address(peer_id) {
        Ok(_) => peer_id.to_string(),
        Err(_) => format!("@{}", peer_id),
    }
}

fn build_ipsec_snapshot(tree: &VpnServiceTree) -> VpnSyncResult<IpsecServiceSnapshot> {
    let service = &tree.service;

    let external_ip = service
        .external_v4_ip
        .map(IpAddr::V4)
        .or(service.external_v6_ip.map(IpAddr::V6));

    let ipsec_site_connections = tree
        .ipsec_site_connections()
        .iter()
        .map(|conn| build_ipsec_site_connection_snapshot(service, conn))
        .collect::<VpnSyncResult<Vec<_>>>()?;

    Ok(IpsecServiceSnapshot {
        service: service.clone(),
        subnet: tree.subnet.clone(),
        external_ip,
        ipsec_site_connections,
    })
}

fn build_ipsec_site_connection_snapshot(
    service: &VpnService,
    tree: &IpsecSiteConnectionTree,
) -> VpnSyncResult<IpsecSiteConnectionSnapshot> {
    let mut connection = tree.connection.clone();
    connection.peer_id = normalize_peer_id(&connection.peer_id);

    let external_ip = select_external_ip(
        service.external_v4_ip,
        service.external_v6_ip,
        &connection.peer_address,
    )?;
    if external_ip.is_none() {
        warn!(
            "VPN service {} has no external IP matching peer {} of connection {}",
            service.id, connection.peer_address, connection.id
        );
    }

    Ok(IpsecSiteConnectionSnapshot {
        ikepolicy: tree.ikepolicy.clone(),
        ipsecpolicy: tree.ipsecpolicy.clone(),
        peer_cidrs: tree.peer_cidrs.iter().map(|c| c.cidr.clone()).collect(),
        external_ip,
        connection,
    })
}

fn build_pptp_snapshot(tree: &VpnServiceTree) -> PptpServiceSnapshot {
    PptpServiceSnapshot {
        service: tree.service.clone(),
        pptpconnections: tree
            .pptpconnections()
            .iter()
            .map(build_pptp_connection_snapshot)
            .collect(),
    }
}

fn build_pptp_connection_snapshot(tree: &PptpConnectionTree) -> PptpConnectionSnapshot {
    PptpConnectionSnapshot {
        connection: tree.connection.clone(),
        credentials: tree
            .credentials
            .iter()
            .filter(|cred| cred.admin_state_up)
            .cloned()
            .collect(),
    }
}
