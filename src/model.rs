//! Typed records exchanged with the registry, the event layer and the agents
//!
//! Scalar records (`VpnService`, `IpsecSiteConnection`, ...) are the payloads
//! of lifecycle events. The `*Tree` types are the read-only storage views the
//! registry hands out, with their nested children attached.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use crate::error::{VpnSyncError, VpnSyncResult};

/// VPN technology a service instance uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
    #[default]
    Ipsec,
    Pptp,
    OpenVpn,
}

impl Flavor {
    pub const ALL: [Flavor; 3] = [Flavor::Ipsec, Flavor::Pptp, Flavor::OpenVpn];

    pub fn as_str(&self) -> &'static str {
        match self {
            Flavor::Ipsec => "ipsec",
            Flavor::Pptp => "pptp",
            Flavor::OpenVpn => "openvpn",
        }
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Flavor {
    type Err = VpnSyncError;

    fn from_str(s: &str) -> VpnSyncResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ipsec" => Ok(Flavor::Ipsec),
            "pptp" => Ok(Flavor::Pptp),
            "openvpn" => Ok(Flavor::OpenVpn),
            other => Err(VpnSyncError::InvalidParameter(format!("Unknown VPN type '{}'", other))),
        }
    }
}

/// Resource status as reported by agents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Active,
    Down,
    Build,
    Error,
    #[default]
    PendingCreate,
    PendingUpdate,
    PendingDelete,
}

fn default_true() -> bool {
    true
}

/// One fixed IP on the router's gateway port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedIp {
    #[serde(default)]
    pub subnet_id: String,
    /// Raw address literal as stored; classified on read
    pub ip_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayPort {
    pub id: String,
    #[serde(default)]
    pub network_id: String,
    /// Stored order is significant: the first address of each family wins
    #[serde(default)]
    pub fixed_ips: Vec<FixedIp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Router {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub gw_port: Option<GatewayPort>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub network_id: String,
    pub cidr: String,
    pub ip_version: u8,
    #[serde(default)]
    pub gateway_ip: Option<String>,
}

/// Scalar VPN service attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpnService {
    pub id: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub admin_state_up: bool,
    #[serde(default)]
    pub status: Status,
    pub router_id: String,
    #[serde(default)]
    pub subnet_id: Option<String>,
    #[serde(default)]
    pub vpntype: Flavor,
    /// Written once, when the service is created
    #[serde(default)]
    pub external_v4_ip: Option<Ipv4Addr>,
    #[serde(default)]
    pub external_v6_ip: Option<Ipv6Addr>,
}

/// Dead peer detection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dpd {
    #[serde(default = "default_dpd_action")]
    pub action: String,
    #[serde(default = "default_dpd_interval")]
    pub interval: u32,
    #[serde(default = "default_dpd_timeout")]
    pub timeout: u32,
}

fn default_dpd_action() -> String {
    "hold".to_string()
}

fn default_dpd_interval() -> u32 {
    30
}

fn default_dpd_timeout() -> u32 {
    120
}

impl Default for Dpd {
    fn default() -> Self {
        Self {
            action: default_dpd_action(),
            interval: default_dpd_interval(),
            timeout: default_dpd_timeout(),
        }
    }
}

/// Scalar IPsec site connection attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpsecSiteConnection {
    pub id: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub vpnservice_id: String,
    #[serde(default)]
    pub ikepolicy_id: String,
    #[serde(default)]
    pub ipsecpolicy_id: String,
    /// Remote tunnel endpoint, an IP literal
    pub peer_address: String,
    /// IKE identity of the peer: an IP literal or an FQDN-style string
    pub peer_id: String,
    #[serde(default = "default_route_mode")]
    pub route_mode: String,
    #[serde(default = "default_mtu")]
    pub mtu: u32,
    #[serde(default = "default_initiator")]
    pub initiator: String,
    #[serde(default = "default_auth_mode")]
    pub auth_mode: String,
    #[serde(default)]
    pub psk: String,
    #[serde(default)]
    pub dpd: Dpd,
    #[serde(default = "default_true")]
    pub admin_state_up: bool,
    #[serde(default)]
    pub status: Status,
}

fn default_route_mode() -> String {
    "static".to_string()
}

fn default_mtu() -> u32 {
    1500
}

fn default_initiator() -> String {
    "bi-directional".to_string()
}

fn default_auth_mode() -> String {
    "psk".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifetime {
    #[serde(default = "default_lifetime_units")]
    pub units: String,
    #[serde(default = "default_lifetime_value")]
    pub value: u32,
}

fn default_lifetime_units() -> String {
    "seconds".to_string()
}

fn default_lifetime_value() -> u32 {
    3600
}

impl Default for Lifetime {
    fn default() -> Self {
        Self {
            units: default_lifetime_units(),
            value: default_lifetime_value(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IkePolicy {
    pub id: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_auth_algorithm")]
    pub auth_algorithm: String,
    #[serde(default = "default_encryption_algorithm")]
    pub encryption_algorithm: String,
    #[serde(default = "default_phase1_mode")]
    pub phase1_negotiation_mode: String,
    #[serde(default)]
    pub lifetime: Lifetime,
    #[serde(default = "default_ike_version")]
    pub ike_version: String,
    #[serde(default = "default_pfs")]
    pub pfs: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpsecPolicy {
    pub id: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_transform_protocol")]
    pub transform_protocol: String,
    #[serde(default = "default_auth_algorithm")]
    pub auth_algorithm: String,
    #[serde(default = "default_encryption_algorithm")]
    pub encryption_algorithm: String,
    #[serde(default = "default_encapsulation_mode")]
    pub encapsulation_mode: String,
    #[serde(default)]
    pub lifetime: Lifetime,
    #[serde(default = "default_pfs")]
    pub pfs: String,
}

fn default_auth_algorithm() -> String {
    "sha1".to_string()
}

fn default_encryption_algorithm() -> String {
    "aes-128".to_string()
}

fn default_phase1_mode() -> String {
    "main".to_string()
}

fn default_ike_version() -> String {
    "v1".to_string()
}

fn default_pfs() -> String {
    "group5".to_string()
}

fn default_transform_protocol() -> String {
    "esp".to_string()
}

fn default_encapsulation_mode() -> String {
    "tunnel".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerCidr {
    pub cidr: String,
    #[serde(default)]
    pub ipsec_site_connection_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PptpConnection {
    pub id: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub vpnservice_id: String,
    #[serde(default)]
    pub client_cidr: Option<String>,
    #[serde(default = "default_true")]
    pub admin_state_up: bool,
    #[serde(default)]
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PptpCredential {
    pub id: String,
    #[serde(default)]
    pub tenant_id: String,
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Disabled credentials are never shown to agents
    #[serde(default = "default_true")]
    pub admin_state_up: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenVpnConnection {
    pub id: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub vpnservice_id: String,
    #[serde(default = "default_openvpn_port")]
    pub port: u16,
    #[serde(default = "default_openvpn_protocol")]
    pub protocol: String,
    #[serde(default)]
    pub client_cidr: Option<String>,
    #[serde(default = "default_true")]
    pub admin_state_up: bool,
    #[serde(default)]
    pub status: Status,
}

fn default_openvpn_port() -> u16 {
    1194
}

fn default_openvpn_protocol() -> String {
    "udp".to_string()
}

/// Stored IPsec site connection with its policies and peer CIDRs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpsecSiteConnectionTree {
    #[serde(flatten)]
    pub connection: IpsecSiteConnection,
    pub ikepolicy: IkePolicy,
    pub ipsecpolicy: IpsecPolicy,
    /// In association order
    #[serde(default)]
    pub peer_cidrs: Vec<PeerCidr>,
}

/// Stored PPTP connection with all of its credentials, enabled or not
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PptpConnectionTree {
    #[serde(flatten)]
    pub connection: PptpConnection,
    #[serde(default)]
    pub credentials: Vec<PptpCredential>,
}

/// Flavor-specific children of a service. A service owns connections of
/// exactly one flavor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceConnections {
    #[serde(rename = "ipsec_site_connections")]
    Ipsec(Vec<IpsecSiteConnectionTree>),
    #[serde(rename = "pptpconnections")]
    Pptp(Vec<PptpConnectionTree>),
    #[serde(rename = "openvpnconnections")]
    OpenVpn(Vec<OpenVpnConnection>),
}

impl ServiceConnections {
    pub fn flavor(&self) -> Flavor {
        match self {
            ServiceConnections::Ipsec(_) => Flavor::Ipsec,
            ServiceConnections::Pptp(_) => Flavor::Pptp,
            ServiceConnections::OpenVpn(_) => Flavor::OpenVpn,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ServiceConnections::Ipsec(c) => c.len(),
            ServiceConnections::Pptp(c) => c.len(),
            ServiceConnections::OpenVpn(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A VPN service as stored, with subnet and connections attached.
///
/// The connections decide the flavor: `service.vpntype` always matches them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "VpnServiceTreeRecord")]
pub struct VpnServiceTree {
    #[serde(flatten)]
    pub service: VpnService,
    #[serde(default)]
    pub subnet: Option<Subnet>,
    #[serde(flatten)]
    pub connections: ServiceConnections,
}

/// Wire form of [`VpnServiceTree`], before the flavor check
#[derive(Deserialize)]
struct VpnServiceTreeRecord {
    /// Taken before `service` sees it, to tell an explicit type from the default
    #[serde(default)]
    vpntype: Option<Flavor>,
    #[serde(flatten)]
    service: VpnService,
    #[serde(default)]
    subnet: Option<Subnet>,
    #[serde(flatten)]
    connections: ServiceConnections,
}

impl TryFrom<VpnServiceTreeRecord> for VpnServiceTree {
    type Error = VpnSyncError;

    fn try_from(record: VpnServiceTreeRecord) -> VpnSyncResult<Self> {
        let mut service = record.service;
        service.vpntype = record.vpntype.unwrap_or_else(|| record.connections.flavor());
        Self::new(service, record.subnet, record.connections)
    }
}

impl VpnServiceTree {
    /// Assemble a tree, rejecting a `vpntype` that disagrees with the
    /// connections
    pub fn new(
        service: VpnService,
        subnet: Option<Subnet>,
        connections: ServiceConnections,
    ) -> VpnSyncResult<Self> {
        if service.vpntype != connections.flavor() {
            return Err(VpnSyncError::InvalidParameter(format!(
                "VPN service {} has type {} but holds {} connections",
                service.id,
                service.vpntype,
                connections.flavor()
            )));
        }
        Ok(Self {
            service,
            subnet,
            connections,
        })
    }

    pub fn id(&self) -> &str {
        &self.service.id
    }

    pub fn router_id(&self) -> &str {
        &self.service.router_id
    }

    pub fn flavor(&self) -> Flavor {
        self.connections.flavor()
    }

    /// IPsec site connections; empty for services of another flavor
    pub fn ipsec_site_connections(&self) -> &[IpsecSiteConnectionTree] {
        match &self.connections {
            ServiceConnections::Ipsec(c) => c,
            _ => &[],
        }
    }

    /// PPTP connections; empty for services of another flavor
    pub fn pptpconnections(&self) -> &[PptpConnectionTree] {
        match &self.connections {
            ServiceConnections::Pptp(c) => c,
            _ => &[],
        }
    }

    /// OpenVPN connections; empty for services of another flavor
    pub fn openvpnconnections(&self) -> &[OpenVpnConnection] {
        match &self.connections {
            ServiceConnections::OpenVpn(c) => c,
            _ => &[],
        }
    }
}

/// Status of one connection inside an agent status report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub status: Status,
    #[serde(default)]
    pub updated_pending_status: bool,
}

/// One service entry of an agent status report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpnServiceStatus {
    pub id: String,
    pub status: Status,
    #[serde(default)]
    pub updated_pending_status: bool,
    #[serde(
        default,
        alias = "ipsec_site_connections",
        alias = "pptpconnections",
        alias = "openvpnconnections"
    )]
    pub connections: BTreeMap<String, ConnectionStatus>,
}
