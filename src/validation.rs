//! Address classification and input validation
//!
//! Every IP literal the driver looks at goes through [`parse_ip_address`], so a
//! malformed address always surfaces as `VpnSyncError::AddressFormat`.

use crate::error::{VpnSyncError, VpnSyncResult};
use crate::model::{IpsecSiteConnection, VpnService};
use std::net::IpAddr;

/// Smallest MTU an IPv4 link may use (RFC 791)
const MIN_IPV4_MTU: u32 = 68;

/// Largest MTU accepted for a tunnel
const MAX_MTU: u32 = 9000;

/// Parse an IP literal, v4 or v6
pub fn parse_ip_address(addr: &str) -> VpnSyncResult<IpAddr> {
    addr.trim().parse::<IpAddr>()
        .map_err(|_| VpnSyncError::AddressFormat {
            address: addr.to_string(),
        })
}

/// IP version (4 or 6) of an address literal
pub fn ip_version(addr: &str) -> VpnSyncResult<u8> {
    Ok(match parse_ip_address(addr)? {
        IpAddr::V4(_) => 4,
        IpAddr::V6(_) => 6,
    })
}

/// Validate CIDR notation (e.g. "10.0.0.0/24")
pub fn validate_cidr(cidr: &str) -> VpnSyncResult<()> {
    let (ip, prefix) = cidr.split_once('/')
        .ok_or_else(|| VpnSyncError::InvalidParameter(format!("Invalid CIDR (missing prefix): {}", cidr)))?;

    let prefix: u8 = prefix.parse()
        .map_err(|_| VpnSyncError::InvalidParameter(format!("Invalid CIDR prefix: {}", cidr)))?;

    let max = match parse_ip_address(ip)? {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    };
    if prefix > max {
        return Err(VpnSyncError::InvalidParameter(
            format!("Invalid CIDR prefix length {} (max {})", prefix, max)
        ));
    }

    Ok(())
}

/// Validate a tunnel MTU
pub fn validate_mtu(mtu: u32) -> VpnSyncResult<()> {
    if !(MIN_IPV4_MTU..=MAX_MTU).contains(&mtu) {
        return Err(VpnSyncError::InvalidParameter(
            format!("MTU must be between {} and {}", MIN_IPV4_MTU, MAX_MTU)
        ));
    }
    Ok(())
}

/// Check that `service` has a resolved external IP of the same family as the
/// connection's peer address.
pub fn validate_peer_address_family(
    service: &VpnService,
    connection: &IpsecSiteConnection,
) -> VpnSyncResult<()> {
    let available = match parse_ip_address(&connection.peer_address)? {
        IpAddr::V4(_) => (4, service.external_v4_ip.is_some()),
        IpAddr::V6(_) => (6, service.external_v6_ip.is_some()),
    };

    match available {
        (_, true) => Ok(()),
        (version, false) => Err(VpnSyncError::MissingResolvedAddress {
            service_id: service.id.clone(),
            peer_address: connection.peer_address.clone(),
            version,
        }),
    }
}

/// Validate the attributes of an IPsec site connection
pub fn validate_ipsec_site_connection(connection: &IpsecSiteConnection) -> VpnSyncResult<()> {
    parse_ip_address(&connection.peer_address)?;
    validate_mtu(connection.mtu)?;

    if connection.peer_id.trim().is_empty() {
        return Err(VpnSyncError::InvalidParameter(
            format!("Connection {} has an empty peer_id", connection.id)
        ));
    }

    if connection.dpd.timeout <= connection.dpd.interval {
        return Err(VpnSyncError::InvalidParameter(
            "DPD timeout must be greater than DPD interval".to_string()
        ));
    }

    Ok(())
}
