use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::debug;

use crate::error::VpnSyncResult;
use crate::model::Router;
use crate::validation::parse_ip_address;

/// External tunnel endpoint addresses of a router, at most one per family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayIps {
    pub v4: Option<Ipv4Addr>,
    pub v6: Option<Ipv6Addr>,
}

/// Obtain the IPv4 and/or IPv6 gateway IP of a router.
///
/// Fixed IPs are visited in stored order and the first address of each family
/// wins. A missing family (or a router without a gateway port) is not an
/// error, but a malformed address is: it fails the whole resolution.
pub fn resolve_gateway_ips(router: &Router) -> VpnSyncResult<GatewayIps> {
    let mut ips = GatewayIps::default();

    let Some(gw_port) = router.gw_port.as_ref() else {
        debug!("Router {} has no gateway port", router.id);
        return Ok(ips);
    };

    for fixed_ip in &gw_port.fixed_ips {
        match parse_ip_address(&fixed_ip.ip_address)? {
            IpAddr::V4(addr) => {
                if ips.v4.is_none() {
                    ips.v4 = Some(addr);
                }
            }
            IpAddr::V6(addr) => {
                if ips.v6.is_none() {
                    ips.v6 = Some(addr);
                }
            }
        }
    }

    debug!("Router {} gateway IPs: v4={:?} v6={:?}", router.id, ips.v4, ips.v6);
    Ok(ips)
}

/// Pick the service's external IP of the same version as `peer_address`.
///
/// Returns `None` when the service has no address of that family. Callers
/// must treat that as unusable; no other-family fallback is attempted.
pub fn select_external_ip(
    service_v4: Option<Ipv4Addr>,
    service_v6: Option<Ipv6Addr>,
    peer_address: &str,
) -> VpnSyncResult<Option<IpAddr>> {
    Ok(match parse_ip_address(peer_address)? {
        IpAddr::V4(_) => service_v4.map(IpAddr::V4),
        IpAddr::V6(_) => service_v6.map(IpAddr::V6),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VpnSyncError;
    use crate::model::{FixedIp, GatewayPort};

    fn router(addrs: &[&str]) -> Router {
        Router {
            id: "router-1".to_string(),
            name: "r1".to_string(),
            tenant_id: "tenant-1".to_string(),
            gw_port: Some(GatewayPort {
                id: "port-1".to_string(),
                network_id: "ext-net".to_string(),
                fixed_ips: addrs
                    .iter()
                    .map(|a| FixedIp {
                        subnet_id: "ext-subnet".to_string(),
                        ip_address: a.to_string(),
                    })
                    .collect(),
            }),
        }
    }

    #[test]
    fn test_first_address_of_each_family_wins() {
        let ips = resolve_gateway_ips(&router(&[
            "2001:db8::1",
            "198.51.100.1",
            "198.51.100.2",
            "2001:db8::2",
        ]))
        .unwrap();

        assert_eq!(ips.v4, Some("198.51.100.1".parse().unwrap()));
        assert_eq!(ips.v6, Some("2001:db8::1".parse().unwrap()));
    }

    #[test]
    fn test_single_family() {
        let ips = resolve_gateway_ips(&router(&["198.51.100.1"])).unwrap();
        assert_eq!(ips.v4, Some(Ipv4Addr::new(198, 51, 100, 1)));
        assert_eq!(ips.v6, None);

        let ips = resolve_gateway_ips(&router(&["2001:db8::5"])).unwrap();
        assert_eq!(ips.v4, None);
        assert_eq!(ips.v6, Some("2001:db8::5".parse().unwrap()));
    }

    #[test]
    fn test_no_fixed_ips() {
        assert_eq!(resolve_gateway_ips(&router(&[])).unwrap(), GatewayIps::default());

        let mut r = router(&[]);
        r.gw_port = None;
        assert_eq!(resolve_gateway_ips(&r).unwrap(), GatewayIps::default());
    }

    #[test]
    fn test_malformed_gateway_address_fails() {
        let err = resolve_gateway_ips(&router(&["198.51.100.1", "198.51.100.300"])).unwrap_err();
        match err {
            VpnSyncError::AddressFormat { address } => assert_eq!(address, "198.51.100.300"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_select_by_peer_version() {
        let v4 = Some(Ipv4Addr::new(10, 0, 0, 1));
        let v6 = Some("2001:db8::1".parse().unwrap());

        assert_eq!(
            select_external_ip(v4, v6, "203.0.113.5").unwrap(),
            Some("10.0.0.1".parse().unwrap())
        );
        assert_eq!(
            select_external_ip(v4, v6, "2001:db8::99").unwrap(),
            Some("2001:db8::1".parse().unwrap())
        );
    }

    #[test]
    fn test_select_missing_family_is_absent() {
        let v4 = Some(Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(select_external_ip(v4, None, "2001:db8::99").unwrap(), None);
        assert_eq!(select_external_ip(None, None, "203.0.113.5").unwrap(), None);
    }

    #[test]
    fn test_select_malformed_peer_fails() {
        assert!(matches!(
            select_external_ip(None, None, "peer.example.com"),
            Err(VpnSyncError::AddressFormat { .. })
        ));
    }
}
