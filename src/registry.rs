//! Registry collaborator: the persistence layer that owns VPN services
//!
//! The driver never stores anything itself. It reads services and routers
//! through [`ServiceRegistry`] and writes back only the resolved external
//! tunnel IPs and agent status reports. [`InMemoryRegistry`] is a complete
//! implementation backed by a JSON fixture, used by the `vpnsync` tool and the
//! integration tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::context::RequestContext;
use crate::error::{VpnSyncError, VpnSyncResult};
use crate::model::{Flavor, Router, ServiceConnections, VpnServiceStatus, VpnServiceTree};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Fetch a VPN service with its nested children
    async fn get_vpn_service(&self, ctx: &RequestContext, id: &str) -> VpnSyncResult<VpnServiceTree>;

    /// Fetch a router with its gateway port
    async fn get_router(&self, ctx: &RequestContext, router_id: &str) -> VpnSyncResult<Router>;

    /// Services of `flavor` whose router is scheduled to `host`
    async fn get_agent_hosting_vpn_services(
        &self,
        ctx: &RequestContext,
        host: &str,
        flavor: Flavor,
    ) -> VpnSyncResult<Vec<VpnServiceTree>>;

    /// Persist the resolved external tunnel IPs. Written once per service;
    /// the implementation must serialize concurrent writers.
    async fn set_external_tunnel_ips(
        &self,
        ctx: &RequestContext,
        service_id: &str,
        v4: Option<Ipv4Addr>,
        v6: Option<Ipv6Addr>,
    ) -> VpnSyncResult<()>;

    /// Apply a status report sent by an agent
    async fn update_status_by_agent(
        &self,
        ctx: &RequestContext,
        status: Vec<VpnServiceStatus>,
        flavor: Flavor,
    ) -> VpnSyncResult<()>;
}

/// Serialized form of an [`InMemoryRegistry`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryFixture {
    #[serde(default)]
    pub routers: Vec<Router>,
    #[serde(default)]
    pub services: Vec<VpnServiceTree>,
    /// router id -> agent host
    #[serde(default)]
    pub router_hosts: BTreeMap<String, String>,
    /// Services whose external IPs were already resolved, including those
    /// resolved to no address at all
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub resolved_services: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct RegistryState {
    routers: HashMap<String, Router>,
    services: BTreeMap<String, VpnServiceTree>,
    router_hosts: HashMap<String, String>,
    /// Ids whose external IPs are written
    resolved: HashSet<String>,
}

/// Registry held entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    state: RwLock<RegistryState>,
}

impl InMemoryRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-populated from a fixture
    pub fn from_fixture(fixture: RegistryFixture) -> Self {
        let mut resolved: HashSet<String> = fixture.resolved_services.into_iter().collect();
        resolved.extend(
            fixture.services.iter()
                .filter(|s| has_external_ips(s))
                .map(|s| s.service.id.clone()),
        );

        let state = RegistryState {
            routers: fixture.routers.into_iter().map(|r| (r.id.clone(), r)).collect(),
            services: fixture.services.into_iter().map(|s| (s.service.id.clone(), s)).collect(),
            router_hosts: fixture.router_hosts.into_iter().collect(),
            resolved,
        };
        Self {
            state: RwLock::new(state),
        }
    }

    /// Load a JSON fixture file
    pub async fn load(path: &Path) -> VpnSyncResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let fixture: RegistryFixture = serde_json::from_str(&content)?;
        info!(
            "Loaded registry fixture {:?}: {} routers, {} services",
            path,
            fixture.routers.len(),
            fixture.services.len()
        );
        Ok(Self::from_fixture(fixture))
    }

    /// Export the current state as a fixture
    pub async fn to_fixture(&self) -> RegistryFixture {
        let state = self.state.read().await;
        let mut routers: Vec<Router> = state.routers.values().cloned().collect();
        routers.sort_by(|a, b| a.id.cmp(&b.id));

        RegistryFixture {
            routers,
            services: state.services.values().cloned().collect(),
            router_hosts: state.router_hosts.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            resolved_services: state.resolved.iter().cloned().collect(),
        }
    }

    pub async fn insert_router(&self, router: Router) {
        let mut state = self.state.write().await;
        state.routers.insert(router.id.clone(), router);
    }

    /// Insert or replace a service. A service carrying external IPs counts
    /// as resolved.
    pub async fn insert_service(&self, service: VpnServiceTree) {
        let mut state = self.state.write().await;
        let id = service.service.id.clone();
        if has_external_ips(&service) {
            state.resolved.insert(id.clone());
        } else {
            state.resolved.remove(&id);
        }
        state.services.insert(id, service);
    }

    pub async fn remove_service(&self, id: &str) -> Option<VpnServiceTree> {
        let mut state = self.state.write().await;
        state.resolved.remove(id);
        state.services.remove(id)
    }

    /// Bind a router to the agent running on `host`
    pub async fn schedule_router(&self, router_id: &str, host: &str) {
        let mut state = self.state.write().await;
        state.router_hosts.insert(router_id.to_string(), host.to_string());
    }
}

fn has_external_ips(tree: &VpnServiceTree) -> bool {
    tree.service.external_v4_ip.is_some() || tree.service.external_v6_ip.is_some()
}

#[async_trait]
impl ServiceRegistry for InMemoryRegistry {
    async fn get_vpn_service(&self, _ctx: &RequestContext, id: &str) -> VpnSyncResult<VpnServiceTree> {
        let state = self.state.read().await;
        state.services.get(id)
            .cloned()
            .ok_or_else(|| VpnSyncError::not_found("vpnservice", id))
    }

    async fn get_router(&self, _ctx: &RequestContext, router_id: &str) -> VpnSyncResult<Router> {
        let state = self.state.read().await;
        state.routers.get(router_id)
            .cloned()
            .ok_or_else(|| VpnSyncError::not_found("router", router_id))
    }

    async fn get_agent_hosting_vpn_services(
        &self,
        _ctx: &RequestContext,
        host: &str,
        flavor: Flavor,
    ) -> VpnSyncResult<Vec<VpnServiceTree>> {
        let state = self.state.read().await;
        let services: Vec<VpnServiceTree> = state.services.values()
            .filter(|s| s.flavor() == flavor)
            .filter(|s| state.router_hosts.get(s.router_id()).map(String::as_str) == Some(host))
            .cloned()
            .collect();

        debug!("Host {} hosts {} {} services", host, services.len(), flavor);
        Ok(services)
    }

    async fn set_external_tunnel_ips(
        &self,
        _ctx: &RequestContext,
        service_id: &str,
        v4: Option<Ipv4Addr>,
        v6: Option<Ipv6Addr>,
    ) -> VpnSyncResult<()> {
        let mut state = self.state.write().await;
        let RegistryState { services, resolved, .. } = &mut *state;
        let tree = services.get_mut(service_id)
            .ok_or_else(|| VpnSyncError::not_found("vpnservice", service_id))?;
        let service = &mut tree.service;

        // (None, None) is a resolution too
        if resolved.contains(service_id) {
            if service.external_v4_ip == v4 && service.external_v6_ip == v6 {
                return Ok(());
            }
            return Err(VpnSyncError::InvalidState(format!(
                "External tunnel IPs of VPN service {} are already set",
                service_id
            )));
        }

        service.external_v4_ip = v4;
        service.external_v6_ip = v6;
        resolved.insert(service_id.to_string());
        info!("VPN service {} external IPs set: v4={:?} v6={:?}", service_id, v4, v6);
        Ok(())
    }

    async fn update_status_by_agent(
        &self,
        _ctx: &RequestContext,
        status: Vec<VpnServiceStatus>,
        flavor: Flavor,
    ) -> VpnSyncResult<()> {
        let mut state = self.state.write().await;

        for report in status {
            let Some(tree) = state.services.get_mut(&report.id) else {
                warn!("Status report for unknown VPN service {}, already deleted?", report.id);
                continue;
            };
            if tree.flavor() != flavor {
                warn!(
                    "Ignoring {} status report for VPN service {} of type {}",
                    flavor, report.id, tree.flavor()
                );
                continue;
            }

            tree.service.status = report.status;
            for (conn_id, conn_status) in &report.connections {
                let updated = match &mut tree.connections {
                    ServiceConnections::Ipsec(conns) => conns.iter_mut()
                        .find(|c| &c.connection.id == conn_id)
                        .map(|c| c.connection.status = conn_status.status),
                    ServiceConnections::Pptp(conns) => conns.iter_mut()
                        .find(|c| &c.connection.id == conn_id)
                        .map(|c| c.connection.status = conn_status.status),
                    ServiceConnections::OpenVpn(conns) => conns.iter_mut()
                        .find(|c| &c.id == conn_id)
                        .map(|c| c.status = conn_status.status),
                };
                if updated.is_none() {
                    warn!("Status report for unknown connection {} of VPN service {}", conn_id, report.id);
                }
            }
            debug!("Applied status {:?} to VPN service {}", report.status, report.id);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Status;
    use serde_json::json;

    fn fixture() -> RegistryFixture {
        serde_json::from_value(json!({
            "routers": [{"id": "router-1"}, {"id": "router-2"}],
            "router_hosts": {"router-1": "host-a", "router-2": "host-b"},
            "services": [
                {
                    "id": "svc-1",
                    "router_id": "router-1",
                    "ipsec_site_connections": [{
                        "id": "conn-1",
                        "vpnservice_id": "svc-1",
                        "peer_address": "203.0.113.5",
                        "peer_id": "203.0.113.5",
                        "ikepolicy": {"id": "ike-1"},
                        "ipsecpolicy": {"id": "ipsec-1"}
                    }]
                },
                {"id": "svc-2", "router_id": "router-2", "ipsec_site_connections": []},
                {"id": "svc-3", "router_id": "router-1", "vpntype": "pptp", "pptpconnections": []}
            ]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_lookup() {
        let registry = InMemoryRegistry::from_fixture(fixture());
        let ctx = RequestContext::admin();

        assert_eq!(registry.get_vpn_service(&ctx, "svc-1").await.unwrap().router_id(), "router-1");
        assert!(registry.get_router(&ctx, "router-2").await.is_ok());

        match registry.get_vpn_service(&ctx, "missing").await {
            Err(VpnSyncError::NotFound { kind, id }) => {
                assert_eq!(kind, "vpnservice");
                assert_eq!(id, "missing");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_hosting_filters_by_host_and_flavor() {
        let registry = InMemoryRegistry::from_fixture(fixture());
        let ctx = RequestContext::admin();

        let ipsec = registry.get_agent_hosting_vpn_services(&ctx, "host-a", Flavor::Ipsec).await.unwrap();
        assert_eq!(ipsec.iter().map(|s| s.id()).collect::<Vec<_>>(), vec!["svc-1"]);

        let pptp = registry.get_agent_hosting_vpn_services(&ctx, "host-a", Flavor::Pptp).await.unwrap();
        assert_eq!(pptp.iter().map(|s| s.id()).collect::<Vec<_>>(), vec!["svc-3"]);

        let none = registry.get_agent_hosting_vpn_services(&ctx, "host-c", Flavor::Ipsec).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_external_ips_are_write_once() {
        let registry = InMemoryRegistry::from_fixture(fixture());
        let ctx = RequestContext::admin();
        let v4 = Some(Ipv4Addr::new(198, 51, 100, 1));

        tokio_test::assert_ok!(registry.set_external_tunnel_ips(&ctx, "svc-1", v4, None).await);
        // same values again is a no-op
        tokio_test::assert_ok!(registry.set_external_tunnel_ips(&ctx, "svc-1", v4, None).await);
        tokio_test::assert_err!(
            registry.set_external_tunnel_ips(&ctx, "svc-1", Some(Ipv4Addr::new(198, 51, 100, 2)), None).await
        );

        let service = registry.get_vpn_service(&ctx, "svc-1").await.unwrap();
        assert_eq!(service.service.external_v4_ip, v4);
        assert_eq!(service.service.external_v6_ip, None);
    }

    #[tokio::test]
    async fn test_empty_resolution_is_write_once() {
        let registry = InMemoryRegistry::from_fixture(fixture());
        let ctx = RequestContext::admin();

        tokio_test::assert_ok!(registry.set_external_tunnel_ips(&ctx, "svc-2", None, None).await);
        tokio_test::assert_ok!(registry.set_external_tunnel_ips(&ctx, "svc-2", None, None).await);
        let err = registry
            .set_external_tunnel_ips(&ctx, "svc-2", Some(Ipv4Addr::new(192, 0, 2, 7)), None)
            .await
            .unwrap_err();
        assert!(matches!(err, VpnSyncError::InvalidState(_)));

        let service = registry.get_vpn_service(&ctx, "svc-2").await.unwrap();
        assert_eq!(service.service.external_v4_ip, None);
    }

    #[tokio::test]
    async fn test_resolution_survives_fixture_export() {
        let registry = InMemoryRegistry::from_fixture(fixture());
        let ctx = RequestContext::admin();
        registry.set_external_tunnel_ips(&ctx, "svc-2", None, None).await.unwrap();

        let exported = registry.to_fixture().await;
        assert!(exported.resolved_services.contains("svc-2"));

        let reloaded = InMemoryRegistry::from_fixture(exported);
        tokio_test::assert_err!(
            reloaded.set_external_tunnel_ips(&ctx, "svc-2", Some(Ipv4Addr::new(192, 0, 2, 7)), None).await
        );
    }

    #[tokio::test]
    async fn test_status_update() {
        let registry = InMemoryRegistry::from_fixture(fixture());
        let ctx = RequestContext::admin();

        let reports: Vec<VpnServiceStatus> = serde_json::from_value(json!([
            {
                "id": "svc-1",
                "status": "ACTIVE",
                "ipsec_site_connections": {"conn-1": {"status": "ACTIVE"}}
            },
            {"id": "svc-3", "status": "ACTIVE"},
            {"id": "gone", "status": "DOWN"}
        ]))
        .unwrap();

        registry.update_status_by_agent(&ctx, reports, Flavor::Ipsec).await.unwrap();

        let svc1 = registry.get_vpn_service(&ctx, "svc-1").await.unwrap();
        assert_eq!(svc1.service.status, Status::Active);
        assert_eq!(svc1.ipsec_site_connections()[0].connection.status, Status::Active);

        // PPTP service is not touched by an IPsec report
        let svc3 = registry.get_vpn_service(&ctx, "svc-3").await.unwrap();
        assert_eq!(svc3.service.status, Status::PendingCreate);
    }

    #[tokio::test]
    async fn test_fixture_roundtrip() {
        let registry = InMemoryRegistry::from_fixture(fixture());
        let exported = registry.to_fixture().await;
        assert_eq!(exported.services.len(), 3);
        assert_eq!(exported.router_hosts.get("router-2").map(String::as_str), Some("host-b"));
    }
}
