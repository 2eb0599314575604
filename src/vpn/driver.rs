use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::DriverConfig;
use crate::context::RequestContext;
use crate::error::VpnSyncResult;
use crate::model::{
    Flavor, IkePolicy, IpsecPolicy, IpsecSiteConnection, OpenVpnConnection, PptpConnection,
    PptpCredential, VpnService,
};
use crate::registry::ServiceRegistry;
use crate::validation;
use super::callbacks::VpnDriverCallbacks;
use super::gateway::resolve_gateway_ips;
use super::notifier::{AgentChannels, AgentNotification, AgentRpcApi, NotificationPayload};

/// Lifecycle hooks the plugin layer calls for every VPN resource mutation.
///
/// IKE and IPsec policies are only referenced by connections, so their hooks
/// default to no-ops: a policy change reaches the agents when a connection
/// using it is created or updated.
#[async_trait]
pub trait VpnServiceDriver: Send + Sync {
    /// Service type served by this driver (e.g. "ipsec")
    fn service_type(&self) -> &str;

    async fn create_vpnservice(&self, ctx: &RequestContext, vpnservice: &mut VpnService) -> VpnSyncResult<()>;

    async fn update_vpnservice(
        &self,
        ctx: &RequestContext,
        old_vpnservice: &VpnService,
        vpnservice: &VpnService,
    ) -> VpnSyncResult<()>;

    async fn delete_vpnservice(&self, ctx: &RequestContext, vpnservice: &VpnService) -> VpnSyncResult<()>;

    async fn create_ipsec_site_connection(
        &self,
        ctx: &RequestContext,
        ipsec_site_connection: &IpsecSiteConnection,
    ) -> VpnSyncResult<()>;

    async fn update_ipsec_site_connection(
        &self,
        ctx: &RequestContext,
        old_ipsec_site_connection: &IpsecSiteConnection,
        ipsec_site_connection: &IpsecSiteConnection,
    ) -> VpnSyncResult<()>;

    async fn delete_ipsec_site_connection(
        &self,
        ctx: &RequestContext,
        ipsec_site_connection: &IpsecSiteConnection,
    ) -> VpnSyncResult<()>;

    /// No-op
    async fn create_ikepolicy(&self, _ctx: &RequestContext, ikepolicy: &IkePolicy) -> VpnSyncResult<()> {
        debug!("IKE policy {} created, nothing to notify", ikepolicy.id);
        Ok(())
    }

    /// No-op
    async fn update_ikepolicy(
        &self,
        _ctx: &RequestContext,
        _old_ikepolicy: &IkePolicy,
        ikepolicy: &IkePolicy,
    ) -> VpnSyncResult<()> {
        debug!("IKE policy {} updated, nothing to notify", ikepolicy.id);
        Ok(())
    }

    /// No-op
    async fn delete_ikepolicy(&self, _ctx: &RequestContext, ikepolicy: &IkePolicy) -> VpnSyncResult<()> {
        debug!("IKE policy {} deleted, nothing to notify", ikepolicy.id);
        Ok(())
    }

    /// No-op
    async fn create_ipsecpolicy(&self, _ctx: &RequestContext, ipsecpolicy: &IpsecPolicy) -> VpnSyncResult<()> {
        debug!("IPsec policy {} created, nothing to notify", ipsecpolicy.id);
        Ok(())
    }

    /// No-op
    async fn update_ipsecpolicy(
        &self,
        _ctx: &RequestContext,
        _old_ipsecpolicy: &IpsecPolicy,
        ipsecpolicy: &IpsecPolicy,
    ) -> VpnSyncResult<()> {
        debug!("IPsec policy {} updated, nothing to notify", ipsecpolicy.id);
        Ok(())
    }

    /// No-op
    async fn delete_ipsecpolicy(&self, _ctx: &RequestContext, ipsecpolicy: &IpsecPolicy) -> VpnSyncResult<()> {
        debug!("IPsec policy {} deleted, nothing to notify", ipsecpolicy.id);
        Ok(())
    }

    async fn create_pptpconnection(&self, ctx: &RequestContext, pptpconnection: &PptpConnection) -> VpnSyncResult<()>;

    async fn update_pptpconnection(
        &self,
        ctx: &RequestContext,
        old_pptpconnection: &PptpConnection,
        pptpconnection: &PptpConnection,
    ) -> VpnSyncResult<()>;

    async fn delete_pptpconnection(&self, ctx: &RequestContext, pptpconnection: &PptpConnection) -> VpnSyncResult<()>;

    async fn create_pptpcredential(
        &self,
        ctx: &RequestContext,
        pptpcredential: &PptpCredential,
        pptpconnection: &PptpConnection,
    ) -> VpnSyncResult<()>;

    async fn update_pptpcredential(
        &self,
        ctx: &RequestContext,
        pptpcredential: &PptpCredential,
        pptpconnection: &PptpConnection,
    ) -> VpnSyncResult<()>;

    async fn delete_pptpcredential(
        &self,
        ctx: &RequestContext,
        pptpcredential: &PptpCredential,
        pptpconnection: &PptpConnection,
    ) -> VpnSyncResult<()>;

    async fn create_openvpnconnection(
        &self,
        ctx: &RequestContext,
        openvpnconnection: &OpenVpnConnection,
    ) -> VpnSyncResult<()>;

    async fn update_openvpnconnection(
        &self,
        ctx: &RequestContext,
        openvpnconnection: &OpenVpnConnection,
    ) -> VpnSyncResult<()>;

    async fn delete_openvpnconnection(
        &self,
        ctx: &RequestContext,
        openvpnconnection: &OpenVpnConnection,
    ) -> VpnSyncResult<()>;
}

/// Reference driver: the local tunnel endpoint is the router's gateway IP,
/// and every change is signalled to the agent hosting the router.
pub struct IpsecVpnDriver {
    registry: Arc<dyn ServiceRegistry>,
    agents: AgentChannels,
    config: DriverConfig,
}

impl IpsecVpnDriver {
    /// Create a driver and the notification receiver for the RPC transport
    pub fn new(
        registry: Arc<dyn ServiceRegistry>,
        config: DriverConfig,
    ) -> (Self, mpsc::Receiver<AgentNotification>) {
        let (agents, rx) = AgentChannels::new(&config);
        (Self::with_channels(registry, agents, config), rx)
    }

    /// Create a driver on existing agent channels
    pub fn with_channels(
        registry: Arc<dyn ServiceRegistry>,
        agents: AgentChannels,
        config: DriverConfig,
    ) -> Self {
        Self {
            registry,
            agents,
            config,
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Agent-facing callbacks sharing this driver's registry
    pub fn callbacks(&self) -> VpnDriverCallbacks {
        VpnDriverCallbacks::new(self.registry.clone())
    }

    /// Router of the service owning a connection
    async fn router_of(&self, ctx: &RequestContext, vpnservice_id: &str) -> VpnSyncResult<String> {
        let vpnservice = self.registry.get_vpn_service(ctx, vpnservice_id).await?;
        Ok(vpnservice.router_id().to_string())
    }

    async fn notify(
        &self,
        ctx: &RequestContext,
        agent: &AgentRpcApi,
        vpnservice_id: &str,
        payload: Option<NotificationPayload>,
    ) -> VpnSyncResult<()> {
        let router_id = self.router_of(ctx, vpnservice_id).await?;
        agent.vpnservice_updated(ctx, &router_id, payload).await
    }

    async fn notify_ipsec_site_connection(
        &self,
        ctx: &RequestContext,
        ipsec_site_connection: &IpsecSiteConnection,
    ) -> VpnSyncResult<()> {
        let vpnservice = self.registry
            .get_vpn_service(ctx, &ipsec_site_connection.vpnservice_id)
            .await?;

        if self.config.validate_ipsec_site_connections {
            validation::validate_ipsec_site_connection(ipsec_site_connection)?;
        }
        if self.config.validate_peer_address_family {
            validation::validate_peer_address_family(&vpnservice.service, ipsec_site_connection)?;
        }

        self.agents.ipsec
            .vpnservice_updated(ctx, vpnservice.router_id(), None)
            .await
    }
}

#[async_trait]
impl VpnServiceDriver for IpsecVpnDriver {
    fn service_type(&self) -> &str {
        Flavor::Ipsec.as_str()
    }

    /// Resolve the router's gateway IP(s) and save them on the service.
    ///
    /// A connection uses the gateway IP of the same version as its peer, so
    /// the first IP of each version is kept.
    async fn create_vpnservice(&self, ctx: &RequestContext, vpnservice: &mut VpnService) -> VpnSyncResult<()> {
        let router = self.registry.get_router(ctx, &vpnservice.router_id).await?;
        let ips = resolve_gateway_ips(&router)?;

        self.registry
            .set_external_tunnel_ips(ctx, &vpnservice.id, ips.v4, ips.v6)
            .await?;
        vpnservice.external_v4_ip = ips.v4;
        vpnservice.external_v6_ip = ips.v6;

        info!(
            "Created VPN service {} on router {} (v4={:?}, v6={:?})",
            vpnservice.id, vpnservice.router_id, ips.v4, ips.v6
        );

        if self.config.notify_on_vpnservice_create {
            self.agents.for_flavor(vpnservice.vpntype)
                .vpnservice_updated(ctx, &vpnservice.router_id, None)
                .await?;
        }
        Ok(())
    }

    async fn update_vpnservice(
        &self,
        ctx: &RequestContext,
        _old_vpnservice: &VpnService,
        vpnservice: &VpnService,
    ) -> VpnSyncResult<()> {
        self.agents.for_flavor(vpnservice.vpntype)
            .vpnservice_updated(ctx, &vpnservice.router_id, None)
            .await
    }

    async fn delete_vpnservice(&self, ctx: &RequestContext, vpnservice: &VpnService) -> VpnSyncResult<()> {
        self.agents.for_flavor(vpnservice.vpntype)
            .vpnservice_updated(ctx, &vpnservice.router_id, None)
            .await
    }

    async fn create_ipsec_site_connection(
        &self,
        ctx: &RequestContext,
        ipsec_site_connection: &IpsecSiteConnection,
    ) -> VpnSyncResult<()> {
        self.notify_ipsec_site_connection(ctx, ipsec_site_connection).await
    }

    async fn update_ipsec_site_connection(
        &self,
        ctx: &RequestContext,
        _old_ipsec_site_connection: &IpsecSiteConnection,
        ipsec_site_connection: &IpsecSiteConnection,
    ) -> VpnSyncResult<()> {
        self.notify_ipsec_site_connection(ctx, ipsec_site_connection).await
    }

    async fn delete_ipsec_site_connection(
        &self,
        ctx: &RequestContext,
        ipsec_site_connection: &IpsecSiteConnection,
    ) -> VpnSyncResult<()> {
        self.notify(ctx, &self.agents.ipsec, &ipsec_site_connection.vpnservice_id, None).await
    }

    async fn create_pptpconnection(&self, ctx: &RequestContext, pptpconnection: &PptpConnection) -> VpnSyncResult<()> {
        self.notify(ctx, &self.agents.pptp, &pptpconnection.vpnservice_id, None).await
    }

    async fn update_pptpconnection(
        &self,
        ctx: &RequestContext,
        _old_pptpconnection: &PptpConnection,
        pptpconnection: &PptpConnection,
    ) -> VpnSyncResult<()> {
        self.notify(ctx, &self.agents.pptp, &pptpconnection.vpnservice_id, None).await
    }

    async fn delete_pptpconnection(&self, ctx: &RequestContext, pptpconnection: &PptpConnection) -> VpnSyncResult<()> {
        self.notify(ctx, &self.agents.pptp, &pptpconnection.vpnservice_id, None).await
    }

    async fn create_pptpcredential(
        &self,
        ctx: &RequestContext,
        pptpcredential: &PptpCredential,
        pptpconnection: &PptpConnection,
    ) -> VpnSyncResult<()> {
        let payload = NotificationPayload::Credential(pptpcredential.clone());
        self.notify(ctx, &self.agents.pptp, &pptpconnection.vpnservice_id, Some(payload)).await
    }

    async fn update_pptpcredential(
        &self,
        ctx: &RequestContext,
        pptpcredential: &PptpCredential,
        pptpconnection: &PptpConnection,
    ) -> VpnSyncResult<()> {
        let payload = NotificationPayload::Credential(pptpcredential.clone());
        self.notify(ctx, &self.agents.pptp, &pptpconnection.vpnservice_id, Some(payload)).await
    }

    async fn delete_pptpcredential(
        &self,
        ctx: &RequestContext,
        pptpcredential: &PptpCredential,
        pptpconnection: &PptpConnection,
    ) -> VpnSyncResult<()> {
        let payload = NotificationPayload::Credential(pptpcredential.clone());
        self.notify(ctx, &self.agents.pptp, &pptpconnection.vpnservice_id, Some(payload)).await
    }

    async fn create_openvpnconnection(
        &self,
        ctx: &RequestContext,
        openvpnconnection: &OpenVpnConnection,
    ) -> VpnSyncResult<()> {
        self.notify(ctx, &self.agents.openvpn, &openvpnconnection.vpnservice_id, None).await
    }

    async fn update_openvpnconnection(
        &self,
        ctx: &RequestContext,
        openvpnconnection: &OpenVpnConnection,
    ) -> VpnSyncResult<()> {
        self.notify(ctx, &self.agents.openvpn, &openvpnconnection.vpnservice_id, None).await
    }

    /// The deleted connection travels with the notification: once it is gone
    /// from storage the agent cannot fetch it any more.
    async fn delete_openvpnconnection(
        &self,
        ctx: &RequestContext,
        openvpnconnection: &OpenVpnConnection,
    ) -> VpnSyncResult<()> {
        let payload = NotificationPayload::OpenVpnConnection(openvpnconnection.clone());
        self.notify(ctx, &self.agents.openvpn, &openvpnconnection.vpnservice_id, Some(payload)).await
    }
}
