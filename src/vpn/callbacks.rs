use std::sync::Arc;
use tracing::{debug, info};

use crate::context::RequestContext;
use crate::error::VpnSyncResult;
use crate::model::{Flavor, VpnServiceStatus};
use crate::registry::ServiceRegistry;
use super::snapshot::{build_snapshot, ServiceSnapshot};

/// Calls made by agents into the driver
#[derive(Clone)]
pub struct VpnDriverCallbacks {
    registry: Arc<dyn ServiceRegistry>,
}

impl VpnDriverCallbacks {
    pub fn new(registry: Arc<dyn ServiceRegistry>) -> Self {
        Self { registry }
    }

    /// Snapshots of every service of `flavor` scheduled to `host`.
    ///
    /// Without a flavor the IPsec services are returned.
    pub async fn get_vpn_services_on_host(
        &self,
        ctx: &RequestContext,
        host: &str,
        flavor: Option<Flavor>,
    ) -> VpnSyncResult<Vec<ServiceSnapshot>> {
        let flavor = flavor.unwrap_or_default();
        let services = self.registry
            .get_agent_hosting_vpn_services(ctx, host, flavor)
            .await?;

        let snapshots = services
            .iter()
            .map(|service| build_snapshot(service, flavor))
            .collect::<VpnSyncResult<Vec<_>>>()?;

        info!("Returning {} {} VPN service(s) to host {}", snapshots.len(), flavor, host);
        Ok(snapshots)
    }

    /// Forward an agent status report to the registry
    pub async fn update_status(
        &self,
        ctx: &RequestContext,
        status: Vec<VpnServiceStatus>,
        flavor: Option<Flavor>,
    ) -> VpnSyncResult<()> {
        let flavor = flavor.unwrap_or_default();
        debug!("Agent reported status of {} {} VPN service(s)", status.len(), flavor);
        self.registry.update_status_by_agent(ctx, status, flavor).await
    }
}
