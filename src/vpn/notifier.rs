//! Outbound agent notifications
//!
//! Agents are told "the VPN services of this router changed, re-fetch them".
//! The driver only pushes [`AgentNotification`]s onto a bounded queue; the RPC
//! transport owns the receiving end and is responsible for delivery to the
//! host running the router.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::DriverConfig;
use crate::context::RequestContext;
use crate::error::{VpnSyncError, VpnSyncResult};
use crate::model::{Flavor, OpenVpnConnection, PptpCredential};

/// Method name agents dispatch on
pub const VPNSERVICE_UPDATED: &str = "vpnservice_updated";

/// Flavor-specific data attached to a notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPayload {
    Credential(PptpCredential),
    #[serde(rename = "openvpnconnection")]
    OpenVpnConnection(OpenVpnConnection),
}

/// One cast to the agents of a flavor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentNotification {
    pub flavor: Flavor,
    pub topic: String,
    pub version: String,
    pub method: String,
    pub router_id: String,
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<NotificationPayload>,
}

/// Agent RPC API of one flavor
#[derive(Debug, Clone)]
pub struct AgentRpcApi {
    flavor: Flavor,
    topic: String,
    version: String,
    tx: mpsc::Sender<AgentNotification>,
}

impl AgentRpcApi {
    pub fn new(
        flavor: Flavor,
        topic: impl Into<String>,
        version: impl Into<String>,
        tx: mpsc::Sender<AgentNotification>,
    ) -> Self {
        Self {
            flavor,
            topic: topic.into(),
            version: version.into(),
            tx,
        }
    }

    pub fn flavor(&self) -> Flavor {
        self.flavor
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Tell the agent hosting `router_id` to reconcile its VPN services.
    ///
    /// Waits for queue space when the transport is behind.
    pub async fn vpnservice_updated(
        &self,
        ctx: &RequestContext,
        router_id: &str,
        payload: Option<NotificationPayload>,
    ) -> VpnSyncResult<()> {
        let notification = AgentNotification {
            flavor: self.flavor,
            topic: self.topic.clone(),
            version: self.version.clone(),
            method: VPNSERVICE_UPDATED.to_string(),
            router_id: router_id.to_string(),
            request_id: ctx.request_id.clone(),
            payload,
        };

        debug!("Casting {} to {} for router {}", VPNSERVICE_UPDATED, self.topic, router_id);
        self.tx.send(notification).await
            .map_err(|_| VpnSyncError::ChannelClosed { topic: self.topic.clone() })?;

        info!("Notified {} agent of router {}", self.flavor, router_id);
        Ok(())
    }
}

/// The three per-flavor agent APIs sharing one outbound queue
#[derive(Debug, Clone)]
pub struct AgentChannels {
    pub ipsec: AgentRpcApi,
    pub pptp: AgentRpcApi,
    pub openvpn: AgentRpcApi,
}

impl AgentChannels {
    /// Create the agent APIs and the receiver the transport drains
    pub fn new(config: &DriverConfig) -> (Self, mpsc::Receiver<AgentNotification>) {
        let (tx, rx) = mpsc::channel(config.notification_queue_depth.max(1));
        let api = |flavor: Flavor| {
            AgentRpcApi::new(flavor, config.topics.for_flavor(flavor), &config.rpc_version, tx.clone())
        };

        let channels = Self {
            ipsec: api(Flavor::Ipsec),
            pptp: api(Flavor::Pptp),
            openvpn: api(Flavor::OpenVpn),
        };
        (channels, rx)
    }

    /// Agent API for `flavor`
    pub fn for_flavor(&self, flavor: Flavor) -> &AgentRpcApi {
        match flavor {
            Flavor::Ipsec => &self.ipsec,
            Flavor::Pptp => &self.pptp,
            Flavor::OpenVpn => &self.openvpn,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential() -> PptpCredential {
        PptpCredential {
            id: "cred-1".to_string(),
            tenant_id: "tenant-1".to_string(),
            username: "alice".to_string(),
            password: "secret".to_string(),
            admin_state_up: true,
        }
    }

    #[tokio::test]
    async fn test_notification_fields() {
        let (channels, mut rx) = AgentChannels::new(&DriverConfig::default());
        let ctx = RequestContext::admin();

        channels.ipsec.vpnservice_updated(&ctx, "router-1", None).await.unwrap();

        let n = rx.recv().await.unwrap();
        assert_eq!(n.flavor, Flavor::Ipsec);
        assert_eq!(n.topic, "ipsec_agent");
        assert_eq!(n.version, "1.0");
        assert_eq!(n.method, VPNSERVICE_UPDATED);
        assert_eq!(n.router_id, "router-1");
        assert_eq!(n.request_id, ctx.request_id);
        assert!(n.payload.is_none());
    }

    #[tokio::test]
    async fn test_channels_route_by_flavor() {
        let (channels, mut rx) = AgentChannels::new(&DriverConfig::default());
        let ctx = RequestContext::admin();

        for flavor in Flavor::ALL {
            channels.for_flavor(flavor).vpnservice_updated(&ctx, "router-1", None).await.unwrap();
        }

        let topics: Vec<String> = [rx.recv().await, rx.recv().await, rx.recv().await]
            .into_iter()
            .map(|n| n.unwrap().topic)
            .collect();
        assert_eq!(topics, vec!["ipsec_agent", "pptp_agent", "openvpn_agent"]);
    }

    #[tokio::test]
    async fn test_payload_serialization() {
        let (channels, mut rx) = AgentChannels::new(&DriverConfig::default());
        let ctx = RequestContext::admin();

        channels.pptp
            .vpnservice_updated(&ctx, "router-1", Some(NotificationPayload::Credential(credential())))
            .await
            .unwrap();

        let value = serde_json::to_value(rx.recv().await.unwrap()).unwrap();
        assert_eq!(value["payload"]["credential"]["username"], "alice");
        assert_eq!(value["flavor"], "pptp");
    }

    #[tokio::test]
    async fn test_closed_channel_is_an_error() {
        let (channels, rx) = AgentChannels::new(&DriverConfig::default());
        drop(rx);

        let err = channels.openvpn
            .vpnservice_updated(&RequestContext::admin(), "router-1", None)
            .await
            .unwrap_err();
        assert!(matches!(err, VpnSyncError::ChannelClosed { ref topic } if topic == "openvpn_agent"));
    }
}
