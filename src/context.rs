//! Request context passed to every collaborator call

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    /// `req-<uuid>`, stamped on outbound notifications
    pub request_id: String,
    pub tenant_id: Option<String>,
    pub is_admin: bool,
    pub timestamp: DateTime<Utc>,
}

impl RequestContext {
    /// Context for a call made on behalf of a tenant
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            request_id: new_request_id(),
            tenant_id: Some(tenant_id.into()),
            is_admin: false,
            timestamp: Utc::now(),
        }
    }

    /// Administrative context, used by agent callbacks and tooling
    pub fn admin() -> Self {
        Self {
            request_id: new_request_id(),
            tenant_id: None,
            is_admin: true,
            timestamp: Utc::now(),
        }
    }
}

fn new_request_id() -> String {
    format!("req-{}", uuid::Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_ids_are_unique() {
        let a = RequestContext::admin();
        let b = RequestContext::new("tenant-1");
        assert!(a.request_id.starts_with("req-"));
        assert_ne!(a.request_id, b.request_id);
        assert!(a.is_admin);
        assert_eq!(b.tenant_id.as_deref(), Some("tenant-1"));
    }
}
