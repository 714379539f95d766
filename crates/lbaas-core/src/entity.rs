//! The seven entity kinds an agent realizes, and the tagged union over them.
//!
//! Only a [`LoadBalancer`] is ever bound to an agent. Every other kind
//! carries the id of its root load balancer and reaches its agent through
//! that binding.

use crate::status::{OperatingStatus, ProvisioningStatus};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Kinds ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    LoadBalancer,
    Listener,
    Pool,
    Member,
    HealthMonitor,
    L7Policy,
    L7Rule,
}

impl EntityKind {
    pub const ALL: [EntityKind; 7] = [
        EntityKind::LoadBalancer,
        EntityKind::Listener,
        EntityKind::Pool,
        EntityKind::Member,
        EntityKind::HealthMonitor,
        EntityKind::L7Policy,
        EntityKind::L7Rule,
    ];

    /// Tag used in completion reports and as the storage key prefix.
    pub fn wire_tag(&self) -> &'static str {
        match self {
            EntityKind::LoadBalancer => "loadbalancer",
            EntityKind::Listener => "listener",
            EntityKind::Pool => "pool",
            EntityKind::Member => "member",
            EntityKind::HealthMonitor => "hm",
            EntityKind::L7Policy => "l7policy",
            EntityKind::L7Rule => "l7rule",
        }
    }

    /// Suffix of the agent-side method names (`create_health_monitor`, ...).
    pub fn method_suffix(&self) -> &'static str {
        match self {
            EntityKind::HealthMonitor => "health_monitor",
            other => other.wire_tag(),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_tag())
    }
}

// ── Entity trait ───────────────────────────────────────────────

/// Common surface of every persisted entity kind.
pub trait Entity: Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static {
    const KIND: EntityKind;

    fn id(&self) -> &str;
    /// Id of the root load balancer. A load balancer is its own root.
    fn loadbalancer_id(&self) -> &str;
    fn provisioning_status(&self) -> ProvisioningStatus;
    fn set_provisioning_status(&mut self, status: ProvisioningStatus);
    fn operating_status(&self) -> OperatingStatus;
    fn set_operating_status(&mut self, status: OperatingStatus);
    fn into_payload(self) -> EntityPayload;
}

macro_rules! impl_entity {
    ($ty:ident, $kind:ident, |$s:ident| $root:expr) => {
        impl Entity for $ty {
            const KIND: EntityKind = EntityKind::$kind;

            fn id(&self) -> &str {
                &self.id
            }

            fn loadbalancer_id(&self) -> &str {
                let $s = self;
                $root
            }

            fn provisioning_status(&self) -> ProvisioningStatus {
                self.provisioning_status
            }

            fn set_provisioning_status(&mut self, status: ProvisioningStatus) {
                self.provisioning_status = status;
            }

            fn operating_status(&self) -> OperatingStatus {
                self.operating_status
            }

            fn set_operating_status(&mut self, status: OperatingStatus) {
                self.operating_status = status;
            }

            fn into_payload(self) -> EntityPayload {
                EntityPayload::$kind(self)
            }
        }
    };
}

// ── Entities ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancer {
    pub id: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub vip_subnet_id: String,
    /// Virtual address allocated by the agent; known after create succeeds.
    #[serde(default)]
    pub vip_address: Option<String>,
    #[serde(default)]
    pub vip_port_id: Option<String>,
    #[serde(default)]
    pub provisioning_status: ProvisioningStatus,
    #[serde(default)]
    pub operating_status: OperatingStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Listener {
    pub id: String,
    pub loadbalancer_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub protocol_port: u16,
    #[serde(default)]
    pub connection_limit: Option<i64>,
    #[serde(default)]
    pub default_pool_id: Option<String>,
    #[serde(default)]
    pub provisioning_status: ProvisioningStatus,
    #[serde(default)]
    pub operating_status: OperatingStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    pub id: String,
    pub loadbalancer_id: String,
    #[serde(default)]
    pub listener_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub lb_algorithm: String,
    #[serde(default)]
    pub session_persistence: Option<String>,
    #[serde(default)]
    pub provisioning_status: ProvisioningStatus,
    #[serde(default)]
    pub operating_status: OperatingStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub loadbalancer_id: String,
    pub pool_id: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub protocol_port: u16,
    #[serde(default)]
    pub weight: u32,
    #[serde(default)]
    pub subnet_id: Option<String>,
    #[serde(default)]
    pub provisioning_status: ProvisioningStatus,
    #[serde(default)]
    pub operating_status: OperatingStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthMonitor {
    pub id: String,
    pub loadbalancer_id: String,
    pub pool_id: String,
    #[serde(rename = "type", default)]
    pub monitor_type: String,
    #[serde(default)]
    pub delay: u32,
    #[serde(default)]
    pub timeout: u32,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default)]
    pub http_method: Option<String>,
    #[serde(default)]
    pub url_path: Option<String>,
    #[serde(default)]
    pub expected_codes: Option<String>,
    #[serde(default)]
    pub provisioning_status: ProvisioningStatus,
    #[serde(default)]
    pub operating_status: OperatingStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct L7Policy {
    pub id: String,
    pub loadbalancer_id: String,
    pub listener_id: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub position: u32,
    #[serde(default)]
    pub redirect_pool_id: Option<String>,
    #[serde(default)]
    pub redirect_url: Option<String>,
    #[serde(default)]
    pub provisioning_status: ProvisioningStatus,
    #[serde(default)]
    pub operating_status: OperatingStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct L7Rule {
    pub id: String,
    pub loadbalancer_id: String,
    pub policy_id: String,
    #[serde(rename = "type", default)]
    pub rule_type: String,
    #[serde(default)]
    pub compare_type: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub invert: bool,
    #[serde(default)]
    pub provisioning_status: ProvisioningStatus,
    #[serde(default)]
    pub operating_status: OperatingStatus,
}

impl_entity!(LoadBalancer, LoadBalancer, |s| &s.id);
impl_entity!(Listener, Listener, |s| &s.loadbalancer_id);
impl_entity!(Pool, Pool, |s| &s.loadbalancer_id);
impl_entity!(Member, Member, |s| &s.loadbalancer_id);
impl_entity!(HealthMonitor, HealthMonitor, |s| &s.loadbalancer_id);
impl_entity!(L7Policy, L7Policy, |s| &s.loadbalancer_id);
impl_entity!(L7Rule, L7Rule, |s| &s.loadbalancer_id);

// ── Tagged union ───────────────────────────────────────────────

/// A decoded entity of any kind.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityPayload {
    LoadBalancer(LoadBalancer),
    Listener(Listener),
    Pool(Pool),
    Member(Member),
    HealthMonitor(HealthMonitor),
    L7Policy(L7Policy),
    L7Rule(L7Rule),
}

impl EntityPayload {
    /// Decode a raw JSON object into the structured form for `kind`.
    pub fn decode(kind: EntityKind, value: serde_json::Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            EntityKind::LoadBalancer => Self::LoadBalancer(serde_json::from_value(value)?),
            EntityKind::Listener => Self::Listener(serde_json::from_value(value)?),
            EntityKind::Pool => Self::Pool(serde_json::from_value(value)?),
            EntityKind::Member => Self::Member(serde_json::from_value(value)?),
            EntityKind::HealthMonitor => Self::HealthMonitor(serde_json::from_value(value)?),
            EntityKind::L7Policy => Self::L7Policy(serde_json::from_value(value)?),
            EntityKind::L7Rule => Self::L7Rule(serde_json::from_value(value)?),
        })
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Self::LoadBalancer(_) => EntityKind::LoadBalancer,
            Self::Listener(_) => EntityKind::Listener,
            Self::Pool(_) => EntityKind::Pool,
            Self::Member(_) => EntityKind::Member,
            Self::HealthMonitor(_) => EntityKind::HealthMonitor,
            Self::L7Policy(_) => EntityKind::L7Policy,
            Self::L7Rule(_) => EntityKind::L7Rule,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::LoadBalancer(e) => e.id(),
            Self::Listener(e) => e.id(),
            Self::Pool(e) => e.id(),
            Self::Member(e) => e.id(),
            Self::HealthMonitor(e) => e.id(),
            Self::L7Policy(e) => e.id(),
            Self::L7Rule(e) => e.id(),
        }
    }

    pub fn loadbalancer_id(&self) -> &str {
        match self {
            Self::LoadBalancer(e) => e.loadbalancer_id(),
            Self::Listener(e) => e.loadbalancer_id(),
            Self::Pool(e) => e.loadbalancer_id(),
            Self::Member(e) => e.loadbalancer_id(),
            Self::HealthMonitor(e) => e.loadbalancer_id(),
            Self::L7Policy(e) => e.loadbalancer_id(),
            Self::L7Rule(e) => e.loadbalancer_id(),
        }
    }
}
