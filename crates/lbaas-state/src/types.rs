//! Persisted records for the LBaaS state store.
//!
//! Entity records live in `lbaas-core`; this module holds the records that
//! only the control plane itself owns.

use serde::{Deserialize, Serialize};

/// Unique identifier for an agent.
pub type AgentId = String;

// ── Agent ─────────────────────────────────────────────────────────

/// One agent process as seen by the directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    pub id: AgentId,
    /// Host the agent runs on; messages reach it on a host-qualified topic.
    pub host: String,
    pub agent_type: String,
    pub admin_state_up: bool,
    /// Unix timestamp of the last state report.
    pub heartbeat_timestamp: u64,
    pub started_at: u64,
    /// Free-form configuration reported by the agent.
    #[serde(default)]
    pub configurations: serde_json::Value,
}

impl Agent {
    /// The environment tag from the agent configuration, if any.
    ///
    /// A missing field, a non-string value, and an empty string all mean
    /// the agent is untagged.
    pub fn environment(&self) -> Option<&str> {
        self.configurations
            .get("environment")
            .and_then(serde_json::Value::as_str)
            .filter(|env| !env.is_empty())
    }
}

// ── Binding ───────────────────────────────────────────────────────

/// Assignment of a root load balancer to the agent that realizes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Binding {
    pub loadbalancer_id: String,
    pub agent_id: AgentId,
}

// ── VIP port ──────────────────────────────────────────────────────

/// Network port reserved for a load balancer's virtual address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VipPort {
    pub port_id: String,
    pub loadbalancer_id: String,
    pub vip_address: Option<String>,
    pub created_at: u64,
}
