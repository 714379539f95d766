//! Core types shared by the LBaaS control plane crates.
//!
//! The entity model covers the seven configuration object kinds an agent
//! can realize (load balancers and everything hanging off them), their
//! provisioning and operating statuses, and the `lbaas.toml` config.

pub mod config;
pub mod entity;
pub mod status;

pub use config::{DEFAULT_AGENT_TOPIC, DEFAULT_CONTROLLER_TOPIC, LbaasConfig};
pub use entity::*;
pub use status::*;

use sha2::{Digest, Sha256};

/// Derive the stable agent identifier for a host.
///
/// An agent that restarts on the same host keeps its identity, so bindings
/// survive the restart.
pub fn agent_id_for_host(host: &str) -> String {
    let digest = Sha256::digest(host.as_bytes());
    format!("agent-{}", &hex::encode(digest)[..16])
}
