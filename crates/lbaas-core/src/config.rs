//! lbaas.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_AGENT_TOPIC: &str = "array-lbaasv2-process-on-agent";
pub const DEFAULT_CONTROLLER_TOPIC: &str = "array-lbaasv2-process-on-controller";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LbaasConfig {
    pub driver: DriverConfig,
    pub rpc: RpcConfig,
    pub state: StateConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Affinity tag this controller schedules into. Unset means untagged agents only.
    pub environment: Option<String>,
    /// Seconds without a heartbeat before an agent counts as down.
    pub agent_down_time: u64,
    /// Seconds between dead-agent scrubs.
    pub scrub_interval: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            environment: None,
            agent_down_time: 75,
            scrub_interval: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub agent_topic: String,
    pub controller_topic: String,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            agent_topic: DEFAULT_AGENT_TOPIC.to_string(),
            controller_topic: DEFAULT_CONTROLLER_TOPIC.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub data_dir: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/lbaas"),
        }
    }
}

impl LbaasConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: LbaasConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Reject settings the controller loops cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.driver.scrub_interval == 0 {
            anyhow::bail!("driver.scrub_interval must be at least 1 second");
        }
        Ok(())
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Path of the redb database file under the configured data dir.
    pub fn db_path(&self) -> PathBuf {
        self.state.data_dir.join("lbaas.redb")
    }

    /// The configured environment, with an empty string treated as untagged.
    pub fn environment(&self) -> Option<&str> {
        self.driver.environment.as_deref().filter(|e| !e.is_empty())
    }
}
