//! Agent directory — tracks agent registration and liveness.
//!
//! Agents report their state periodically. An agent whose last report is
//! older than `agent_down_time` is down; an agent that is down or
//! administratively disabled is not active and never receives new work.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use lbaas_core::agent_id_for_host;
use lbaas_state::{Agent, StateResult, StateStore};
use tracing::{debug, info};

use crate::error::{SchedulerError, SchedulerResult};

/// Agent type recorded for every agent registered through the directory.
pub const AGENT_TYPE_LOADBALANCER: &str = "Loadbalancerv2 agent";

/// Persisted view of the agent fleet.
#[derive(Clone)]
pub struct AgentDirectory {
    state: StateStore,
    /// Heartbeat age after which an agent counts as down.
    agent_down_time: Duration,
}

impl AgentDirectory {
    pub fn new(state: StateStore) -> Self {
        Self {
            state,
            agent_down_time: Duration::from_secs(75),
        }
    }

    /// Set the heartbeat staleness threshold.
    pub fn with_agent_down_time(mut self, agent_down_time: Duration) -> Self {
        self.agent_down_time = agent_down_time;
        self
    }

    pub fn agent_down_time(&self) -> Duration {
        self.agent_down_time
    }

    /// Record a state report from the agent on `host`.
    ///
    /// The first report registers the agent with `admin_state_up`; later
    /// reports refresh the heartbeat and configuration but keep whatever
    /// admin state an operator has set since.
    pub fn report_state(
        &self,
        host: &str,
        configurations: serde_json::Value,
        admin_state_up: bool,
    ) -> StateResult<Agent> {
        let agent_id = agent_id_for_host(host);
        let now = epoch_secs();

        let (agent, inserted) = self.state.upsert_agent(
            &agent_id,
            || Agent {
                id: agent_id.clone(),
                host: host.to_string(),
                agent_type: AGENT_TYPE_LOADBALANCER.to_string(),
                admin_state_up,
                heartbeat_timestamp: now,
                started_at: now,
                configurations: configurations.clone(),
            },
            |existing| {
                existing.heartbeat_timestamp = now;
                existing.configurations = configurations.clone();
            },
        )?;
        if inserted {
            info!(%agent_id, %host, admin_state_up, "agent registered");
        } else {
            debug!(%agent_id, %host, "agent heartbeat");
        }
        Ok(agent)
    }

    /// Administratively enable or disable an agent.
    pub fn set_admin_state(&self, agent_id: &str, admin_state_up: bool) -> SchedulerResult<Agent> {
        let agent = self
            .state
            .update_agent(agent_id, |a| a.admin_state_up = admin_state_up)?
            .ok_or_else(|| SchedulerError::AgentNotFound(agent_id.to_string()))?;
        info!(%agent_id, admin_state_up, "agent admin state changed");
        Ok(agent)
    }

    pub fn get_agent(&self, agent_id: &str) -> StateResult<Option<Agent>> {
        self.state.get_agent(agent_id)
    }

    /// List agents ordered by id.
    ///
    /// `None` returns every agent, `Some(true)` only live-and-enabled ones,
    /// `Some(false)` only the rest.
    pub fn list_agents(&self, active: Option<bool>) -> StateResult<Vec<Agent>> {
        let agents = self.state.list_agents()?;
        Ok(match active {
            None => agents,
            Some(want) => agents
                .into_iter()
                .filter(|a| self.is_active(a) == want)
                .collect(),
        })
    }

    /// Whether a heartbeat taken at `heartbeat_timestamp` is too old.
    pub fn is_agent_down(&self, heartbeat_timestamp: u64) -> bool {
        epoch_secs().saturating_sub(heartbeat_timestamp) > self.agent_down_time.as_secs()
    }

    /// Live and administratively enabled.
    pub fn is_active(&self, agent: &Agent) -> bool {
        agent.admin_state_up && !self.is_agent_down(agent.heartbeat_timestamp)
    }
}

pub(crate) fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
