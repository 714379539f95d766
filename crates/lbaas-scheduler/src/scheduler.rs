//! AgentScheduler — binds root load balancers to agents.
//!
//! Selection is deterministic: the first eligible candidate, ordered by
//! agent id. There is no load-based scoring, so callers must not assume
//! load balancers spread across the fleet.

use lbaas_state::{Agent, StateStore};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::directory::AgentDirectory;
use crate::error::{SchedulerError, SchedulerResult};

/// Outcome of one dead-agent scrub.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScrubReport {
    /// Disabled or stale agents found in the scrubbed environment.
    pub dead_agents: Vec<String>,
    /// Bindings moved to a replacement agent.
    pub rebound: u32,
}

/// Treat an empty environment the same as no environment.
fn normalize(environment: Option<&str>) -> Option<&str> {
    environment.filter(|env| !env.is_empty())
}

#[derive(Clone)]
pub struct AgentScheduler {
    directory: AgentDirectory,
    state: StateStore,
}

impl AgentScheduler {
    pub fn new(directory: AgentDirectory, state: StateStore) -> Self {
        Self { directory, state }
    }

    pub fn directory(&self) -> &AgentDirectory {
        &self.directory
    }

    /// Return the agent hosting `loadbalancer_id`, binding it first if needed.
    ///
    /// An existing binding to an active agent is returned as is. A binding
    /// to a disabled or dead agent is rebound before being returned. With no
    /// binding, the first eligible candidate is bound and returned.
    pub fn schedule(
        &self,
        loadbalancer_id: &str,
        environment: Option<&str>,
    ) -> SchedulerResult<Agent> {
        let environment = normalize(environment);

        if let Some(agent) = self.hosting_agent(loadbalancer_id, environment)? {
            debug!(%loadbalancer_id, agent_id = %agent.id, "load balancer already hosted");
            return Ok(agent);
        }

        let candidates = self.eligible_candidates(environment)?;
        let chosen = &candidates[0];
        let (binding, created) = self.state.bind_if_absent(loadbalancer_id, &chosen.id)?;
        if created {
            info!(%loadbalancer_id, agent_id = %chosen.id, host = %chosen.host, "load balancer scheduled");
            return Ok(chosen.clone());
        }

        // Another caller bound it between our lookup and our insert.
        debug!(%loadbalancer_id, agent_id = %binding.agent_id, "concurrent binding observed");
        self.directory
            .get_agent(&binding.agent_id)?
            .ok_or(SchedulerError::AgentNotFound(binding.agent_id))
    }

    /// Return the agent hosting an already bound load balancer.
    ///
    /// Never creates a binding. A dead or disabled host is rebound first.
    pub fn resolve(
        &self,
        loadbalancer_id: &str,
        environment: Option<&str>,
    ) -> SchedulerResult<Agent> {
        self.hosting_agent(loadbalancer_id, normalize(environment))?
            .ok_or_else(|| SchedulerError::NotBound(loadbalancer_id.to_string()))
    }

    /// Move every binding held by `dead_agent_id` to the first eligible
    /// replacement in `environment`.
    ///
    /// Returns `None` when no replacement exists or when the dead agent
    /// belongs to another environment; the bindings are left untouched
    /// and a later scrub retries.
    pub fn rebind(
        &self,
        dead_agent_id: &str,
        environment: Option<&str>,
    ) -> SchedulerResult<Option<Agent>> {
        Ok(self.rebind_counted(dead_agent_id, normalize(environment))?.0)
    }

    fn rebind_counted(
        &self,
        dead_agent_id: &str,
        environment: Option<&str>,
    ) -> SchedulerResult<(Option<Agent>, u32)> {
        if let Some(dead) = self.directory.get_agent(dead_agent_id)? {
            if dead.environment() != environment {
                warn!(
                    %dead_agent_id,
                    agent_environment = dead.environment().unwrap_or(""),
                    requested = environment.unwrap_or(""),
                    "refusing to rebind agent from another environment"
                );
                return Ok((None, 0));
            }
        }

        let replacement = self
            .candidates(environment)?
            .into_iter()
            .find(|a| a.id != dead_agent_id);
        let Some(replacement) = replacement else {
            warn!(%dead_agent_id, "no replacement agent available, bindings left in place");
            return Ok((None, 0));
        };

        let moved = self.state.rebind_agent(dead_agent_id, &replacement.id)?;
        info!(%dead_agent_id, replacement = %replacement.id, moved, "rebound load balancers");
        Ok((Some(replacement), moved))
    }

    /// Rebind the load balancers of every disabled or stale agent in
    /// `environment`.
    ///
    /// Agents without bindings are reported but not rebound, so a second run
    /// with no state change in between moves nothing.
    pub fn scrub_dead_agents(&self, environment: Option<&str>) -> SchedulerResult<ScrubReport> {
        let environment = normalize(environment);
        let mut report = ScrubReport::default();

        for agent in self.directory.list_agents(None)? {
            if agent.environment() != environment || self.directory.is_active(&agent) {
                continue;
            }
            debug!(
                agent_id = %agent.id,
                admin_state_up = agent.admin_state_up,
                heartbeat = agent.heartbeat_timestamp,
                "dead agent found"
            );
            if !self.state.list_bindings_for_agent(&agent.id)?.is_empty() {
                let (_, moved) = self.rebind_counted(&agent.id, environment)?;
                report.rebound += moved;
            }
            report.dead_agents.push(agent.id);
        }

        if !report.dead_agents.is_empty() {
            info!(dead = report.dead_agents.len(), rebound = report.rebound, "scrub finished");
        }
        Ok(report)
    }

    /// Live, enabled agents whose environment tag matches exactly, ordered
    /// by id.
    pub fn candidates(&self, environment: Option<&str>) -> SchedulerResult<Vec<Agent>> {
        let environment = normalize(environment);
        Ok(self
            .directory
            .list_agents(Some(true))?
            .into_iter()
            .filter(|a| a.environment() == environment)
            .collect())
    }

    /// Ids of the load balancers bound to `agent_id`.
    pub fn list_loadbalancers_on_agent(&self, agent_id: &str) -> SchedulerResult<Vec<String>> {
        Ok(self
            .state
            .list_bindings_for_agent(agent_id)?
            .into_iter()
            .map(|b| b.loadbalancer_id)
            .collect())
    }

    /// The active agent behind an existing binding, after rebinding a dead one.
    ///
    /// Fails with the exhaustion error only when `environment` has no
    /// candidate to take over.
    fn hosting_agent(
        &self,
        loadbalancer_id: &str,
        environment: Option<&str>,
    ) -> SchedulerResult<Option<Agent>> {
        let Some(binding) = self.state.get_binding(loadbalancer_id)? else {
            return Ok(None);
        };

        if let Some(agent) = self.directory.get_agent(&binding.agent_id)? {
            if self.directory.is_active(&agent) {
                return Ok(Some(agent));
            }
        }

        warn!(%loadbalancer_id, agent_id = %binding.agent_id, "bound agent is not active, rebinding");
        if let Some(replacement) = self.rebind_counted(&binding.agent_id, environment)?.0 {
            return Ok(Some(replacement));
        }

        // The dead agent may sit in another environment, which the bulk
        // rebind refuses. Move only this load balancer into the requested one.
        let replacement = self
            .candidates(environment)?
            .into_iter()
            .find(|a| a.id != binding.agent_id);
        let Some(replacement) = replacement else {
            return Err(self.exhaustion_error(environment)?);
        };
        let repointed =
            self.state
                .repoint_binding(loadbalancer_id, &binding.agent_id, &replacement.id)?;
        // Deleted under us; the caller treats it as never bound.
        let Some(current) = repointed else {
            return Ok(None);
        };
        if current.agent_id == replacement.id {
            info!(
                %loadbalancer_id,
                dead_agent_id = %binding.agent_id,
                replacement = %replacement.id,
                "load balancer moved into requested environment"
            );
            return Ok(Some(replacement));
        }
        debug!(%loadbalancer_id, agent_id = %current.agent_id, "concurrent rebind observed");
        self.directory
            .get_agent(&current.agent_id)?
            .map(Some)
            .ok_or(SchedulerError::AgentNotFound(current.agent_id))
    }

    /// Candidates for a new binding, or the error explaining why there are none.
    fn eligible_candidates(&self, environment: Option<&str>) -> SchedulerResult<Vec<Agent>> {
        let candidates = self.candidates(environment)?;
        if candidates.is_empty() {
            return Err(self.exhaustion_error(environment)?);
        }
        Ok(candidates)
    }

    fn exhaustion_error(&self, environment: Option<&str>) -> SchedulerResult<SchedulerError> {
        if self.directory.list_agents(Some(true))?.is_empty() {
            warn!("no active lbaas agents");
            Ok(SchedulerError::NoActiveAgent)
        } else {
            warn!(environment = environment.unwrap_or(""), "no eligible lbaas agent");
            Ok(SchedulerError::NoEligibleAgent {
                environment: environment.map(str::to_string),
            })
        }
    }
}
