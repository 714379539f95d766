//! Queries and updates agents make against the controller.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use lbaas_core::{
    Entity, HealthMonitor, LoadBalancer, Member, OperatingStatus, ProvisioningStatus,
};
use lbaas_state::Agent;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::driver::LbaasDriver;
use crate::error::DriverResult;

/// Addressing of one load balancer, as agents see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadBalancerAddress {
    pub id: String,
    pub vip_subnet_id: String,
    pub vip_address: Option<String>,
    pub vip_port_id: Option<String>,
}

/// Member operating status per load balancer id, then per member id.
pub type MemberStatusMap = BTreeMap<String, BTreeMap<String, OperatingStatus>>;

#[derive(Clone)]
pub struct ControllerCallbacks {
    driver: Arc<LbaasDriver>,
}

impl ControllerCallbacks {
    pub fn new(driver: Arc<LbaasDriver>) -> Self {
        Self { driver }
    }

    /// Record a status change an agent observed on a member.
    ///
    /// Returns `false` when the member is unknown or being deleted; a
    /// PENDING_DELETE member keeps its status until its delete completes.
    pub fn update_member_status(
        &self,
        member_id: &str,
        provisioning: Option<ProvisioningStatus>,
        operating: Option<OperatingStatus>,
    ) -> DriverResult<bool> {
        let state = self.driver.state();
        let Some(member) = state.get_entity::<Member>(member_id)? else {
            debug!(%member_id, "status update for unknown member");
            return Ok(false);
        };
        if member.provisioning_status == ProvisioningStatus::PendingDelete {
            debug!(%member_id, "ignoring status update for member pending delete");
            return Ok(false);
        }

        let updated = state.update_entity::<Member>(member_id, |m| {
            if let Some(status) = provisioning {
                m.set_provisioning_status(status);
            }
            if let Some(status) = operating {
                m.set_operating_status(status);
            }
        })?;
        Ok(updated.is_some())
    }

    pub fn get_loadbalancer_ids(&self) -> DriverResult<Vec<LoadBalancerAddress>> {
        let lbs = self.driver.state().list_entities::<LoadBalancer>()?;
        Ok(lbs
            .into_iter()
            .map(|lb| LoadBalancerAddress {
                id: lb.id,
                vip_subnet_id: lb.vip_subnet_id,
                vip_address: lb.vip_address,
                vip_port_id: lb.vip_port_id,
            })
            .collect())
    }

    /// Active agents in the driver's environment.
    pub fn get_active_agents(&self) -> DriverResult<Vec<Agent>> {
        Ok(self
            .driver
            .scheduler()
            .candidates(self.driver.environment())?)
    }

    /// Operating status of every monitored member on the agent at `host`.
    ///
    /// Only members of pools with a health monitor are reported. Load
    /// balancers with no such member are left out of the map.
    pub fn get_members_status_on_agent(&self, host: &str) -> DriverResult<MemberStatusMap> {
        let mut statuses = MemberStatusMap::new();
        let Some(agent) = self
            .get_active_agents()?
            .into_iter()
            .find(|a| a.host == host)
        else {
            debug!(%host, "no active agent on host");
            return Ok(statuses);
        };

        let state = self.driver.state();
        let scheduler = self.driver.scheduler();
        for lb_id in scheduler.list_loadbalancers_on_agent(&agent.id)? {
            let monitored: BTreeSet<String> = state
                .list_entities_for_loadbalancer::<HealthMonitor>(&lb_id)?
                .into_iter()
                .map(|hm| hm.pool_id)
                .collect();
            let members: BTreeMap<String, OperatingStatus> = state
                .list_entities_for_loadbalancer::<Member>(&lb_id)?
                .into_iter()
                .filter(|m| monitored.contains(&m.pool_id))
                .map(|m| (m.id, m.operating_status))
                .collect();
            if !members.is_empty() {
                statuses.insert(lb_id, members);
            }
        }
        Ok(statuses)
    }

    /// Agent-triggered scrub of the driver's environment.
    pub fn scrub_dead_agents(&self) -> bool {
        match self
            .driver
            .scheduler()
            .scrub_dead_agents(self.driver.environment())
        {
            Ok(report) => {
                info!(dead = report.dead_agents.len(), rebound = report.rebound, "scrub requested by agent");
                true
            }
            Err(e) => {
                error!(error = %e, "agent-requested scrub failed");
                false
            }
        }
    }
}
