//! Controller endpoint — everything agents send to the controller topic.
//!
//! One topic carries three kinds of traffic: completion reports, periodic
//! agent state reports, and callback queries. Reports are fire-and-forget;
//! queries carry a oneshot reply channel the endpoint answers on.

use std::sync::Arc;

use lbaas_core::{OperatingStatus, ProvisioningStatus};
use lbaas_rpc::{CompletionMessage, CompletionReporter, RpcError, TopicBus};
use lbaas_state::Agent;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::callbacks::{ControllerCallbacks, LoadBalancerAddress, MemberStatusMap};
use crate::dispatcher::CompletionDispatcher;
use crate::driver::LbaasDriver;
use crate::error::DriverResult;

/// Periodic liveness report from the agent on `host`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStateReport {
    pub host: String,
    #[serde(default)]
    pub configurations: serde_json::Value,
    pub admin_state_up: bool,
}

/// Where the endpoint sends a query's answer.
pub type Reply<T> = oneshot::Sender<DriverResult<T>>;

#[derive(Debug)]
pub enum ControllerCall {
    UpdateMemberStatus {
        member_id: String,
        provisioning: Option<ProvisioningStatus>,
        operating: Option<OperatingStatus>,
        reply: Reply<bool>,
    },
    GetLoadBalancerIds {
        reply: Reply<Vec<LoadBalancerAddress>>,
    },
    GetActiveAgents {
        reply: Reply<Vec<Agent>>,
    },
    GetMembersStatusOnAgent {
        host: String,
        reply: Reply<MemberStatusMap>,
    },
    ScrubDeadAgents {
        reply: Reply<bool>,
    },
}

impl ControllerCall {
    fn name(&self) -> &'static str {
        match self {
            ControllerCall::UpdateMemberStatus { .. } => "update_member_status",
            ControllerCall::GetLoadBalancerIds { .. } => "get_loadbalancer_ids",
            ControllerCall::GetActiveAgents { .. } => "get_active_agents",
            ControllerCall::GetMembersStatusOnAgent { .. } => "get_members_status_on_agent",
            ControllerCall::ScrubDeadAgents { .. } => "scrub_dead_agents",
        }
    }
}

/// A message on the controller topic.
#[derive(Debug)]
pub enum ControllerMessage {
    Completion(CompletionMessage),
    StateReport(AgentStateReport),
    Call(ControllerCall),
}

impl From<CompletionMessage> for ControllerMessage {
    fn from(message: CompletionMessage) -> Self {
        ControllerMessage::Completion(message)
    }
}

/// Applies controller-topic messages to the driver.
pub struct ControllerEndpoint {
    driver: Arc<LbaasDriver>,
    dispatcher: CompletionDispatcher,
    callbacks: ControllerCallbacks,
}

impl ControllerEndpoint {
    pub fn new(driver: Arc<LbaasDriver>) -> Self {
        Self {
            dispatcher: CompletionDispatcher::new(Arc::clone(&driver)),
            callbacks: ControllerCallbacks::new(Arc::clone(&driver)),
            driver,
        }
    }

    /// Apply one message. Never fails; problems are logged or sent back
    /// on the query's reply channel.
    pub fn handle(&self, message: ControllerMessage) {
        match message {
            ControllerMessage::Completion(report) => self.dispatcher.handle(report),
            ControllerMessage::StateReport(report) => self.record_state(report),
            ControllerMessage::Call(call) => self.answer(call),
        }
    }

    fn record_state(&self, report: AgentStateReport) {
        let directory = self.driver.scheduler().directory();
        if let Err(e) =
            directory.report_state(&report.host, report.configurations, report.admin_state_up)
        {
            warn!(host = %report.host, error = %e, "failed to record agent state");
        }
    }

    fn answer(&self, call: ControllerCall) {
        let name = call.name();
        debug!(call = name, "answering agent call");
        let delivered = match call {
            ControllerCall::UpdateMemberStatus {
                member_id,
                provisioning,
                operating,
                reply,
            } => reply
                .send(self.callbacks.update_member_status(&member_id, provisioning, operating))
                .is_ok(),
            ControllerCall::GetLoadBalancerIds { reply } => {
                reply.send(self.callbacks.get_loadbalancer_ids()).is_ok()
            }
            ControllerCall::GetActiveAgents { reply } => {
                reply.send(self.callbacks.get_active_agents()).is_ok()
            }
            ControllerCall::GetMembersStatusOnAgent { host, reply } => reply
                .send(self.callbacks.get_members_status_on_agent(&host))
                .is_ok(),
            ControllerCall::ScrubDeadAgents { reply } => {
                reply.send(Ok(self.callbacks.scrub_dead_agents())).is_ok()
            }
        };
        if !delivered {
            debug!(call = name, "caller went away before the reply");
        }
    }
}

/// Agent-side handle onto the controller topic.
#[derive(Clone)]
pub struct ControllerClient {
    bus: TopicBus<ControllerMessage>,
    topic: String,
}

impl ControllerClient {
    pub fn new(bus: TopicBus<ControllerMessage>, topic: impl Into<String>) -> Self {
        Self {
            bus,
            topic: topic.into(),
        }
    }

    /// Completion reporter publishing on the same topic.
    pub fn reporter(&self) -> CompletionReporter<ControllerMessage> {
        CompletionReporter::new(self.bus.clone(), self.topic.clone())
    }

    /// Send a heartbeat; the first one registers the agent.
    pub fn report_state(
        &self,
        host: &str,
        configurations: serde_json::Value,
        admin_state_up: bool,
    ) -> DriverResult<()> {
        let report = AgentStateReport {
            host: host.to_string(),
            configurations,
            admin_state_up,
        };
        self.bus
            .publish(&self.topic, ControllerMessage::StateReport(report))?;
        Ok(())
    }

    pub async fn update_member_status(
        &self,
        member_id: &str,
        provisioning: Option<ProvisioningStatus>,
        operating: Option<OperatingStatus>,
    ) -> DriverResult<bool> {
        let member_id = member_id.to_string();
        self.call(|reply| ControllerCall::UpdateMemberStatus {
            member_id,
            provisioning,
            operating,
            reply,
        })
        .await
    }

    pub async fn get_loadbalancer_ids(&self) -> DriverResult<Vec<LoadBalancerAddress>> {
        self.call(|reply| ControllerCall::GetLoadBalancerIds { reply })
            .await
    }

    pub async fn get_active_agents(&self) -> DriverResult<Vec<Agent>> {
        self.call(|reply| ControllerCall::GetActiveAgents { reply })
            .await
    }

    pub async fn get_members_status_on_agent(&self, host: &str) -> DriverResult<MemberStatusMap> {
        let host = host.to_string();
        self.call(|reply| ControllerCall::GetMembersStatusOnAgent { host, reply })
            .await
    }

    pub async fn scrub_dead_agents(&self) -> DriverResult<bool> {
        self.call(|reply| ControllerCall::ScrubDeadAgents { reply })
            .await
    }

    async fn call<T>(&self, build: impl FnOnce(Reply<T>) -> ControllerCall) -> DriverResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.bus
            .publish(&self.topic, ControllerMessage::Call(build(reply_tx)))?;
        reply_rx
            .await
            .map_err(|_| RpcError::ChannelClosed(self.topic.clone()))?
    }
}
