//! Both ends of the dispatch channel.
//!
//! [`AgentNotifier`] is the seam the lifecycle managers cast through;
//! [`BusNotifier`] implements it over the in-process [`TopicBus`].
//! [`CompletionReporter`] is what an agent uses to report outcomes back.

use lbaas_core::{Entity, EntityKind, LoadBalancer};
use tokio::sync::mpsc;
use tracing::debug;

use crate::bus::TopicBus;
use crate::error::{RpcError, RpcResult};
use crate::message::{AgentMessage, CompletionEvent, CompletionMessage, agent_topic};

/// Casts operations to the agent on a host. Fire-and-forget.
pub trait AgentNotifier: Send + Sync {
    fn cast(&self, host: &str, message: AgentMessage) -> RpcResult<()>;
}

/// Casts onto `{base_topic}.{host}` topics of a [`TopicBus`].
#[derive(Clone)]
pub struct BusNotifier {
    bus: TopicBus<AgentMessage>,
    base_topic: String,
}

impl BusNotifier {
    pub fn new(bus: TopicBus<AgentMessage>, base_topic: impl Into<String>) -> Self {
        Self {
            bus,
            base_topic: base_topic.into(),
        }
    }

    /// Subscribe as the agent on `host`.
    pub fn subscribe_agent(&self, host: &str) -> mpsc::UnboundedReceiver<AgentMessage> {
        self.bus.subscribe(&agent_topic(&self.base_topic, host))
    }
}

impl AgentNotifier for BusNotifier {
    fn cast(&self, host: &str, message: AgentMessage) -> RpcResult<()> {
        let topic = agent_topic(&self.base_topic, host);
        debug!(%topic, method = %message.method, "casting to agent");
        self.bus.publish(&topic, message)
    }
}

/// Agent-side sender of completion reports.
///
/// `M` is the controller topic's message type; a topic that carries more
/// than completions wraps each report through `From<CompletionMessage>`.
pub struct CompletionReporter<M = CompletionMessage> {
    bus: TopicBus<M>,
    topic: String,
}

impl<M> Clone for CompletionReporter<M> {
    fn clone(&self) -> Self {
        Self {
            bus: self.bus.clone(),
            topic: self.topic.clone(),
        }
    }
}

impl<M: From<CompletionMessage> + Send + 'static> CompletionReporter<M> {
    pub fn new(bus: TopicBus<M>, topic: impl Into<String>) -> Self {
        Self {
            bus,
            topic: topic.into(),
        }
    }

    pub fn report(&self, message: CompletionMessage) -> RpcResult<()> {
        debug!(topic = %self.topic, kind = %message.kind, event = %message.event, "reporting completion");
        self.bus.publish(&self.topic, M::from(message))
    }

    /// Report that the last operation on `entity` succeeded.
    pub fn success<E: Entity>(&self, entity: &E) -> RpcResult<()> {
        self.report(CompletionMessage::new(E::KIND, CompletionEvent::Success, encode(entity)?))
    }

    /// Report a successful load balancer create, carrying the allocated VIP.
    pub fn loadbalancer_created(&self, lb: &LoadBalancer) -> RpcResult<()> {
        let message =
            CompletionMessage::new(EntityKind::LoadBalancer, CompletionEvent::Success, encode(lb)?)
                .with_lb_create(true);
        self.report(message)
    }

    /// Report that `entity` is gone from the agent.
    pub fn deleted<E: Entity>(&self, entity: &E) -> RpcResult<()> {
        self.report(CompletionMessage::new(E::KIND, CompletionEvent::Delete, encode(entity)?))
    }

    pub fn failed<E: Entity>(&self, entity: &E) -> RpcResult<()> {
        self.report(CompletionMessage::new(E::KIND, CompletionEvent::Fail, encode(entity)?))
    }
}

fn encode<E: Entity>(entity: &E) -> RpcResult<serde_json::Value> {
    serde_json::to_value(entity).map_err(|e| RpcError::Encode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lbaas_core::Member;
    use serde_json::json;

    #[test]
    fn bus_notifier_casts_to_host_topic() {
        let notifier = BusNotifier::new(TopicBus::new(), "lbaas-agent");
        let mut rx = notifier.subscribe_agent("node-1");

        notifier
            .cast("node-1", AgentMessage::create(EntityKind::Pool, json!({"id": "p-1"})))
            .unwrap();
        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.method, "create_pool");

        let err = notifier
            .cast("node-2", AgentMessage::create(EntityKind::Pool, json!({})))
            .unwrap_err();
        assert!(matches!(err, RpcError::NoRoute(topic) if topic == "lbaas-agent.node-2"));
    }

    #[test]
    fn reporter_tags_kind_and_event() {
        let bus: TopicBus<CompletionMessage> = TopicBus::new();
        let mut rx = bus.subscribe("controller");
        let reporter = CompletionReporter::new(bus, "controller");

        let member = Member {
            id: "m-1".into(),
            loadbalancer_id: "lb-1".into(),
            pool_id: "p-1".into(),
            ..Default::default()
        };
        reporter.failed(&member).unwrap();
        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.kind, "member");
        assert_eq!(msg.event, "fail");
        assert_eq!(msg.obj["id"], "m-1");

        let lb = LoadBalancer {
            id: "lb-1".into(),
            ..Default::default()
        };
        reporter.loadbalancer_created(&lb).unwrap();
        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.kind, "loadbalancer");
        assert!(msg.lb_create);
        assert!(!msg.delete);
    }
}
