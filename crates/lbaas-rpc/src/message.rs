//! Messages carried by the dispatch channel.

use lbaas_core::EntityKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Host-qualified topic an agent listens on.
pub fn agent_topic(base: &str, host: &str) -> String {
    format!("{base}.{host}")
}

// ── Controller → agent ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Delete,
    UpdateStats,
}

/// One operation for an agent to realize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    /// Agent-side method, e.g. `create_listener` or `update_loadbalancer_stats`.
    pub method: String,
    pub kind: EntityKind,
    pub operation: Operation,
    pub obj: serde_json::Value,
    /// Previous attributes, present on updates only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_obj: Option<serde_json::Value>,
}

impl AgentMessage {
    pub fn create(kind: EntityKind, obj: serde_json::Value) -> Self {
        Self::build(kind, Operation::Create, obj, None)
    }

    pub fn update(kind: EntityKind, old_obj: serde_json::Value, obj: serde_json::Value) -> Self {
        Self::build(kind, Operation::Update, obj, Some(old_obj))
    }

    pub fn delete(kind: EntityKind, obj: serde_json::Value) -> Self {
        Self::build(kind, Operation::Delete, obj, None)
    }

    /// Stats refresh; load balancers only.
    pub fn update_stats(obj: serde_json::Value) -> Self {
        Self::build(EntityKind::LoadBalancer, Operation::UpdateStats, obj, None)
    }

    fn build(
        kind: EntityKind,
        operation: Operation,
        obj: serde_json::Value,
        old_obj: Option<serde_json::Value>,
    ) -> Self {
        Self {
            method: method_name(kind, operation),
            kind,
            operation,
            obj,
            old_obj,
        }
    }
}

fn method_name(kind: EntityKind, operation: Operation) -> String {
    match operation {
        Operation::Create => format!("create_{}", kind.method_suffix()),
        Operation::Update => format!("update_{}", kind.method_suffix()),
        Operation::Delete => format!("delete_{}", kind.method_suffix()),
        Operation::UpdateStats => format!("update_{}_stats", kind.method_suffix()),
    }
}

// ── Agent → controller ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionEvent {
    Success,
    Delete,
    Fail,
}

impl CompletionEvent {
    pub fn wire_tag(&self) -> &'static str {
        match self {
            CompletionEvent::Success => "success",
            CompletionEvent::Delete => "delete",
            CompletionEvent::Fail => "fail",
        }
    }
}

impl fmt::Display for CompletionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_tag())
    }
}

/// Completion report as it arrives on the wire.
///
/// Tags stay strings here: a misbehaving agent can send anything, and the
/// dispatcher decides what is routable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionMessage {
    pub kind: String,
    pub event: String,
    #[serde(default)]
    pub obj: serde_json::Value,
    #[serde(default)]
    pub delete: bool,
    #[serde(default)]
    pub lb_create: bool,
}

impl CompletionMessage {
    pub fn new(kind: EntityKind, event: CompletionEvent, obj: serde_json::Value) -> Self {
        Self {
            kind: kind.wire_tag().to_string(),
            event: event.wire_tag().to_string(),
            obj,
            delete: false,
            lb_create: false,
        }
    }

    pub fn with_delete(mut self, delete: bool) -> Self {
        self.delete = delete;
        self
    }

    pub fn with_lb_create(mut self, lb_create: bool) -> Self {
        self.lb_create = lb_create;
        self
    }
}
