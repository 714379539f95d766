//! lbaas-rpc — one-way messaging between the controller and its agents.
//!
//! Controller → agent: [`AgentMessage`]s cast onto host-qualified topics
//! (`{agent_topic}.{host}`). Agent → controller: [`CompletionMessage`]s on
//! the controller topic. Delivery is fire-and-forget and at most once; no
//! reply is awaited and dropped messages are not retried.

pub mod bus;
pub mod error;
pub mod message;
pub mod notifier;

pub use bus::TopicBus;
pub use error::{RpcError, RpcResult};
pub use message::*;
pub use notifier::{AgentNotifier, BusNotifier, CompletionReporter};
