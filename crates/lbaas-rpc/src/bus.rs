//! In-process topic bus.
//!
//! Each topic has at most one subscriber, backed by an unbounded tokio
//! channel. Publishing never blocks, so synchronous callers can cast
//! without a runtime; subscribers drain their receiver from async tasks.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{RpcError, RpcResult};

/// Routes messages of type `M` to the subscriber of a named topic.
pub struct TopicBus<M> {
    topics: Arc<RwLock<HashMap<String, mpsc::UnboundedSender<M>>>>,
}

impl<M> Clone for TopicBus<M> {
    fn clone(&self) -> Self {
        Self {
            topics: Arc::clone(&self.topics),
        }
    }
}

impl<M: Send + 'static> TopicBus<M> {
    pub fn new() -> Self {
        Self {
            topics: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Subscribe to a topic, replacing any previous subscriber.
    pub fn subscribe(&self, topic: &str) -> mpsc::UnboundedReceiver<M> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut topics = self.topics.write().expect("topics lock");
        if topics.insert(topic.to_string(), tx).is_some() {
            debug!(topic, "replaced topic subscriber");
        } else {
            debug!(topic, "subscribed to topic");
        }
        rx
    }

    /// Remove a topic's subscriber. Returns true if one existed.
    pub fn unsubscribe(&self, topic: &str) -> bool {
        let mut topics = self.topics.write().expect("topics lock");
        topics.remove(topic).is_some()
    }

    /// Deliver `message` to the topic's subscriber.
    pub fn publish(&self, topic: &str, message: M) -> RpcResult<()> {
        let sender = {
            let topics = self.topics.read().expect("topics lock");
            topics.get(topic).cloned()
        };
        let sender = sender.ok_or_else(|| RpcError::NoRoute(topic.to_string()))?;

        if sender.send(message).is_err() {
            let mut topics = self.topics.write().expect("topics lock");
            if topics.get(topic).is_some_and(|s| s.is_closed()) {
                topics.remove(topic);
            }
            return Err(RpcError::ChannelClosed(topic.to_string()));
        }
        Ok(())
    }

    /// Topics with a live subscriber, sorted.
    pub fn topics(&self) -> Vec<String> {
        let topics = self.topics.read().expect("topics lock");
        let mut names: Vec<String> = topics
            .iter()
            .filter(|(_, tx)| !tx.is_closed())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

impl<M: Send + 'static> Default for TopicBus<M> {
    fn default() -> Self {
        Self::new()
    }
}
